//! Output formatting and persistence for run and status reports.
//!
//! Supports pretty-printing, JSON serialization, and CSV append.

use anyhow::Result;
use tracing::{debug, info};

use crate::report::RunReport;
use csv::WriterBuilder;
use serde::Serialize;
use std::fmt::Debug;
use std::fs::{self, OpenOptions};
use std::path::Path;

/// Logs a report using Rust's debug pretty-print format.
pub fn print_pretty<T: Debug>(report: &T) {
    debug!("{:#?}", report);
}

/// Logs a report as pretty-printed JSON.
pub fn print_json<T: Serialize>(report: &T) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

/// Appends a [`RunReport`] as a row to the run log CSV.
///
/// Creates the file (and its directory) with headers if it does not already exist.
pub fn append_record(path: impl AsRef<Path>, report: &RunReport) -> Result<()> {
    let path = path.as_ref();
    let file_exists = path.exists();
    debug!(path = %path.display(), file_exists, "Appending run log record");

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists) // IMPORTANT when appending
        .from_writer(file);

    writer.serialize(report)?;
    writer.flush()?;

    Ok(())
}
