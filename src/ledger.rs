//! Durable, append-only record of completed fetch units.
//!
//! Stored as JSON Lines: one completed unit (with all its hourly rows) per
//! line. Completed keys are held in a set so resumption is a set difference
//! over the freshly computed unit list rather than an offset into the file.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::model::{FetchUnit, HourlyObservation, UnitKey};
use crate::zone::ZoneCode;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub zone: ZoneCode,
    pub day: NaiveDate,
    pub latitude: f64,
    pub longitude: f64,
    pub fetched_at: DateTime<Utc>,
    pub hours: Vec<HourlyObservation>,
}

impl LedgerEntry {
    pub fn new(unit: &FetchUnit, hours: Vec<HourlyObservation>) -> Self {
        Self {
            zone: unit.zone.clone(),
            day: unit.day,
            latitude: unit.coordinate.latitude,
            longitude: unit.coordinate.longitude,
            fetched_at: Utc::now(),
            hours,
        }
    }

    pub fn key(&self) -> UnitKey {
        UnitKey {
            day: self.day,
            zone: self.zone.clone(),
        }
    }
}

#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    /// Durable entries followed by not-yet-flushed ones, in completion order.
    entries: Vec<LedgerEntry>,
    durable: usize,
    completed: BTreeSet<UnitKey>,
}

impl Ledger {
    /// Loads the ledger at `path`; a missing file is an empty ledger.
    ///
    /// A final line that fails to parse is treated as a torn append and
    /// ignored. A malformed line anywhere else is an error. A file whose last
    /// line lacks its newline is terminated so the next append starts fresh.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut ledger = Self {
            path,
            entries: Vec::new(),
            durable: 0,
            completed: BTreeSet::new(),
        };

        if !ledger.path.exists() {
            debug!(path = %ledger.path.display(), "No ledger yet, starting empty");
            return Ok(ledger);
        }

        let content = fs::read_to_string(&ledger.path)
            .with_context(|| format!("Failed to read ledger '{}'", ledger.path.display()))?;
        let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
        let mut torn = false;

        for (idx, line) in lines.iter().enumerate() {
            let entry: LedgerEntry = match serde_json::from_str(line) {
                Ok(entry) => entry,
                Err(e) if idx + 1 == lines.len() => {
                    warn!(
                        path = %ledger.path.display(),
                        error = %e,
                        "Dropping torn final ledger line"
                    );
                    ledger.truncate_torn_tail(&lines[..idx])?;
                    torn = true;
                    break;
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!(
                            "Malformed ledger line {} in '{}'",
                            idx + 1,
                            ledger.path.display()
                        )
                    });
                }
            };

            if !ledger.completed.insert(entry.key()) {
                warn!(unit = %entry.key(), "Duplicate ledger entry ignored");
                continue;
            }
            ledger.entries.push(entry);
        }

        if !torn && !content.is_empty() && !content.ends_with('\n') {
            ledger.terminate_last_line()?;
        }

        ledger.durable = ledger.entries.len();
        info!(
            path = %ledger.path.display(),
            units = ledger.durable,
            "Ledger loaded"
        );
        Ok(ledger)
    }

    /// Rewrites the file with only the intact lines so later appends start
    /// on a fresh line.
    fn truncate_torn_tail(&self, intact: &[&str]) -> Result<()> {
        let mut body = intact.join("\n");
        if !body.is_empty() {
            body.push('\n');
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        fs::write(&tmp, body)
            .with_context(|| format!("Failed to repair ledger '{}'", self.path.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to repair ledger '{}'", self.path.display()))?;
        Ok(())
    }

    fn terminate_last_line(&self) -> Result<()> {
        debug!(path = %self.path.display(), "Terminating unterminated ledger line");
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open ledger '{}'", self.path.display()))?;
        file.write_all(b"\n")?;
        file.sync_all()
            .with_context(|| format!("Failed to sync ledger '{}'", self.path.display()))?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_complete(&self, key: &UnitKey) -> bool {
        self.completed.contains(key)
    }

    /// Number of completed units, flushed or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn unflushed(&self) -> usize {
        self.entries.len() - self.durable
    }

    /// The most recently completed unit that has reached disk.
    pub fn last_durable(&self) -> Option<UnitKey> {
        self.durable
            .checked_sub(1)
            .and_then(|i| self.entries.get(i))
            .map(LedgerEntry::key)
    }

    /// The greatest completed key in unit order.
    pub fn last_completed(&self) -> Option<&UnitKey> {
        self.completed.last()
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// Records a completed unit in memory. Returns false if already present.
    pub fn record(&mut self, entry: LedgerEntry) -> bool {
        if !self.completed.insert(entry.key()) {
            warn!(unit = %entry.key(), "Unit already in ledger, not recorded again");
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Appends every unflushed entry to disk and syncs the file.
    pub fn flush(&mut self) -> Result<usize> {
        let pending = self.unflushed();
        if pending == 0 {
            return Ok(0);
        }

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create ledger directory '{}'", dir.display()))?;
        }

        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open ledger '{}'", self.path.display()))?;
        let mut writer = BufWriter::new(file);

        for entry in &self.entries[self.durable..] {
            serde_json::to_writer(&mut writer, entry)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        writer
            .get_ref()
            .sync_all()
            .with_context(|| format!("Failed to sync ledger '{}'", self.path.display()))?;

        self.durable = self.entries.len();
        info!(
            path = %self.path.display(),
            flushed = pending,
            total = self.durable,
            "Ledger checkpoint written"
        );
        Ok(pending)
    }

    /// All fetched hours keyed by (zone, hour). Earlier entries win.
    pub fn hourly_index(&self) -> HashMap<(ZoneCode, NaiveDateTime), &HourlyObservation> {
        let mut index = HashMap::new();
        for entry in &self.entries {
            for hour in &entry.hours {
                index
                    .entry((hour.zone.clone(), hour.hour))
                    .or_insert(hour);
            }
        }
        index
    }
}
