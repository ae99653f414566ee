//! The reconciliation run as an explicit state machine:
//! `idle -> resolving_coordinates -> detecting_gaps -> fetching -> reconciling -> done`.
//!
//! A provider error stops the run in `fetching`, before the master table is
//! touched. A spent call budget does not: the partial ledger is merged and the
//! rows it cannot cover stay outstanding until a later run.

use std::fmt;
use tracing::{info, instrument, warn};

use crate::config::ReconcileConfig;
use crate::coords::{Resolution, resolve_zone_coordinates};
use crate::error::PipelineError;
use crate::fetcher::RateLimitedFetcher;
use crate::gaps::{GapScan, Partition, detect_gaps, partition};
use crate::ledger::Ledger;
use crate::model::{FetchUnit, UnitKey, UnresolvedRow, WeatherStatus};
use crate::provider::WeatherProvider;
use crate::reconcile::{Reconciliation, apply_detector_reasons, reconcile};
use crate::report::{RunReport, StatusReport};
use crate::table::{read_gap_table, read_master_table, write_gap_table, write_master_table, write_unresolved};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    #[default]
    Idle,
    ResolvingCoordinates,
    DetectingGaps,
    Fetching,
    Reconciling,
    Done,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::ResolvingCoordinates => "resolving_coordinates",
            Stage::DetectingGaps => "detecting_gaps",
            Stage::Fetching => "fetching",
            Stage::Reconciling => "reconciling",
            Stage::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default)]
struct StageTracker {
    current: Stage,
}

impl StageTracker {
    fn enter(&mut self, next: Stage) {
        info!(from = %self.current, to = %next, "Pipeline stage transition");
        self.current = next;
    }

    fn fail(&self, last_durable: Option<UnitKey>, source: impl Into<anyhow::Error>) -> PipelineError {
        PipelineError::new(self.current, last_durable, source)
    }
}

/// Everything known once gap detection has finished.
struct Prepared {
    resolution: Resolution,
    partition: Partition,
    scan: GapScan,
    units: Vec<FetchUnit>,
}

impl Prepared {
    fn report(&self, command: &str) -> RunReport {
        RunReport {
            total_rows: self.partition.total(),
            clean_rows: self.partition.clean.len(),
            needs_fix_rows: self.partition.needs_fix.len(),
            zones: self.resolution.coordinates.len(),
            ..RunReport::new(command)
        }
        .with_gaps(&self.scan)
    }
}

fn prepare(
    config: &ReconcileConfig,
    stages: &mut StageTracker,
    reuse_gap_table: bool,
) -> Result<Prepared, PipelineError> {
    stages.enter(Stage::ResolvingCoordinates);
    let rows = read_master_table(&config.paths.master).map_err(|e| stages.fail(None, e))?;
    let resolution = resolve_zone_coordinates(&rows);

    stages.enter(Stage::DetectingGaps);
    let partition = partition(rows);
    let scan = detect_gaps(&partition.needs_fix, &resolution.coordinates);

    let gap_path = &config.paths.gap_table;
    let units = if reuse_gap_table && gap_path.exists() {
        let units = read_gap_table(gap_path).map_err(|e| stages.fail(None, e))?;
        info!(
            path = %gap_path.display(),
            units = units.len(),
            detected = scan.units.len(),
            "Reusing existing gap table"
        );
        units
    } else {
        write_gap_table(gap_path, &scan.units).map_err(|e| stages.fail(None, e))?;
        scan.units.clone()
    };

    Ok(Prepared {
        resolution,
        partition,
        scan,
        units,
    })
}

/// Merges the ledger into the master table and rewrites the outputs.
///
/// The master table is only replaced when the merge can change it.
fn merge(
    config: &ReconcileConfig,
    stages: &StageTracker,
    partition: Partition,
    ledger: &Ledger,
    unresolvable: &[UnresolvedRow],
) -> Result<Reconciliation, PipelineError> {
    let had_gaps = !partition.needs_fix.is_empty();
    let mut result = reconcile(partition, ledger);
    apply_detector_reasons(&mut result, unresolvable);

    if had_gaps || result.duplicates_removed > 0 {
        write_master_table(&config.paths.master, &result.rows)
            .map_err(|e| stages.fail(ledger.last_durable(), e))?;
    } else {
        info!("No rows need weather; master table left untouched");
    }
    write_unresolved(&config.paths.unresolved, &result.outstanding)
        .map_err(|e| stages.fail(ledger.last_durable(), e))?;
    Ok(result)
}

fn open_ledger(config: &ReconcileConfig, stages: &StageTracker) -> Result<Ledger, PipelineError> {
    Ledger::open(&config.paths.ledger).map_err(|e| stages.fail(None, e))
}

pub struct Pipeline<P> {
    config: ReconcileConfig,
    provider: P,
    stages: StageTracker,
}

impl<P: WeatherProvider> Pipeline<P> {
    pub fn new(config: ReconcileConfig, provider: P) -> Self {
        Self {
            config,
            provider,
            stages: StageTracker::default(),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stages.current
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Runs every stage once. Re-running after any outcome resumes from the
    /// durable ledger.
    #[instrument(skip_all, name = "pipeline_run")]
    pub async fn run(&mut self) -> Result<RunReport, PipelineError> {
        self.config
            .validate()
            .map_err(|e| self.stages.fail(None, e))?;

        let prepared = prepare(&self.config, &mut self.stages, self.config.reuse_gap_table)?;
        let mut report = prepared.report("run");
        report.fetch_units = prepared.units.len();

        self.stages.enter(Stage::Fetching);
        let mut ledger = open_ledger(&self.config, &self.stages)?;
        let fetcher = RateLimitedFetcher::new(&self.provider, self.config.fetch_settings());
        let summary = fetcher
            .run(&prepared.units, &mut ledger)
            .await
            .map_err(|e| self.stages.fail(ledger.last_durable(), e))?;
        report = report.with_fetch(&summary);

        self.stages.enter(Stage::Reconciling);
        let result = merge(
            &self.config,
            &self.stages,
            prepared.partition,
            &ledger,
            &prepared.scan.unresolvable,
        )?;
        report = report.with_reconciliation(&result);

        self.stages.enter(Stage::Done);
        Ok(report)
    }
}

/// Resolves coordinates and writes a fresh gap table without any network
/// access.
#[instrument(skip_all, name = "pipeline_gaps")]
pub fn detect_only(config: &ReconcileConfig) -> Result<RunReport, PipelineError> {
    let mut stages = StageTracker::default();
    let prepared = prepare(config, &mut stages, false)?;
    let report = prepared.report("gaps");
    stages.enter(Stage::Done);
    Ok(report)
}

/// Merges whatever the ledger already holds without calling the provider.
#[instrument(skip_all, name = "pipeline_reconcile")]
pub fn reconcile_only(config: &ReconcileConfig) -> Result<RunReport, PipelineError> {
    let mut stages = StageTracker::default();
    let prepared = prepare(config, &mut stages, true)?;
    let mut report = prepared.report("reconcile");
    report.fetch_units = prepared.units.len();

    stages.enter(Stage::Reconciling);
    let ledger = open_ledger(config, &stages)?;
    report.units_already_fetched = prepared
        .units
        .iter()
        .filter(|u| ledger.is_complete(&u.key()))
        .count();
    report.units_remaining = report.fetch_units - report.units_already_fetched;

    let result = merge(
        config,
        &stages,
        prepared.partition,
        &ledger,
        &prepared.scan.unresolvable,
    )?;
    report = report.with_reconciliation(&result);

    stages.enter(Stage::Done);
    Ok(report)
}

/// Counts rows by weather status and units by fetch state. Writes nothing.
pub fn status(config: &ReconcileConfig) -> anyhow::Result<StatusReport> {
    let rows = read_master_table(&config.paths.master)?;
    let resolution = resolve_zone_coordinates(&rows);

    let mut report = StatusReport::new();
    report.total_rows = rows.len();
    report.zones = resolution.coordinates.len();
    for row in &rows {
        match row.weather.status {
            WeatherStatus::Observed => report.observed_rows += 1,
            WeatherStatus::Provisional => report.provisional_rows += 1,
            WeatherStatus::Absent => report.absent_rows += 1,
        }
    }

    let needs_fix: Vec<_> = rows.into_iter().filter(|r| r.needs_weather_fix()).collect();
    let scan = detect_gaps(&needs_fix, &resolution.coordinates);
    let ledger = Ledger::open(&config.paths.ledger)?;

    report.unresolvable_rows = scan.unresolvable.len();
    report.fetch_units = scan.units.len();
    report.units_fetched = scan
        .units
        .iter()
        .filter(|u| ledger.is_complete(&u.key()))
        .count();
    report.units_pending = report.fetch_units - report.units_fetched;
    report.last_completed = ledger.last_completed().map(ToString::to_string);

    if report.units_pending > 0 {
        warn!(pending = report.units_pending, "Fetch units still pending");
    }
    Ok(report)
}
