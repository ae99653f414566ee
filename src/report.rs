use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::fetcher::{FetchOutcome, FetchSummary};
use crate::gaps::GapScan;
use crate::reconcile::Reconciliation;

/// One row of the run log: what a single invocation did.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub timestamp: DateTime<Utc>,
    pub command: String,

    // input
    pub total_rows: usize,
    pub clean_rows: usize,
    pub needs_fix_rows: usize,
    pub zones: usize,
    pub unresolvable_rows: usize,

    // fetch
    pub fetch_units: usize,
    pub units_already_fetched: usize,
    pub provider_calls: usize,
    pub units_fetched: usize,
    pub units_remaining: usize,
    pub stop_reason: Option<String>,
    pub resume_from: Option<String>,

    // merge
    pub rows_fixed: usize,
    pub rows_outstanding: usize,
    pub duplicates_removed: usize,

    // error tracking
    pub error_stage: Option<String>,
    pub error_message: Option<String>,
}

impl RunReport {
    pub fn new(command: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            command: command.to_string(),
            ..Default::default()
        }
    }

    /// A report for a run that halted in `stage`.
    pub fn from_error(command: &str, stage: &str, error_message: &str) -> Self {
        Self {
            error_stage: Some(stage.to_string()),
            error_message: Some(error_message.to_string()),
            ..Self::new(command)
        }
    }

    pub fn pct(part: usize, total: usize) -> f64 {
        if total == 0 {
            0.0
        } else {
            (part as f64 / total as f64) * 100.0
        }
    }

    /// Share of rows that needed weather and got it this run.
    pub fn fixed_pct(&self) -> f64 {
        Self::pct(self.rows_fixed, self.needs_fix_rows)
    }

    pub fn with_gaps(mut self, scan: &GapScan) -> Self {
        self.fetch_units = scan.units.len();
        self.unresolvable_rows = scan.unresolvable.len();
        self
    }

    pub fn with_fetch(mut self, summary: &FetchSummary) -> Self {
        self.units_already_fetched = summary.already_fetched;
        self.provider_calls = summary.calls;
        self.units_fetched = summary.fetched;
        self.units_remaining = summary.remaining();
        self.stop_reason = Some(summary.outcome.label().to_string());
        if let FetchOutcome::BudgetExhausted { next, .. } = &summary.outcome {
            self.resume_from = Some(next.to_string());
        }
        self
    }

    pub fn with_reconciliation(mut self, rec: &Reconciliation) -> Self {
        self.rows_fixed = rec.fixed;
        self.rows_outstanding = rec.outstanding.len();
        self.duplicates_removed = rec.duplicates_removed;
        self
    }
}

/// Read-only snapshot of how far reconciliation has progressed.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub timestamp: DateTime<Utc>,
    pub total_rows: usize,
    pub observed_rows: usize,
    pub provisional_rows: usize,
    pub absent_rows: usize,
    pub zones: usize,
    pub unresolvable_rows: usize,
    pub fetch_units: usize,
    pub units_fetched: usize,
    pub units_pending: usize,
    pub last_completed: Option<String>,
}

impl StatusReport {
    pub fn new() -> Self {
        Self {
            timestamp: Utc::now(),
            ..Default::default()
        }
    }

    pub fn observed_pct(&self) -> f64 {
        RunReport::pct(self.observed_rows, self.total_rows)
    }
}
