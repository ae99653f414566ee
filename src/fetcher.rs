//! Budgeted, throttled, resumable retrieval of fetch units.
//!
//! Units already present in the ledger are skipped, so re-invoking after a
//! crash, a provider failure or a spent budget continues where the durable
//! ledger ends. A failed unit is never recorded and is therefore the first
//! unit fetched by the next invocation.

use std::time::Duration;
use tracing::{info, warn};

use crate::error::FetchError;
use crate::ledger::{Ledger, LedgerEntry};
use crate::model::{FetchUnit, UnitKey};
use crate::provider::WeatherProvider;

/// The provider's free tier allows 1000 calls a day.
pub const DEFAULT_CALL_BUDGET: usize = 999;
pub const DEFAULT_CHECKPOINT_INTERVAL: usize = 10;
pub const DEFAULT_REQUEST_DELAY: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy)]
pub struct FetchSettings {
    pub call_budget: usize,
    pub checkpoint_interval: usize,
    pub request_delay: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            call_budget: DEFAULT_CALL_BUDGET,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            request_delay: DEFAULT_REQUEST_DELAY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Every unit is in the ledger.
    Completed,
    /// The call budget ran out; `next` is where the next run starts.
    BudgetExhausted { next: UnitKey, remaining: usize },
}

impl FetchOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            FetchOutcome::Completed => "completed",
            FetchOutcome::BudgetExhausted { .. } => "budget_exhausted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSummary {
    /// Units skipped because the ledger already had them.
    pub already_fetched: usize,
    /// Last completed key before this run started.
    pub resumed_after: Option<UnitKey>,
    pub calls: usize,
    pub fetched: usize,
    pub hours: usize,
    pub outcome: FetchOutcome,
}

impl FetchSummary {
    pub fn remaining(&self) -> usize {
        match &self.outcome {
            FetchOutcome::Completed => 0,
            FetchOutcome::BudgetExhausted { remaining, .. } => *remaining,
        }
    }
}

pub struct RateLimitedFetcher<'a, P: ?Sized> {
    provider: &'a P,
    settings: FetchSettings,
}

impl<'a, P: WeatherProvider + ?Sized> RateLimitedFetcher<'a, P> {
    pub fn new(provider: &'a P, settings: FetchSettings) -> Self {
        Self { provider, settings }
    }

    /// Fetches every unit of `units` (sorted by key) not yet in `ledger`.
    ///
    /// The ledger is flushed every `checkpoint_interval` units, when the budget
    /// or the units run out, and before a provider error is returned.
    #[tracing::instrument(skip_all, fields(units = units.len(), budget = self.settings.call_budget))]
    pub async fn run(
        &self,
        units: &[FetchUnit],
        ledger: &mut Ledger,
    ) -> Result<FetchSummary, FetchError> {
        let resumed_after = ledger.last_completed().cloned();
        let pending: Vec<&FetchUnit> = units
            .iter()
            .filter(|u| !ledger.is_complete(&u.key()))
            .collect();
        let already_fetched = units.len() - pending.len();

        info!(
            pending = pending.len(),
            already_fetched,
            resumed_after = ?resumed_after.as_ref().map(ToString::to_string),
            "Starting weather fetch"
        );

        let interval = self.settings.checkpoint_interval.max(1);
        let mut calls = 0;
        let mut fetched = 0;
        let mut hours = 0;

        for (idx, unit) in pending.iter().enumerate() {
            if calls >= self.settings.call_budget {
                ledger.flush().map_err(FetchError::Checkpoint)?;
                let remaining = pending.len() - idx;
                let next = unit.key();
                warn!(
                    calls,
                    remaining,
                    next = %next,
                    "Call budget exhausted; next run resumes at {next}"
                );
                return Ok(FetchSummary {
                    already_fetched,
                    resumed_after,
                    calls,
                    fetched,
                    hours,
                    outcome: FetchOutcome::BudgetExhausted { next, remaining },
                });
            }

            if calls > 0 && !self.settings.request_delay.is_zero() {
                tokio::time::sleep(self.settings.request_delay).await;
            }

            calls += 1;
            let result = self.provider.fetch_day(unit).await;
            let day_hours = match result {
                Ok(day_hours) => day_hours,
                Err(source) => {
                    let flushed = ledger.flush().map_err(FetchError::Checkpoint)?;
                    warn!(
                        unit = %unit.key(),
                        error = %source,
                        flushed,
                        last_durable = ?ledger.last_durable().map(|k| k.to_string()),
                        "Provider call failed; aborting fetch"
                    );
                    return Err(FetchError::Provider {
                        unit: unit.key(),
                        source,
                    });
                }
            };

            if day_hours.is_empty() {
                warn!(unit = %unit.key(), "Provider returned no hours for unit");
            }
            hours += day_hours.len();
            ledger.record(LedgerEntry::new(unit, day_hours));
            fetched += 1;

            if ledger.unflushed() >= interval {
                ledger.flush().map_err(FetchError::Checkpoint)?;
            }
        }

        ledger.flush().map_err(FetchError::Checkpoint)?;
        info!(calls, fetched, hours, "Weather fetch complete");

        Ok(FetchSummary {
            already_fetched,
            resumed_after,
            calls,
            fetched,
            hours,
            outcome: FetchOutcome::Completed,
        })
    }
}
