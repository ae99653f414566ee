//! Merges fetched hours back onto the rows that needed them.

use chrono::NaiveDateTime;
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

use crate::gaps::Partition;
use crate::ledger::Ledger;
use crate::model::{
    StationObservation, UnitKey, UnresolvedReason, UnresolvedRow, WeatherAnnotation,
};

#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    /// The corrected master table, sorted by (observed_at, station_id).
    pub rows: Vec<StationObservation>,
    pub clean_rows: usize,
    pub needs_fix_rows: usize,
    /// Needs-fix rows that received an observed annotation.
    pub fixed: usize,
    /// Rows still without an observed annotation, with the reason.
    pub outstanding: Vec<UnresolvedRow>,
    pub duplicates_removed: usize,
    /// (station_id, observed_at) of every dropped duplicate, in merge order.
    pub dropped_duplicates: Vec<(String, NaiveDateTime)>,
}

impl Reconciliation {
    /// Rows in the output whose status is not `observed`.
    pub fn non_observed(&self) -> usize {
        self.rows.iter().filter(|r| !r.weather.is_observed()).count()
    }
}

/// Strips stale weather from needs-fix rows, left-joins them against every
/// hour in `ledger` on (zone, hour), and recombines them with the clean rows.
///
/// Every input row is kept unless it duplicates an earlier (station_id,
/// observed_at) pair; clean rows come first, so an observed row always wins
/// over a stale copy of itself.
pub fn reconcile(partition: Partition, ledger: &Ledger) -> Reconciliation {
    let Partition { clean, needs_fix } = partition;
    let clean_rows = clean.len();
    let needs_fix_rows = needs_fix.len();
    let index = ledger.hourly_index();

    let mut fixed = 0;
    let mut merged = clean;
    merged.reserve(needs_fix.len());

    for mut obs in needs_fix {
        obs.weather = WeatherAnnotation::absent();
        if let Some(zone) = &obs.zone {
            if let Some(hour) = index.get(&(zone.clone(), obs.hour())) {
                obs.weather = hour.annotation();
                fixed += 1;
            }
        }
        merged.push(obs);
    }

    let mut seen = HashSet::with_capacity(merged.len());
    let mut dropped_duplicates = Vec::new();
    merged.retain(|r| {
        let key = (r.station_id.clone(), r.observed_at);
        if seen.contains(&key) {
            dropped_duplicates.push(key);
            false
        } else {
            seen.insert(key);
            true
        }
    });
    let duplicates_removed = dropped_duplicates.len();
    if duplicates_removed > 0 {
        let dropped: Vec<String> = dropped_duplicates
            .iter()
            .map(|(id, at)| format!("{id}@{}", at.format("%Y-%m-%dT%H:%M:%S")))
            .collect();
        warn!(
            duplicates_removed,
            dropped = ?dropped,
            "Duplicate rows dropped during merge"
        );
    }

    merged.sort_by(|a, b| {
        a.observed_at
            .cmp(&b.observed_at)
            .then_with(|| a.station_id.cmp(&b.station_id))
    });

    let outstanding: Vec<UnresolvedRow> = merged
        .iter()
        .filter(|r| !r.weather.is_observed())
        .map(|r| UnresolvedRow::from_observation(r, outstanding_reason(r, ledger)))
        .collect();

    let result = Reconciliation {
        rows: merged,
        clean_rows,
        needs_fix_rows,
        fixed,
        outstanding,
        duplicates_removed,
        dropped_duplicates,
    };

    let remaining = result.non_observed();
    if remaining == 0 {
        info!(
            rows = result.rows.len(),
            fixed,
            "Reconciled; every row has observed weather"
        );
    } else {
        warn!(
            rows = result.rows.len(),
            fixed,
            outstanding = remaining,
            "Reconciled with rows still lacking observed weather"
        );
    }
    result
}

fn outstanding_reason(row: &StationObservation, ledger: &Ledger) -> UnresolvedReason {
    match &row.zone {
        None => UnresolvedReason::MissingZone,
        Some(zone) => {
            let key = UnitKey {
                day: row.day(),
                zone: zone.clone(),
            };
            if ledger.is_complete(&key) {
                UnresolvedReason::MissingHour
            } else {
                UnresolvedReason::PendingFetch
            }
        }
    }
}

/// Tags rows the gap detector could not map to a coordinate.
///
/// Those rows reach the merge as `pending_fetch` because nothing was fetched
/// for them; the detector knows the real reason.
pub fn apply_detector_reasons(reconciliation: &mut Reconciliation, unresolvable: &[UnresolvedRow]) {
    let known: HashMap<(&str, _), UnresolvedReason> = unresolvable
        .iter()
        .map(|u| ((u.station_id.as_str(), u.observed_at), u.reason))
        .collect();
    for row in &mut reconciliation.outstanding {
        if let Some(reason) = known.get(&(row.station_id.as_str(), row.observed_at)) {
            row.reason = *reason;
        }
    }
}
