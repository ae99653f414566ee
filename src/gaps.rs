//! Finds rows whose weather must be re-fetched and reduces them to fetch units.

use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use crate::coords::ZoneCoordinates;
use crate::model::{
    FetchUnit, StationObservation, UnitKey, UnresolvedReason, UnresolvedRow,
};
use crate::zone::ZoneCode;

/// Rows split by whether their weather annotation is already observed.
#[derive(Debug, Clone, Default)]
pub struct Partition {
    pub clean: Vec<StationObservation>,
    pub needs_fix: Vec<StationObservation>,
}

impl Partition {
    pub fn total(&self) -> usize {
        self.clean.len() + self.needs_fix.len()
    }
}

pub fn partition(observations: Vec<StationObservation>) -> Partition {
    let (needs_fix, clean): (Vec<_>, Vec<_>) = observations
        .into_iter()
        .partition(StationObservation::needs_weather_fix);
    debug!(
        clean = clean.len(),
        needs_fix = needs_fix.len(),
        "Observations partitioned"
    );
    Partition { clean, needs_fix }
}

#[derive(Debug, Clone, Default)]
pub struct GapScan {
    /// Distinct units, ascending by day then zone.
    pub units: Vec<FetchUnit>,
    /// Distinct (zone, hour) pairs seen among the resolvable rows.
    pub zone_hours: usize,
    /// Needs-fix rows that cannot be assigned a unit.
    pub unresolvable: Vec<UnresolvedRow>,
}

impl GapScan {
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// Reduces needs-fix rows to the minimal sorted set of (zone, day) units.
///
/// The provider bills per day request, so every hour of a zone on one day
/// collapses into a single unit.
pub fn detect_gaps(needs_fix: &[StationObservation], coordinates: &ZoneCoordinates) -> GapScan {
    let mut zone_hours = BTreeSet::new();
    let mut units: BTreeMap<UnitKey, FetchUnit> = BTreeMap::new();
    let mut unresolvable = Vec::new();

    for obs in needs_fix {
        let Some(zone) = &obs.zone else {
            unresolvable.push(UnresolvedRow::from_observation(
                obs,
                UnresolvedReason::MissingZone,
            ));
            continue;
        };
        let Some(coordinate) = coordinates.get(zone) else {
            unresolvable.push(UnresolvedRow::from_observation(
                obs,
                UnresolvedReason::UnknownZone,
            ));
            continue;
        };

        zone_hours.insert((zone.clone(), obs.hour()));
        let key = UnitKey {
            day: obs.day(),
            zone: zone.clone(),
        };
        units.entry(key).or_insert_with(|| FetchUnit {
            zone: zone.clone(),
            day: obs.day(),
            coordinate,
        });
    }

    if !unresolvable.is_empty() {
        let unknown: BTreeSet<&ZoneCode> =
            unresolvable.iter().filter_map(|r| r.zone.as_ref()).collect();
        warn!(
            rows = unresolvable.len(),
            unknown_zones = ?unknown,
            "Rows needing weather cannot be assigned a fetch unit"
        );
    }

    let scan = GapScan {
        units: units.into_values().collect(),
        zone_hours: zone_hours.len(),
        unresolvable,
    };
    info!(
        needs_fix = needs_fix.len(),
        zone_hours = scan.zone_hours,
        units = scan.units.len(),
        "Weather gaps detected"
    );
    scan
}
