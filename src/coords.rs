//! Picks one representative coordinate per zone.
//!
//! Every request for a zone must target the same point across runs, so the
//! choice is a pure function of the set of station coordinates in that zone:
//! lowest latitude wins, lowest longitude breaks ties.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::model::{Coordinate, StationObservation};
use crate::zone::ZoneCode;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZoneCoordinates {
    entries: BTreeMap<ZoneCode, Coordinate>,
}

impl ZoneCoordinates {
    pub fn get(&self, zone: &ZoneCode) -> Option<Coordinate> {
        self.entries.get(zone).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of [`resolve_zone_coordinates`], including what was left out.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub coordinates: ZoneCoordinates,
    /// Rows without a zone code.
    pub zoneless_rows: usize,
    /// Rows whose latitude or longitude is not a finite number.
    pub non_finite_rows: usize,
    /// Finite coordinates outside +/-90 latitude or +/-180 longitude.
    pub out_of_range_rows: usize,
}

fn precedes(candidate: &Coordinate, current: &Coordinate) -> bool {
    let ord = candidate
        .latitude
        .total_cmp(&current.latitude)
        .then(candidate.longitude.total_cmp(&current.longitude));
    ord == Ordering::Less
}

pub fn resolve_zone_coordinates(observations: &[StationObservation]) -> Resolution {
    let mut resolution = Resolution::default();

    for obs in observations {
        let Some(zone) = &obs.zone else {
            resolution.zoneless_rows += 1;
            continue;
        };
        let candidate = Coordinate::new(obs.latitude, obs.longitude);
        if !candidate.is_finite() {
            resolution.non_finite_rows += 1;
            continue;
        }
        if !candidate.is_valid() {
            resolution.out_of_range_rows += 1;
            continue;
        }

        resolution
            .coordinates
            .entries
            .entry(zone.clone())
            .and_modify(|current| {
                if precedes(&candidate, current) {
                    *current = candidate;
                }
            })
            .or_insert(candidate);
    }

    if resolution.zoneless_rows > 0 {
        warn!(
            rows = resolution.zoneless_rows,
            "Rows without a zone code excluded from coordinate mapping"
        );
    }
    if resolution.non_finite_rows > 0 {
        warn!(
            rows = resolution.non_finite_rows,
            "Rows with non-finite coordinates excluded from coordinate mapping"
        );
    }
    if resolution.out_of_range_rows > 0 {
        warn!(
            rows = resolution.out_of_range_rows,
            "Rows with out-of-range coordinates excluded from coordinate mapping"
        );
    }
    if resolution.coordinates.is_empty() && !observations.is_empty() {
        warn!(rows = observations.len(), "No zone could be given a coordinate");
    }
    debug!(zones = resolution.coordinates.len(), "Zone coordinates resolved");

    resolution
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WeatherAnnotation;
    use chrono::NaiveDate;

    fn station(id: &str, zone: Option<&str>, lat: f64, lon: f64) -> StationObservation {
        StationObservation {
            station_id: id.to_string(),
            station_name: format!("Station {id}"),
            station_status: "Active".to_string(),
            latitude: lat,
            longitude: lon,
            zone: zone.map(|z| ZoneCode::new(z).unwrap()),
            region: None,
            available_bikes: 3,
            available_docks: 9,
            observed_at: NaiveDate::from_ymd_opt(2019, 5, 13)
                .unwrap()
                .and_hms_opt(2, 0, 0)
                .unwrap(),
            weather: WeatherAnnotation::absent(),
        }
    }

    #[test]
    fn test_lowest_latitude_wins() {
        let rows = vec![
            station("1", Some("07306"), 40.73, -74.06),
            station("2", Some("07306"), 40.71, -74.04),
            station("3", Some("07306"), 40.72, -74.08),
        ];
        let res = resolve_zone_coordinates(&rows);
        assert_eq!(res.coordinates.len(), 1);
        assert_eq!(
            res.coordinates.get(&ZoneCode::new("07306").unwrap()),
            Some(Coordinate::new(40.71, -74.04))
        );
    }

    #[test]
    fn test_longitude_breaks_latitude_ties() {
        let rows = vec![
            station("1", Some("11101"), 40.74, -73.93),
            station("2", Some("11101"), 40.74, -73.95),
        ];
        let res = resolve_zone_coordinates(&rows);
        assert_eq!(
            res.coordinates.get(&ZoneCode::new("11101").unwrap()),
            Some(Coordinate::new(40.74, -73.95))
        );
    }

    #[test]
    fn test_result_does_not_depend_on_input_order() {
        let mut rows = vec![
            station("1", Some("07306"), 40.73, -74.06),
            station("2", Some("11101"), 40.74, -73.93),
            station("3", Some("07306"), 40.71, -74.04),
            station("4", Some("11101"), 40.75, -73.94),
        ];
        let first = resolve_zone_coordinates(&rows).coordinates;
        rows.reverse();
        let second = resolve_zone_coordinates(&rows).coordinates;
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn test_zoneless_and_non_finite_rows_are_reported() {
        let rows = vec![
            station("1", None, 40.73, -74.06),
            station("2", Some("07306"), f64::NAN, -74.04),
            station("3", Some("07306"), 40.72, -74.08),
        ];
        let res = resolve_zone_coordinates(&rows);
        assert_eq!(res.zoneless_rows, 1);
        assert_eq!(res.non_finite_rows, 1);
        assert_eq!(
            res.coordinates.get(&ZoneCode::new("07306").unwrap()),
            Some(Coordinate::new(40.72, -74.08))
        );
    }

    #[test]
    fn test_out_of_range_station_never_represents_zone() {
        let rows = vec![
            station("1", Some("07306"), 40.72, -74.04),
            station("2", Some("07306"), -999.0, -74.04),
            station("3", Some("11101"), 40.74, 200.0),
        ];
        let res = resolve_zone_coordinates(&rows);
        assert_eq!(res.out_of_range_rows, 2);
        let resolved = res.coordinates.get(&ZoneCode::new("07306").unwrap()).unwrap();
        assert!(resolved.is_valid());
        assert_eq!(resolved, Coordinate::new(40.72, -74.04));
        // A zone with only bad stations stays unmapped, so its rows are reported
        // as unknown_zone instead of failing the fetch.
        assert_eq!(res.coordinates.get(&ZoneCode::new("11101").unwrap()), None);
    }
}
