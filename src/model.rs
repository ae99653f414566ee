//! Core data types shared by every pipeline stage.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::zone::ZoneCode;

/// Whether a row's weather columns can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeatherStatus {
    /// Backed by a historical observation from the provider.
    Observed,
    /// A forecast value that has since become history.
    Provisional,
    /// No weather data at all.
    Absent,
}

impl WeatherStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            WeatherStatus::Observed => "observed",
            WeatherStatus::Provisional => "provisional",
            WeatherStatus::Absent => "absent",
        }
    }
}

impl fmt::Display for WeatherStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeatherAnnotation {
    pub summary: Option<String>,
    pub precip_intensity: Option<f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
    pub wind_gust: Option<f64>,
    pub cloud_cover: Option<f64>,
    pub status: WeatherStatus,
}

impl WeatherAnnotation {
    /// An annotation with every value stripped.
    pub fn absent() -> Self {
        Self {
            summary: None,
            precip_intensity: None,
            temperature: None,
            humidity: None,
            wind_speed: None,
            wind_gust: None,
            cloud_cover: None,
            status: WeatherStatus::Absent,
        }
    }

    pub fn is_observed(&self) -> bool {
        self.status == WeatherStatus::Observed
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StationObservation {
    pub station_id: String,
    pub station_name: String,
    pub station_status: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Missing on legacy rows recorded before zones were geocoded.
    pub zone: Option<ZoneCode>,
    pub region: Option<String>,
    pub available_bikes: u32,
    pub available_docks: u32,
    pub observed_at: NaiveDateTime,
    pub weather: WeatherAnnotation,
}

impl StationObservation {
    pub fn hour(&self) -> NaiveDateTime {
        truncate_to_hour(self.observed_at)
    }

    pub fn day(&self) -> NaiveDate {
        self.observed_at.date()
    }

    pub fn needs_weather_fix(&self) -> bool {
        !self.weather.is_observed()
    }
}

/// Zeroes minutes, seconds and sub-second fields.
pub fn truncate_to_hour(ts: NaiveDateTime) -> NaiveDateTime {
    ts.date().and_time(NaiveTime::MIN) + Duration::hours(i64::from(ts.hour()))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.latitude, self.longitude)
    }
}

/// Stable identity of a fetch unit. Orders by day, then zone.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnitKey {
    pub day: NaiveDate,
    pub zone: ZoneCode,
}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.zone, self.day)
    }
}

/// One (zone, day) granule of weather to retrieve.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchUnit {
    pub zone: ZoneCode,
    pub day: NaiveDate,
    pub coordinate: Coordinate,
}

impl FetchUnit {
    pub fn key(&self) -> UnitKey {
        UnitKey {
            day: self.day,
            zone: self.zone.clone(),
        }
    }
}

/// A provider hour normalised to the internal schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyObservation {
    pub zone: ZoneCode,
    pub hour: NaiveDateTime,
    pub summary: Option<String>,
    pub precip_intensity: Option<f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
    pub wind_gust: Option<f64>,
    pub cloud_cover: Option<f64>,
}

impl HourlyObservation {
    pub fn annotation(&self) -> WeatherAnnotation {
        WeatherAnnotation {
            summary: self.summary.clone(),
            precip_intensity: self.precip_intensity,
            temperature: self.temperature,
            humidity: self.humidity,
            wind_speed: self.wind_speed,
            wind_gust: self.wind_gust,
            cloud_cover: self.cloud_cover,
            status: WeatherStatus::Observed,
        }
    }
}

/// Why a row could not be given an observed annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedReason {
    /// Legacy row without a zone code.
    MissingZone,
    /// Zone has no resolved coordinate.
    UnknownZone,
    /// The (zone, day) unit has not been fetched yet.
    PendingFetch,
    /// The unit was fetched but the provider returned no such hour.
    MissingHour,
}

impl fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnresolvedReason::MissingZone => "missing_zone",
            UnresolvedReason::UnknownZone => "unknown_zone",
            UnresolvedReason::PendingFetch => "pending_fetch",
            UnresolvedReason::MissingHour => "missing_hour",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnresolvedRow {
    pub station_id: String,
    pub zone: Option<ZoneCode>,
    pub observed_at: NaiveDateTime,
    pub reason: UnresolvedReason,
}

impl UnresolvedRow {
    pub fn from_observation(obs: &StationObservation, reason: UnresolvedReason) -> Self {
        Self {
            station_id: obs.station_id.clone(),
            zone: obs.zone.clone(),
            observed_at: obs.observed_at,
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").unwrap()
    }

    #[test]
    fn test_truncate_to_hour_zeroes_sub_hour_fields() {
        assert_eq!(
            truncate_to_hour(ts("2019-05-13T02:47:31.250")),
            ts("2019-05-13T02:00:00")
        );
        assert_eq!(
            truncate_to_hour(ts("2019-05-13T23:59:59")),
            ts("2019-05-13T23:00:00")
        );
    }

    #[test]
    fn test_unit_key_orders_by_day_then_zone() {
        let d1 = NaiveDate::from_ymd_opt(2019, 5, 13).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2019, 5, 14).unwrap();
        let late_zone = UnitKey {
            day: d1,
            zone: ZoneCode::new("11101").unwrap(),
        };
        let early_zone = UnitKey {
            day: d1,
            zone: ZoneCode::new("07306").unwrap(),
        };
        let next_day = UnitKey {
            day: d2,
            zone: ZoneCode::new("07306").unwrap(),
        };
        assert!(early_zone < late_zone);
        assert!(late_zone < next_day);
    }

    #[test]
    fn test_coordinate_validity() {
        assert!(Coordinate::new(40.7, -74.0).is_valid());
        assert!(!Coordinate::new(91.0, 0.0).is_valid());
        assert!(!Coordinate::new(f64::NAN, 0.0).is_finite());
    }

    #[test]
    fn test_hourly_observation_is_tagged_observed() {
        let hour = HourlyObservation {
            zone: ZoneCode::new("07306").unwrap(),
            hour: ts("2019-05-13T02:00:00"),
            summary: Some("Clear".into()),
            precip_intensity: Some(0.0),
            temperature: Some(51.2),
            humidity: Some(0.71),
            wind_speed: Some(4.3),
            wind_gust: None,
            cloud_cover: Some(0.1),
        };
        let annotation = hour.annotation();
        assert!(annotation.is_observed());
        assert_eq!(annotation.temperature, Some(51.2));
    }
}
