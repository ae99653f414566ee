//! Decoding and normalisation of weather provider responses.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use chrono_tz::Tz;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::model::{HourlyObservation, truncate_to_hour};
use crate::provider::TimeMachineResponse;
use crate::zone::ZoneCode;

/// Decodes a JSON-encoded time machine response from raw bytes.
///
/// # Errors
///
/// Returns an error if the bytes are not a valid response document.
pub fn parse_time_machine(bytes: &[u8]) -> Result<TimeMachineResponse, ProviderError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// How unix times in a response map onto local wall-clock time.
#[derive(Debug, Clone, Copy)]
enum LocalClock {
    /// IANA zone; follows clock changes within the day.
    Zone(Tz),
    /// Fixed shift in seconds, used when the response names no known zone.
    Offset(i64),
}

impl LocalClock {
    fn for_response(response: &TimeMachineResponse) -> Self {
        let fixed = LocalClock::Offset((response.offset * 3600.0).round() as i64);
        match response.timezone.as_deref() {
            Some(name) => match name.parse::<Tz>() {
                Ok(tz) => LocalClock::Zone(tz),
                Err(_) => {
                    warn!(timezone = name, offset = response.offset, "Unknown timezone, using fixed offset");
                    fixed
                }
            },
            None => fixed,
        }
    }

    fn local(self, unix: i64) -> Option<NaiveDateTime> {
        match self {
            LocalClock::Zone(tz) => {
                DateTime::from_timestamp(unix, 0).map(|utc| utc.with_timezone(&tz).naive_local())
            }
            LocalClock::Offset(secs) => unix
                .checked_add(secs)
                .and_then(|t| DateTime::from_timestamp(t, 0))
                .map(|dt| dt.naive_utc()),
        }
    }
}

/// Converts the provider's hourly block into internal rows for `zone`.
///
/// Unix times are converted to local wall-clock hours in the response's
/// `timezone`, or shifted by `offset` when no known zone is given. Hours
/// falling outside `day` are dropped, and a repeated local hour (the autumn
/// clock change) keeps its first reading. Empty summaries become `None`.
pub fn normalize_hours(
    response: TimeMachineResponse,
    zone: &ZoneCode,
    day: NaiveDate,
) -> Result<Vec<HourlyObservation>, ProviderError> {
    let clock = LocalClock::for_response(&response);
    let data = response.hourly.map(|h| h.data).unwrap_or_default();
    let received = data.len();

    let mut hours = BTreeMap::new();
    for datum in data {
        let local = clock
            .local(datum.time)
            .ok_or(ProviderError::InvalidTimestamp(datum.time))?;
        let hour = truncate_to_hour(local);
        if hour.date() != day {
            continue;
        }

        hours.entry(hour).or_insert_with(|| HourlyObservation {
            zone: zone.clone(),
            hour,
            summary: datum.summary.filter(|s| !s.trim().is_empty()),
            precip_intensity: datum.precip_intensity,
            temperature: datum.temperature,
            humidity: datum.humidity,
            wind_speed: datum.wind_speed,
            wind_gust: datum.wind_gust,
            cloud_cover: datum.cloud_cover,
        });
    }

    debug!(
        zone = %zone,
        day = %day,
        received,
        kept = hours.len(),
        "Provider hours normalised"
    );
    Ok(hours.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn zone() -> ZoneCode {
        ZoneCode::new("07306").unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2019, 5, 13).unwrap()
    }

    fn local(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M").unwrap()
    }

    #[test]
    fn test_parse_invalid_bytes() {
        let result = parse_time_machine(&[0xFF, 0xFE, 0x00, 0x01]);
        assert!(matches!(result, Err(ProviderError::Parse(_))));
    }

    #[test]
    fn test_parse_without_hourly_block() {
        let response = parse_time_machine(br#"{"latitude": 40.7, "longitude": -74.0}"#).unwrap();
        assert!(response.hourly.is_none());
        assert!(normalize_hours(response, &zone(), day()).unwrap().is_empty());
    }

    #[test]
    fn test_offset_shifts_to_local_hours() {
        // 2019-05-13T06:00Z and 07:00Z are 02:00 and 03:00 at UTC-4.
        let body = br#"{
            "offset": -4,
            "hourly": {"data": [
                {"time": 1557727200, "summary": "Clear", "temperature": 51.3,
                 "precipIntensity": 0, "humidity": 0.7, "windSpeed": 3.1,
                 "windGust": 6.2, "cloudCover": 0.05},
                {"time": 1557730800, "summary": "", "temperature": 50.9}
            ]}
        }"#;
        let hours = normalize_hours(parse_time_machine(body).unwrap(), &zone(), day()).unwrap();

        assert_eq!(hours.len(), 2);
        assert_eq!(hours[0].hour, local("2019-05-13T02:00"));
        assert_eq!(hours[0].zone, zone());
        assert_eq!(hours[0].summary.as_deref(), Some("Clear"));
        assert_eq!(hours[0].precip_intensity, Some(0.0));
        assert_eq!(hours[1].hour, local("2019-05-13T03:00"));
        assert_eq!(hours[1].summary, None);
        assert_eq!(hours[1].wind_gust, None);
    }

    #[test]
    fn test_hours_outside_day_are_dropped() {
        // 2019-05-13T03:00Z is 23:00 on the 12th at UTC-4.
        let body = br#"{"offset": -4, "hourly": {"data": [
            {"time": 1557716400, "temperature": 49.0},
            {"time": 1557727200, "temperature": 51.3}
        ]}}"#;
        let hours = normalize_hours(parse_time_machine(body).unwrap(), &zone(), day()).unwrap();
        assert_eq!(hours.len(), 1);
        assert_eq!(hours[0].hour, local("2019-05-13T02:00"));
    }

    #[test]
    fn test_repeated_local_hour_keeps_first() {
        let body = br#"{"offset": 0, "hourly": {"data": [
            {"time": 1557712800, "temperature": 1.0},
            {"time": 1557713400, "temperature": 2.0}
        ]}}"#;
        let hours = normalize_hours(parse_time_machine(body).unwrap(), &zone(), day()).unwrap();
        assert_eq!(hours.len(), 1);
        assert_eq!(hours[0].temperature, Some(1.0));
    }

    fn new_york_day(start: i64, count: i64) -> Vec<u8> {
        let data: Vec<String> = (0..count)
            .map(|k| format!(r#"{{"time": {}, "temperature": {}}}"#, start + k * 3600, k))
            .collect();
        format!(
            r#"{{"timezone": "America/New_York", "offset": -5, "hourly": {{"data": [{}]}}}}"#,
            data.join(",")
        )
        .into_bytes()
    }

    #[test]
    fn test_spring_forward_day_follows_zone_clock() {
        // 2019-03-10 00:00 EST; 02:00 local does not exist that day.
        let day = NaiveDate::from_ymd_opt(2019, 3, 10).unwrap();
        let body = new_york_day(1552194000, 23);
        let hours = normalize_hours(parse_time_machine(&body).unwrap(), &zone(), day).unwrap();

        assert_eq!(hours.len(), 23);
        assert!(hours.iter().all(|h| h.hour != local("2019-03-10T02:00")));
        assert_eq!(hours[1].hour, local("2019-03-10T01:00"));
        assert_eq!(hours[2].hour, local("2019-03-10T03:00"));
        assert_eq!(hours[2].temperature, Some(2.0));
        assert_eq!(hours[22].hour, local("2019-03-10T23:00"));
    }

    #[test]
    fn test_fall_back_day_keeps_first_repeated_hour() {
        // 2019-11-03 00:00 EDT; 01:00 local happens twice.
        let day = NaiveDate::from_ymd_opt(2019, 11, 3).unwrap();
        let body = new_york_day(1572753600, 25);
        let hours = normalize_hours(parse_time_machine(&body).unwrap(), &zone(), day).unwrap();

        assert_eq!(hours.len(), 24);
        assert_eq!(hours[1].hour, local("2019-11-03T01:00"));
        assert_eq!(hours[1].temperature, Some(1.0));
        assert_eq!(hours[2].hour, local("2019-11-03T02:00"));
        assert_eq!(hours[2].temperature, Some(3.0));
        assert_eq!(hours[23].hour, local("2019-11-03T23:00"));
    }

    #[test]
    fn test_unknown_timezone_falls_back_to_offset() {
        let body = br#"{"timezone": "Mars/Olympus_Mons", "offset": -4, "hourly": {"data": [
            {"time": 1557727200, "temperature": 51.3}
        ]}}"#;
        let hours = normalize_hours(parse_time_machine(body).unwrap(), &zone(), day()).unwrap();
        assert_eq!(hours[0].hour, local("2019-05-13T02:00"));
    }
}
