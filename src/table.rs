//! CSV persistence for the master table, the gap table and the unresolved
//! report.
//!
//! Zone codes and station ids are written and read as text, floats use the
//! shortest representation that round-trips, and timestamps are ISO 8601
//! without a zone.

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::model::{
    Coordinate, FetchUnit, StationObservation, UnresolvedRow, WeatherAnnotation, WeatherStatus,
};
use crate::zone::ZoneCode;

/// One row of the master table as laid out on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterRecord {
    pub station_id: String,
    pub station_name: String,
    pub station_status: String,
    pub latitude: f64,
    pub longitude: f64,
    pub zone: Option<ZoneCode>,
    pub region: Option<String>,
    pub available_bikes: u32,
    pub available_docks: u32,
    pub observed_at: NaiveDateTime,
    pub weather_summary: Option<String>,
    pub precip_intensity: Option<f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
    pub wind_gust: Option<f64>,
    pub cloud_cover: Option<f64>,
    pub weather_status: WeatherStatus,
}

impl From<&StationObservation> for MasterRecord {
    fn from(obs: &StationObservation) -> Self {
        Self {
            station_id: obs.station_id.clone(),
            station_name: obs.station_name.clone(),
            station_status: obs.station_status.clone(),
            latitude: obs.latitude,
            longitude: obs.longitude,
            zone: obs.zone.clone(),
            region: obs.region.clone(),
            available_bikes: obs.available_bikes,
            available_docks: obs.available_docks,
            observed_at: obs.observed_at,
            weather_summary: obs.weather.summary.clone(),
            precip_intensity: obs.weather.precip_intensity,
            temperature: obs.weather.temperature,
            humidity: obs.weather.humidity,
            wind_speed: obs.weather.wind_speed,
            wind_gust: obs.weather.wind_gust,
            cloud_cover: obs.weather.cloud_cover,
            weather_status: obs.weather.status,
        }
    }
}

impl From<MasterRecord> for StationObservation {
    fn from(rec: MasterRecord) -> Self {
        Self {
            station_id: rec.station_id,
            station_name: rec.station_name,
            station_status: rec.station_status,
            latitude: rec.latitude,
            longitude: rec.longitude,
            zone: rec.zone,
            region: rec.region,
            available_bikes: rec.available_bikes,
            available_docks: rec.available_docks,
            observed_at: rec.observed_at,
            weather: WeatherAnnotation {
                summary: rec.weather_summary,
                precip_intensity: rec.precip_intensity,
                temperature: rec.temperature,
                humidity: rec.humidity,
                wind_speed: rec.wind_speed,
                wind_gust: rec.wind_gust,
                cloud_cover: rec.cloud_cover,
                status: rec.weather_status,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapRecord {
    pub zone: ZoneCode,
    pub day: NaiveDate,
    pub latitude: f64,
    pub longitude: f64,
}

impl From<&FetchUnit> for GapRecord {
    fn from(unit: &FetchUnit) -> Self {
        Self {
            zone: unit.zone.clone(),
            day: unit.day,
            latitude: unit.coordinate.latitude,
            longitude: unit.coordinate.longitude,
        }
    }
}

impl From<GapRecord> for FetchUnit {
    fn from(rec: GapRecord) -> Self {
        Self {
            zone: rec.zone,
            day: rec.day,
            coordinate: Coordinate::new(rec.latitude, rec.longitude),
        }
    }
}

fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = File::open(path).with_context(|| format!("Failed to open '{}'", path.display()))?;
    let mut rdr = ReaderBuilder::new().trim(csv::Trim::Headers).from_reader(file);

    let mut rows = Vec::new();
    for (idx, result) in rdr.deserialize().enumerate() {
        let record: T = result
            .with_context(|| format!("Bad record {} in '{}'", idx + 1, path.display()))?;
        rows.push(record);
    }
    Ok(rows)
}

/// Writes `rows` to a sibling temp file and renames it over `path`, so a
/// crash mid-write never leaves a truncated table behind.
fn replace_records<T: Serialize>(path: &Path, rows: impl IntoIterator<Item = T>) -> Result<usize> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory '{}'", dir.display()))?;
    }

    let tmp = temp_path(path);
    let file = File::create(&tmp).with_context(|| format!("Failed to create '{}'", tmp.display()))?;
    let mut writer = WriterBuilder::new().has_headers(true).from_writer(file);

    let mut count = 0;
    for row in rows {
        writer.serialize(row)?;
        count += 1;
    }
    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to finish '{}': {}", tmp.display(), e.error()))?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace '{}'", path.display()))?;
    debug!(path = %path.display(), rows = count, "Table written");
    Ok(count)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

pub fn read_master_table(path: impl AsRef<Path>) -> Result<Vec<StationObservation>> {
    let path = path.as_ref();
    let rows: Vec<MasterRecord> = read_records(path)?;
    info!(path = %path.display(), rows = rows.len(), "Master table loaded");
    Ok(rows.into_iter().map(StationObservation::from).collect())
}

pub fn write_master_table(path: impl AsRef<Path>, rows: &[StationObservation]) -> Result<()> {
    let path = path.as_ref();
    let count = replace_records(path, rows.iter().map(MasterRecord::from))?;
    info!(path = %path.display(), rows = count, "Master table replaced");
    Ok(())
}

pub fn read_gap_table(path: impl AsRef<Path>) -> Result<Vec<FetchUnit>> {
    let path = path.as_ref();
    let rows: Vec<GapRecord> = read_records(path)?;
    let mut units: Vec<FetchUnit> = rows.into_iter().map(FetchUnit::from).collect();
    units.sort_by_key(FetchUnit::key);
    units.dedup_by_key(|u| u.key());
    info!(path = %path.display(), units = units.len(), "Gap table loaded");
    Ok(units)
}

pub fn write_gap_table(path: impl AsRef<Path>, units: &[FetchUnit]) -> Result<()> {
    let path = path.as_ref();
    let count = replace_records(path, units.iter().map(GapRecord::from))?;
    info!(path = %path.display(), units = count, "Gap table written");
    Ok(())
}

pub fn write_unresolved(path: impl AsRef<Path>, rows: &[UnresolvedRow]) -> Result<()> {
    let path = path.as_ref();
    let count = replace_records(path, rows)?;
    info!(path = %path.display(), rows = count, "Unresolved report written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UnresolvedReason;
    use tempfile::tempdir;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").unwrap()
    }

    fn sample_rows() -> Vec<StationObservation> {
        vec![
            StationObservation {
                station_id: "3186".into(),
                station_name: "Grove St PATH".into(),
                station_status: "Active".into(),
                latitude: 40.71958611647166,
                longitude: -74.04311746358871,
                zone: Some(ZoneCode::new("07302").unwrap()),
                region: Some("Jersey City".into()),
                available_bikes: 7,
                available_docks: 21,
                observed_at: ts("2019-05-13T02:03:27.125"),
                weather: WeatherAnnotation {
                    summary: Some("Light Rain, Breezy".into()),
                    precip_intensity: Some(0.0301),
                    temperature: Some(48.93),
                    humidity: Some(0.96),
                    wind_speed: Some(14.07),
                    wind_gust: Some(25.3),
                    cloud_cover: Some(1.0),
                    status: WeatherStatus::Observed,
                },
            },
            StationObservation {
                station_id: "0072".into(),
                station_name: "W 52 St & 11 Ave".into(),
                station_status: "Active".into(),
                latitude: 40.76727216,
                longitude: -73.99392888,
                zone: None,
                region: None,
                available_bikes: 0,
                available_docks: 39,
                observed_at: ts("2019-05-13T02:00:00"),
                weather: WeatherAnnotation::absent(),
            },
            StationObservation {
                station_id: "3639".into(),
                station_name: "Harborside".into(),
                station_status: "Active".into(),
                latitude: 40.7192517,
                longitude: -74.034234,
                zone: Some(ZoneCode::new("07311").unwrap()),
                region: Some("Jersey City".into()),
                available_bikes: 12,
                available_docks: 18,
                observed_at: ts("2019-05-13T02:00:00"),
                weather: WeatherAnnotation {
                    summary: Some("Overcast".into()),
                    precip_intensity: None,
                    temperature: Some(49.0),
                    humidity: None,
                    wind_speed: None,
                    wind_gust: None,
                    cloud_cover: None,
                    status: WeatherStatus::Provisional,
                },
            },
        ]
    }

    #[test]
    fn test_master_table_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("master.csv");
        let rows = sample_rows();

        write_master_table(&path, &rows).unwrap();
        let back = read_master_table(&path).unwrap();

        assert_eq!(back, rows);
    }

    #[test]
    fn test_leading_zeros_written_as_text() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("master.csv");
        write_master_table(&path, &sample_rows()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains(",07302,"));
        assert!(content.starts_with("station_id,station_name,"));
        assert!(content.contains("\n0072,"));
        assert!(!dir.path().join("master.csv.tmp").exists());
    }

    #[test]
    fn test_replace_overwrites_previous_version() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("master.csv");
        let rows = sample_rows();
        write_master_table(&path, &rows).unwrap();
        write_master_table(&path, &rows[..1]).unwrap();
        assert_eq!(read_master_table(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_bad_zone_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("master.csv");
        write_master_table(&path, &sample_rows()[..1]).unwrap();
        let content = fs::read_to_string(&path).unwrap().replace("07302", "07-302");
        fs::write(&path, content).unwrap();
        assert!(read_master_table(&path).is_err());
    }

    #[test]
    fn test_gap_table_round_trip_sorted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gaps.csv");
        let day = NaiveDate::from_ymd_opt(2019, 5, 13).unwrap();
        let units = vec![
            FetchUnit {
                zone: ZoneCode::new("11101").unwrap(),
                day,
                coordinate: Coordinate::new(40.7447, -73.9485),
            },
            FetchUnit {
                zone: ZoneCode::new("07306").unwrap(),
                day,
                coordinate: Coordinate::new(40.7324, -74.0637),
            },
        ];
        write_gap_table(&path, &units).unwrap();
        let back = read_gap_table(&path).unwrap();
        assert_eq!(back, vec![units[1].clone(), units[0].clone()]);
    }

    #[test]
    fn test_unresolved_report_written() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("unresolved.csv");
        let rows = vec![UnresolvedRow {
            station_id: "0072".into(),
            zone: None,
            observed_at: ts("2019-05-13T02:00:00"),
            reason: UnresolvedReason::MissingZone,
        }];
        write_unresolved(&path, &rows).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("station_id,zone,observed_at,reason"));
        assert!(content.contains("0072,,2019-05-13T02:00:00,missing_zone"));
    }
}
