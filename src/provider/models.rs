//! Wire format of the time machine response. Only the hourly block is read.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct TimeMachineResponse {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub timezone: Option<String>,
    /// Local offset from UTC in hours; may be fractional.
    #[serde(default)]
    pub offset: f64,
    pub hourly: Option<HourlyBlock>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HourlyBlock {
    pub summary: Option<String>,
    #[serde(default)]
    pub data: Vec<HourlyDatum>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HourlyDatum {
    /// Unix seconds at the start of the hour.
    pub time: i64,
    pub summary: Option<String>,
    pub precip_intensity: Option<f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
    pub wind_gust: Option<f64>,
    pub cloud_cover: Option<f64>,
}
