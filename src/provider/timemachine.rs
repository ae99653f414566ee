use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, instrument};

use super::WeatherProvider;
use crate::error::ProviderError;
use crate::fetch::auth::PathKey;
use crate::fetch::{BasicClient, HttpClient, fetch_bytes};
use crate::model::{FetchUnit, HourlyObservation};
use crate::parser::{normalize_hours, parse_time_machine};

pub const DEFAULT_BASE_URL: &str = "https://api.darksky.net/forecast";

/// Blocks the provider would otherwise send alongside the hourly series.
const EXCLUDED_BLOCKS: &str = "currently,minutely,daily,alerts,flags";

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl ProviderConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Time machine client; the API key travels as a path segment ahead of the
/// `{lat},{lon},{time}` segment.
#[derive(Debug)]
pub struct TimeMachineClient<C = PathKey<BasicClient>> {
    http: C,
    base_url: String,
}

impl TimeMachineClient {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let basic = BasicClient::new(config.timeout)?;
        Ok(Self::with_http(
            PathKey::new(basic, config.api_key.clone()),
            &config.base_url,
        ))
    }
}

impl<C: HttpClient> TimeMachineClient<C> {
    pub fn with_http(http: C, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// `{base}/{lat},{lon},{day}T00:00:00?exclude=...`, the day given as local
    /// midnight at the requested point.
    pub fn request_url(&self, unit: &FetchUnit) -> String {
        format!(
            "{}/{},{},{}T00:00:00?exclude={}",
            self.base_url,
            unit.coordinate.latitude,
            unit.coordinate.longitude,
            unit.day.format("%Y-%m-%d"),
            EXCLUDED_BLOCKS
        )
    }
}

#[async_trait]
impl<C: HttpClient> WeatherProvider for TimeMachineClient<C> {
    #[instrument(skip(self, unit), fields(zone = %unit.zone, day = %unit.day, coordinate = %unit.coordinate))]
    async fn fetch_day(&self, unit: &FetchUnit) -> Result<Vec<HourlyObservation>, ProviderError> {
        if !unit.coordinate.is_valid() {
            return Err(ProviderError::InvalidCoordinate(unit.coordinate));
        }

        let bytes = fetch_bytes(&self.http, &self.request_url(unit)).await?;
        let response = parse_time_machine(&bytes)?;
        debug!(timezone = ?response.timezone, offset = response.offset, "Provider response decoded");

        normalize_hours(response, &unit.zone, unit.day)
    }
}
