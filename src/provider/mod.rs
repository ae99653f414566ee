//! Historical weather provider.
//!
//! [`WeatherProvider`] is the seam the fetcher calls through; the production
//! implementation is [`TimeMachineClient`], a client for a Dark-Sky-compatible
//! "time machine" API that returns one day of hourly observations per request.

mod models;
mod timemachine;

pub use models::{HourlyDatum, HourlyBlock, TimeMachineResponse};
pub use timemachine::{DEFAULT_BASE_URL, ProviderConfig, TimeMachineClient};

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::model::{FetchUnit, HourlyObservation};

#[async_trait]
pub trait WeatherProvider: Send + Sync {
    /// Returns the hourly observations for `unit.day` at `unit.coordinate`,
    /// normalised and tagged with `unit.zone`.
    async fn fetch_day(&self, unit: &FetchUnit) -> Result<Vec<HourlyObservation>, ProviderError>;
}
