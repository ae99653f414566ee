//! Typed errors at the seams callers need to match on.
//!
//! File and table plumbing below these seams uses `anyhow` with context.

use thiserror::Error;

use crate::model::{Coordinate, UnitKey};
use crate::pipeline::Stage;

/// A weather provider call that did not produce usable hours.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("coordinate {0} is outside the valid latitude/longitude range")]
    InvalidCoordinate(Coordinate),

    #[error("invalid request url {0}")]
    InvalidUrl(String),

    #[error("network request failed")]
    Transport(#[from] reqwest::Error),

    #[error("provider returned status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("malformed provider response")]
    Parse(#[from] serde_json::Error),

    #[error("provider returned unrepresentable timestamp {0}")]
    InvalidTimestamp(i64),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("provider call for {unit} failed")]
    Provider {
        unit: UnitKey,
        #[source]
        source: ProviderError,
    },

    #[error("failed to checkpoint the ledger")]
    Checkpoint(#[source] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {0} must be set to call the weather provider")]
    MissingApiKey(&'static str),

    #[error("checkpoint interval must be at least 1")]
    ZeroCheckpointInterval,
}

/// A run that halted before reaching `Done`.
#[derive(Debug, Error)]
#[error(
    "{stage} failed (last durable ledger unit: {})",
    describe_checkpoint(.last_durable)
)]
pub struct PipelineError {
    pub stage: Stage,
    pub last_durable: Option<UnitKey>,
    #[source]
    pub source: anyhow::Error,
}

impl PipelineError {
    pub fn new(stage: Stage, last_durable: Option<UnitKey>, source: impl Into<anyhow::Error>) -> Self {
        Self {
            stage,
            last_durable,
            source: source.into(),
        }
    }
}

fn describe_checkpoint(key: &Option<UnitKey>) -> String {
    key.as_ref()
        .map_or_else(|| "none".to_string(), ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zone::ZoneCode;
    use chrono::NaiveDate;

    #[test]
    fn test_pipeline_error_names_stage_and_checkpoint() {
        let key = UnitKey {
            day: NaiveDate::from_ymd_opt(2019, 5, 13).unwrap(),
            zone: ZoneCode::new("07306").unwrap(),
        };
        let err = PipelineError::new(Stage::Fetching, Some(key), anyhow::anyhow!("boom"));
        let msg = err.to_string();
        assert!(msg.contains("fetching"));
        assert!(msg.contains("07306@2019-05-13"));

        let err = PipelineError::new(Stage::Reconciling, None, anyhow::anyhow!("boom"));
        assert!(err.to_string().contains("none"));
    }
}
