//! Explicit run configuration handed to the pipeline at construction.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::fetcher::{
    DEFAULT_CALL_BUDGET, DEFAULT_CHECKPOINT_INTERVAL, DEFAULT_REQUEST_DELAY, FetchSettings,
};
use crate::provider::{DEFAULT_BASE_URL, ProviderConfig};

/// Environment variable holding the weather provider key.
pub const API_KEY_ENV: &str = "WEATHER_API_KEY";

pub const DEFAULT_MASTER_PATH: &str = "data/master.csv";
pub const DEFAULT_LEDGER_PATH: &str = "data/weather_ledger.jsonl";
pub const DEFAULT_GAP_TABLE_PATH: &str = "data/weather_gaps.csv";
pub const DEFAULT_UNRESOLVED_PATH: &str = "data/weather_unresolved.csv";
pub const DEFAULT_RUN_LOG_PATH: &str = "data/reconcile_runs.csv";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablePaths {
    pub master: PathBuf,
    pub ledger: PathBuf,
    pub gap_table: PathBuf,
    pub unresolved: PathBuf,
    pub run_log: PathBuf,
}

impl Default for TablePaths {
    fn default() -> Self {
        Self {
            master: DEFAULT_MASTER_PATH.into(),
            ledger: DEFAULT_LEDGER_PATH.into(),
            gap_table: DEFAULT_GAP_TABLE_PATH.into(),
            unresolved: DEFAULT_UNRESOLVED_PATH.into(),
            run_log: DEFAULT_RUN_LOG_PATH.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Only required when the provider is actually called.
    pub provider_api_key: Option<String>,
    pub provider_base_url: String,
    pub provider_timeout: Duration,
    pub call_budget: usize,
    pub checkpoint_interval: usize,
    pub request_delay: Duration,
    /// Load units from an existing gap table instead of recomputing them.
    pub reuse_gap_table: bool,
    pub paths: TablePaths,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            provider_api_key: None,
            provider_base_url: DEFAULT_BASE_URL.to_string(),
            provider_timeout: Duration::from_secs(30),
            call_budget: DEFAULT_CALL_BUDGET,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            request_delay: DEFAULT_REQUEST_DELAY,
            reuse_gap_table: false,
            paths: TablePaths::default(),
        }
    }
}

impl ReconcileConfig {
    /// Reads the API key from [`API_KEY_ENV`], ignoring an empty value.
    pub fn with_api_key_from_env(mut self) -> Self {
        self.provider_api_key = std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.trim().is_empty());
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.checkpoint_interval == 0 {
            return Err(ConfigError::ZeroCheckpointInterval);
        }
        Ok(())
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            call_budget: self.call_budget,
            checkpoint_interval: self.checkpoint_interval,
            request_delay: self.request_delay,
        }
    }

    pub fn provider_config(&self) -> Result<ProviderConfig, ConfigError> {
        let api_key = self
            .provider_api_key
            .clone()
            .ok_or(ConfigError::MissingApiKey(API_KEY_ENV))?;
        Ok(ProviderConfig {
            base_url: self.provider_base_url.clone(),
            api_key,
            timeout: self.provider_timeout,
        })
    }
}
