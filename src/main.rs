//! CLI entry point for the bike-share weather reconciler.
//!
//! Provides subcommands for a full reconciliation run, gap detection only,
//! a read-only status view, and merging an existing ledger without fetching.

use anyhow::Result;
use bikeshare_weather::{
    config::{
        DEFAULT_GAP_TABLE_PATH, DEFAULT_LEDGER_PATH, DEFAULT_MASTER_PATH,
        DEFAULT_RUN_LOG_PATH, DEFAULT_UNRESOLVED_PATH, ReconcileConfig, TablePaths,
    },
    error::PipelineError,
    output::{append_record, print_json, print_pretty},
    pipeline::{self, Pipeline, Stage},
    provider::{DEFAULT_BASE_URL, TimeMachineClient},
    report::RunReport,
};
use clap::{Args, Parser, Subcommand};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "bikeshare_weather")]
#[command(about = "Backfill observed hourly weather onto bike-share station snapshots", long_about = None)]
struct Cli {
    #[command(flatten)]
    paths: PathArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct PathArgs {
    /// Master table of station observations
    #[arg(long, global = true, default_value = DEFAULT_MASTER_PATH)]
    master: PathBuf,

    /// Fetch ledger (JSON Lines)
    #[arg(long, global = true, default_value = DEFAULT_LEDGER_PATH)]
    ledger: PathBuf,

    /// Gap table of (zone, day) fetch units
    #[arg(long, global = true, default_value = DEFAULT_GAP_TABLE_PATH)]
    gaps: PathBuf,

    /// Report of rows still lacking observed weather
    #[arg(long, global = true, default_value = DEFAULT_UNRESOLVED_PATH)]
    unresolved: PathBuf,

    /// CSV file to append one row per invocation to
    #[arg(long, global = true, default_value = DEFAULT_RUN_LOG_PATH)]
    run_log: PathBuf,
}

impl From<PathArgs> for TablePaths {
    fn from(args: PathArgs) -> Self {
        Self {
            master: args.master,
            ledger: args.ledger,
            gap_table: args.gaps,
            unresolved: args.unresolved,
            run_log: args.run_log,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Detect gaps, fetch missing weather within budget, and merge it back
    Run {
        /// Maximum provider calls for this invocation
        #[arg(short, long, default_value_t = 999)]
        budget: usize,

        /// Flush the ledger every N completed units
        #[arg(long, default_value_t = 10)]
        checkpoint_interval: usize,

        /// Pause between provider calls, in milliseconds
        #[arg(long, default_value_t = 1000)]
        delay_ms: u64,

        /// HTTP timeout per provider call, in seconds
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,

        /// Provider endpoint
        #[arg(long, default_value = DEFAULT_BASE_URL)]
        base_url: String,

        /// Load fetch units from an existing gap table instead of recomputing
        #[arg(long, default_value_t = false)]
        reuse_gaps: bool,
    },
    /// Resolve zone coordinates and write the gap table, without fetching
    Gaps,
    /// Show weather status counts and fetch progress, without writing
    Status,
    /// Merge the existing ledger into the master table, without fetching
    Reconcile,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/bikeshare_weather.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .filter(|d| !d.as_os_str().is_empty())
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("bikeshare_weather.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let mut config = ReconcileConfig {
        paths: cli.paths.into(),
        ..Default::default()
    };

    match cli.command {
        Commands::Run {
            budget,
            checkpoint_interval,
            delay_ms,
            timeout_secs,
            base_url,
            reuse_gaps,
        } => {
            config = ReconcileConfig {
                call_budget: budget,
                checkpoint_interval,
                request_delay: Duration::from_millis(delay_ms),
                provider_timeout: Duration::from_secs(timeout_secs),
                provider_base_url: base_url,
                reuse_gap_table: reuse_gaps,
                ..config
            }
            .with_api_key_from_env();

            let outcome = run(&config).await;
            finish(&config, "run", outcome)?;
        }
        Commands::Gaps => {
            let outcome = pipeline::detect_only(&config);
            finish(&config, "gaps", outcome)?;
        }
        Commands::Status => {
            let status = pipeline::status(&config)?;
            print_pretty(&status);
            print_json(&status)?;
            info!(
                observed_pct = format!("{:.1}", status.observed_pct()),
                pending = status.units_pending,
                "Status"
            );
        }
        Commands::Reconcile => {
            let outcome = pipeline::reconcile_only(&config);
            finish(&config, "reconcile", outcome)?;
        }
    }

    Ok(())
}

/// Builds the HTTP provider and runs every pipeline stage.
#[tracing::instrument(skip_all, fields(budget = config.call_budget))]
async fn run(config: &ReconcileConfig) -> Result<RunReport, PipelineError> {
    let provider_config = config
        .provider_config()
        .map_err(|e| PipelineError::new(Stage::Idle, None, e))?;
    let provider = TimeMachineClient::new(&provider_config)
        .map_err(|e| PipelineError::new(Stage::Idle, None, e))?;
    if !config.provider_base_url.starts_with("https://") {
        warn!(base_url = %config.provider_base_url, "Provider endpoint is not using https");
    }

    Pipeline::new(config.clone(), provider).run().await
}

/// Records the invocation in the run log, then surfaces any failure.
fn finish(
    config: &ReconcileConfig,
    command: &str,
    outcome: Result<RunReport, PipelineError>,
) -> Result<()> {
    match outcome {
        Ok(report) => {
            print_json(&report)?;
            append_record(&config.paths.run_log, &report)?;
            info!(
                command,
                fixed = report.rows_fixed,
                fixed_pct = format!("{:.1}", report.fixed_pct()),
                "Run recorded"
            );
            if report.rows_outstanding > 0 {
                warn!(
                    outstanding = report.rows_outstanding,
                    resume_from = report.resume_from.as_deref().unwrap_or("-"),
                    "Rows still lack observed weather; run again to continue"
                );
            }
            Ok(())
        }
        Err(e) => {
            error!(
                stage = %e.stage,
                last_durable = ?e.last_durable.as_ref().map(ToString::to_string),
                error = format!("{e:#}"),
                "Pipeline failed"
            );
            let report = RunReport::from_error(command, e.stage.as_str(), &format!("{:#}", e.source));
            if let Err(log_err) = append_record(&config.paths.run_log, &report) {
                error!(error = %log_err, "Failed to write run log");
            }
            Err(e.into())
        }
    }
}
