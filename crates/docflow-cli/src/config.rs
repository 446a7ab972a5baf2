//! CLI configuration.
//!
//! ```text
//! Cli
//! ├── storage: StorageConfig     # Object store backend, bucket, region
//! ├── worker: WorkerConfig       # Prefixes, thresholds, markers, tools
//! ├── notifier: ReqwestConfig    # Status API base URL and timeout
//! └── telemetry: TelemetryConfig # Log output format
//! ```
//!
//! Every option can be given as a flag or an environment variable.

use std::process;

use anyhow::Context;
use clap::{Args, Parser, ValueEnum};
use docflow_opendal::StorageConfig;
use docflow_webhook::reqwest::ReqwestConfig;
use docflow_worker::WorkerConfig;
use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::{TRACING_TARGET_CONFIG, TRACING_TARGET_STARTUP};

/// Complete CLI configuration.
#[derive(Debug, Clone, Parser, Serialize, Deserialize)]
#[command(name = "docflow")]
#[command(about = "Polls an object store for uploaded documents and publishes extraction results")]
#[command(version)]
pub struct Cli {
    /// Object store configuration.
    #[clap(flatten)]
    pub storage: StorageConfig,

    /// Worker configuration.
    #[clap(flatten)]
    pub worker: WorkerConfig,

    /// Status API client configuration.
    #[clap(flatten)]
    pub notifier: ReqwestConfig,

    /// Logging configuration.
    #[clap(flatten)]
    pub telemetry: TelemetryConfig,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[derive(Serialize, Deserialize, ValueEnum, Display, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LogFormat {
    /// Human readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Args, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log output format.
    #[arg(long = "log-format", env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Cli {
    /// Loads environment variables from .env file (if enabled) and parses CLI arguments.
    ///
    /// The .env file is read first so its values act as clap `env` defaults.
    pub fn init() -> Self {
        Self::load_dotenv();
        Self::parse()
    }

    #[cfg(feature = "dotenv")]
    fn load_dotenv() {
        if let Err(err) = dotenvy::dotenv()
            && !err.not_found()
        {
            eprintln!("Warning: failed to load .env file: {err}");
        }
    }

    #[cfg(not(feature = "dotenv"))]
    fn load_dotenv() {}

    /// Initializes tracing with environment-based filtering.
    pub fn init_tracing(&self) {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let registry = tracing_subscriber::registry().with(filter);

        match self.telemetry.log_format {
            LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
            LogFormat::Json => registry
                .with(tracing_subscriber::fmt::layer().json())
                .init(),
        }
    }

    /// Validates all configuration values.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.storage
            .validate()
            .context("invalid storage configuration")?;
        self.worker
            .validate()
            .context("invalid worker configuration")?;
        self.notifier
            .mark_done_url()
            .context("invalid status API base URL")?;
        Ok(())
    }

    /// Logs the effective configuration, without credentials.
    pub fn log(&self) {
        Self::log_build_info();

        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            backend = %self.storage.backend,
            bucket = %self.storage.bucket,
            region = ?self.storage.region,
            endpoint = ?self.storage.endpoint,
            static_credentials = self.storage.access_key_id.is_some(),
            "Storage configuration"
        );

        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            poll_interval_secs = self.worker.poll_interval,
            min_upload_size = self.worker.min_upload_size,
            uploads_prefix = %self.worker.uploads_prefix,
            results_prefix = %self.worker.results_prefix,
            document_extension = %self.worker.document_extension(),
            staging_dir = %self.worker.staging_dir.display(),
            marker_store = %self.worker.marker_store,
            clean_staging = self.worker.clean_staging,
            "Worker configuration"
        );

        let pipeline = &self.worker.pipeline;
        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            working_dir = %pipeline.working_dir.display(),
            extract = %format_command(&pipeline.extract_program, &pipeline.extract_args),
            render = %format_command(&pipeline.render_program, &pipeline.render_args),
            "Pipeline configuration"
        );

        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            api_base = %self.notifier.api_base,
            timeout_secs = self.notifier.effective_timeout().as_secs(),
            "Notifier configuration"
        );
    }

    fn log_build_info() {
        tracing::debug!(
            target: TRACING_TARGET_STARTUP,
            version = env!("CARGO_PKG_VERSION"),
            pid = process::id(),
            arch = std::env::consts::ARCH,
            os = std::env::consts::OS,
            features = ?Self::enabled_features(),
            "Build information"
        );
    }

    /// Returns a list of enabled compile-time features.
    fn enabled_features() -> Vec<&'static str> {
        [
            cfg!(feature = "dotenv").then_some("dotenv"),
            cfg!(feature = "fs").then_some("fs"),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

fn format_command(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}
