#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod config;
mod shutdown;

use std::process;

use anyhow::Context;
use docflow_opendal::StorageBackend;
use docflow_webhook::reqwest::ReqwestClient;
use docflow_worker::{PollWorker, WorkerState};
use tokio_util::sync::CancellationToken;

use crate::config::Cli;
use crate::shutdown::shutdown_signal;

// Tracing target constants
pub const TRACING_TARGET_STARTUP: &str = "docflow_cli::startup";
pub const TRACING_TARGET_SHUTDOWN: &str = "docflow_cli::shutdown";
pub const TRACING_TARGET_CONFIG: &str = "docflow_cli::config";

#[tokio::main]
async fn main() {
    let Err(error) = run().await else {
        tracing::info!(
            target: TRACING_TARGET_SHUTDOWN,
            "application terminated successfully"
        );
        process::exit(0);
    };

    if tracing::enabled!(tracing::Level::ERROR) {
        tracing::error!(
            target: TRACING_TARGET_SHUTDOWN,
            error = %format!("{error:#}"),
            "application terminated with error"
        );
    } else {
        eprintln!("Error: {error:#}");
    }

    process::exit(1);
}

/// Main application entry point.
async fn run() -> anyhow::Result<()> {
    let cli = Cli::init();

    cli.init_tracing();
    tracing::info!(
        target: TRACING_TARGET_STARTUP,
        version = env!("CARGO_PKG_VERSION"),
        "starting docflow worker"
    );
    cli.log();
    cli.validate()?;

    let state = create_worker_state(cli).context("failed to create worker state")?;
    state
        .prepare()
        .await
        .context("failed to prepare staging directory")?;

    let cancel_token = CancellationToken::new();
    let mut worker = PollWorker::new(state, cancel_token.clone()).spawn();

    let finished = tokio::select! {
        () = shutdown_signal() => {
            tracing::info!(
                target: TRACING_TARGET_SHUTDOWN,
                "Shutdown requested, abandoning in-flight work"
            );
            cancel_token.cancel();
            None
        }
        result = &mut worker => Some(result),
    };

    let result = match finished {
        Some(result) => result,
        None => worker.await,
    };
    result
        .context("poll worker panicked")?
        .context("poll worker failed")?;

    Ok(())
}

/// Connects the object store and status API client.
fn create_worker_state(cli: Cli) -> anyhow::Result<WorkerState> {
    let storage = StorageBackend::new(cli.storage).context("failed to initialize object store")?;
    let notifier = ReqwestClient::new(cli.notifier)
        .context("failed to create status API client")?
        .into_service();

    WorkerState::with_command_pipeline(cli.worker, storage, notifier).map_err(Into::into)
}
