//! Worker state and services.
//!
//! - [`Discovery`] finds uploads that still need processing
//! - [`StagingArea`] holds downloaded sources
//! - [`Pipeline`] runs the extraction and rendering tools
//! - [`Publisher`] uploads results
//! - [`CompletionStore`] records committed jobs

mod config;
mod discovery;
mod pipeline;
mod publisher;
mod staging;
mod tracker;

use std::sync::Arc;

pub use config::{
    DEFAULT_DOCUMENT_EXTENSION, DEFAULT_MARKERS_PREFIX, DEFAULT_MIN_UPLOAD_SIZE,
    DEFAULT_POLL_INTERVAL_SECS, DEFAULT_RESULTS_PREFIX, DEFAULT_UPLOADS_PREFIX, MarkerStoreKind,
    PipelineConfig, WorkerConfig,
};
pub use discovery::{Discovery, DiscoveryFilter, SkipReason};
use docflow_opendal::StorageBackend;
use docflow_webhook::NotifierService;
pub use pipeline::{CommandPipeline, OutputLayout, Pipeline, ToolCommand};
pub use publisher::{PublishSummary, Publisher};
pub use staging::StagingArea;
pub use tracker::{CompletionStore, FsCompletionStore, ObjectCompletionStore};

use crate::{Result, TRACING_TARGET};

/// Everything a poll worker needs to run a cycle.
///
/// Cheap to clone; all services are shared handles.
#[derive(Clone)]
pub struct WorkerState {
    /// Object store holding uploads, results and optionally markers.
    pub storage: StorageBackend,
    /// Durable record of committed jobs.
    pub tracker: Arc<dyn CompletionStore>,
    /// Extraction and rendering tools.
    pub pipeline: Arc<dyn Pipeline>,
    /// Status API client.
    pub notifier: NotifierService,
    /// Local download directory.
    pub staging: StagingArea,
    /// Worker settings.
    pub config: WorkerConfig,
}

impl WorkerState {
    /// Creates worker state, choosing the completion store from `config`.
    pub fn new<P>(
        config: WorkerConfig,
        storage: StorageBackend,
        pipeline: P,
        notifier: NotifierService,
    ) -> Result<Self>
    where
        P: Pipeline + 'static,
    {
        config.validate()?;

        let tracker: Arc<dyn CompletionStore> = match config.marker_store {
            MarkerStoreKind::Fs => Arc::new(FsCompletionStore::new(config.marker_dir())),
            MarkerStoreKind::Object => Arc::new(ObjectCompletionStore::new(
                storage.clone(),
                config.markers_prefix.clone(),
            )),
        };

        let staging = StagingArea::new(&config.staging_dir, config.document_extension());

        tracing::info!(
            target: TRACING_TARGET,
            uploads_prefix = %config.uploads_prefix,
            results_prefix = %config.results_prefix,
            marker_store = %config.marker_store,
            staging_dir = %config.staging_dir.display(),
            "Worker state initialized"
        );

        Ok(Self {
            storage,
            tracker,
            pipeline: Arc::new(pipeline),
            notifier,
            staging,
            config,
        })
    }

    /// Creates worker state running the configured external tools.
    pub fn with_command_pipeline(
        config: WorkerConfig,
        storage: StorageBackend,
        notifier: NotifierService,
    ) -> Result<Self> {
        let pipeline = CommandPipeline::new(&config.pipeline);
        Self::new(config, storage, pipeline, notifier)
    }

    /// Returns a discovery over the uploads prefix.
    pub fn discovery(&self) -> Discovery {
        Discovery::new(
            self.storage.clone(),
            self.tracker.clone(),
            DiscoveryFilter::new(self.config.min_upload_size, self.config.document_extension()),
            self.config.uploads_prefix.clone(),
        )
    }

    /// Returns a publisher writing below the results prefix.
    pub fn publisher(&self) -> Publisher {
        Publisher::new(
            self.storage.clone(),
            OutputLayout::new(&self.config.pipeline),
            self.config.results_prefix.clone(),
        )
    }

    /// Creates local directories the worker writes to.
    pub async fn prepare(&self) -> Result<()> {
        self.staging.prepare().await
    }
}

impl std::fmt::Debug for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerState")
            .field("storage", &self.storage)
            .field("staging", &self.staging)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
