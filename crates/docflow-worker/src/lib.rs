#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod error;
pub mod handler;
pub mod job;
pub mod service;

pub use error::{BoxedError, ErrorChain, PipelineFailure, Result, WorkerError};
pub use handler::{Clock, CycleReport, JobFailure, PollWorker, TokioClock};
pub use job::{Candidate, JobId, JobStage, JobState, PipelineStage, UploadObject};
pub use service::{
    CommandPipeline, CompletionStore, Discovery, DiscoveryFilter, FsCompletionStore,
    MarkerStoreKind, ObjectCompletionStore, OutputLayout, Pipeline, PipelineConfig,
    PublishSummary, Publisher, SkipReason, StagingArea, WorkerConfig, WorkerState,
};

/// Tracing target for worker operations.
pub const TRACING_TARGET: &str = "docflow_worker";
