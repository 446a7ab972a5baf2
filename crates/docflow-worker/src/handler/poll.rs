//! Polling worker.

use std::sync::Arc;
use std::time::Instant;

use futures::TryStreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{Clock, CycleReport, JobFailure, TokioClock};
use crate::job::{Candidate, JobId, JobStage, JobState};
use crate::service::WorkerState;
use crate::{Result, WorkerError};

/// Tracing target for the poll loop.
const TRACING_TARGET: &str = "docflow_worker::poll";

/// Background worker that polls the uploads prefix.
///
/// Jobs run one at a time, in listing order. A failed job is left without a
/// completion marker and is picked up again by the next cycle.
pub struct PollWorker {
    state: WorkerState,
    clock: Arc<dyn Clock>,
    cancel_token: CancellationToken,
}

impl PollWorker {
    /// Creates a new poll worker.
    ///
    /// Cancelling `cancel_token` stops the loop. A job in flight at that
    /// moment is abandoned without a marker, and its tool processes are killed.
    pub fn new(state: WorkerState, cancel_token: CancellationToken) -> Self {
        Self {
            state,
            clock: Arc::new(TokioClock),
            cancel_token,
        }
    }

    /// Replaces the clock used between cycles.
    pub fn with_clock<C>(mut self, clock: C) -> Self
    where
        C: Clock + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    /// Returns the worker state.
    pub fn state(&self) -> &WorkerState {
        &self.state
    }

    /// Spawns the worker as a background task.
    pub fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }

    /// Runs cycles until cancelled, sleeping the poll interval between them.
    #[tracing::instrument(skip(self), target = TRACING_TARGET, name = "poll_worker")]
    pub async fn run(self) -> Result<()> {
        self.state.prepare().await?;

        let interval = self.state.config.poll_interval();
        tracing::info!(
            target: TRACING_TARGET,
            interval_secs = interval.as_secs(),
            uploads_prefix = %self.state.config.uploads_prefix,
            "Starting poll worker"
        );

        loop {
            tokio::select! {
                biased;

                () = self.cancel_token.cancelled() => break,
                _ = self.run_cycle() => {}
            }

            tokio::select! {
                biased;

                () = self.cancel_token.cancelled() => break,
                () = self.clock.sleep(interval) => {}
            }
        }

        tracing::info!(
            target: TRACING_TARGET,
            "Shutdown requested, stopping poll worker"
        );

        Ok(())
    }

    /// Runs `cycles` cycles, each followed by the poll interval sleep.
    ///
    /// Stops early when cancelled. Returns the reports of completed cycles.
    pub async fn run_for(&self, cycles: usize) -> Vec<CycleReport> {
        let interval = self.state.config.poll_interval();
        let mut reports = Vec::with_capacity(cycles);

        for _ in 0..cycles {
            tokio::select! {
                biased;

                () = self.cancel_token.cancelled() => break,
                report = self.run_cycle() => reports.push(report),
            }

            tokio::select! {
                biased;

                () = self.cancel_token.cancelled() => break,
                () = self.clock.sleep(interval) => {}
            }
        }

        reports
    }

    /// Runs a single discovery pass and processes every candidate it yields.
    pub async fn run_cycle(&self) -> CycleReport {
        let started_at = Instant::now();
        let mut report = CycleReport::default();

        let candidates = self.state.discovery().discover();
        let mut candidates = std::pin::pin!(candidates);

        loop {
            let candidate = match candidates.try_next().await {
                Ok(Some(candidate)) => candidate,
                Ok(None) => break,
                Err(err) => {
                    tracing::error!(
                        target: TRACING_TARGET,
                        error = %err.chain(),
                        "Discovery failed, retrying next cycle"
                    );
                    report.discovery_error = Some(err);
                    break;
                }
            };

            report.discovered += 1;
            match self.process_job(&candidate).await {
                Ok(()) => report.committed.push(candidate.job_id),
                Err(failure) => report.failed.push(failure),
            }
        }

        report.elapsed = started_at.elapsed();

        if report.is_idle() {
            tracing::trace!(target: TRACING_TARGET, "No new uploads");
        } else {
            tracing::info!(
                target: TRACING_TARGET,
                discovered = report.discovered,
                committed = report.committed.len(),
                failed = report.failed.len(),
                elapsed_ms = report.elapsed.as_millis(),
                "Poll cycle finished"
            );
        }

        report
    }

    /// Drives one job from download to commit.
    ///
    /// The completion marker is written only after the notification has been
    /// acknowledged, so any failure leaves the job eligible for retry.
    #[tracing::instrument(
        skip(self, candidate),
        fields(doc_id = %candidate.job_id),
        target = TRACING_TARGET
    )]
    async fn process_job(&self, candidate: &Candidate) -> Result<(), JobFailure> {
        let job_id = &candidate.job_id;
        let started_at = Instant::now();
        let fail = |reached: JobState, error: WorkerError| {
            fail_job(job_id.clone(), reached, error)
        };

        tracing::info!(
            target: TRACING_TARGET,
            doc_id = %job_id,
            key = %candidate.key,
            size = candidate.size_bytes,
            "Processing document"
        );

        let source = self
            .state
            .staging
            .download(&self.state.storage, candidate)
            .await
            .map_err(|err| fail(JobState::Discovered, err))?;

        self.state
            .pipeline
            .extract(job_id, &source)
            .await
            .map_err(|err| fail(JobState::Downloaded, err))?;

        self.state
            .pipeline
            .render(job_id)
            .await
            .map_err(|err| fail(JobState::Downloaded, err))?;

        self.state
            .publisher()
            .publish(job_id)
            .await
            .map_err(|err| fail(JobState::Extracted, err))?;

        self.state
            .notifier
            .mark_done(job_id.as_str())
            .await
            .map_err(|err| fail(JobState::Published, WorkerError::Notification(err)))?;

        self.state
            .tracker
            .mark_complete(job_id)
            .await
            .map_err(|err| fail(JobState::Notified, err))?;

        tracing::info!(
            target: TRACING_TARGET,
            doc_id = %job_id,
            elapsed_ms = started_at.elapsed().as_millis(),
            "Document committed"
        );

        if self.state.config.clean_staging {
            self.clean_staging(job_id).await;
        }

        Ok(())
    }

    async fn clean_staging(&self, job_id: &JobId) {
        if let Err(err) = self.state.staging.clean(job_id).await {
            tracing::warn!(
                target: TRACING_TARGET,
                doc_id = %job_id,
                error = %err,
                "Failed to remove staged source"
            );
        }
    }
}

fn fail_job(job_id: JobId, reached: JobState, error: WorkerError) -> JobFailure {
    let stage = error
        .stage()
        .or(reached.pending_stage())
        .unwrap_or(JobStage::Commit);

    tracing::error!(
        target: TRACING_TARGET,
        doc_id = %job_id,
        stage = %stage,
        reached = %reached,
        error = %error.chain(),
        "Document failed, will retry next cycle"
    );

    JobFailure {
        job_id,
        stage,
        reached,
        error,
    }
}

impl std::fmt::Debug for PollWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollWorker")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
