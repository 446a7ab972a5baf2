//! Poll cycle outcomes.

use std::time::Duration;

use crate::WorkerError;
use crate::job::{JobId, JobStage, JobState};

/// A job that did not reach [`JobState::Committed`] in a cycle.
#[derive(Debug)]
pub struct JobFailure {
    pub job_id: JobId,
    /// Stage that failed.
    pub stage: JobStage,
    /// Last state the job reached before failing.
    pub reached: JobState,
    pub error: WorkerError,
}

/// What happened during one poll cycle.
#[derive(Debug, Default)]
pub struct CycleReport {
    /// Candidates yielded by discovery.
    pub discovered: usize,
    /// Jobs committed in this cycle, in processing order.
    pub committed: Vec<JobId>,
    /// Jobs that failed and will be retried next cycle.
    pub failed: Vec<JobFailure>,
    /// Set when listing or marker lookup aborted the cycle.
    pub discovery_error: Option<WorkerError>,
    pub elapsed: Duration,
}

impl CycleReport {
    /// Returns true when nothing was discovered and nothing went wrong.
    pub fn is_idle(&self) -> bool {
        self.discovered == 0 && self.discovery_error.is_none()
    }

    /// Returns true when every discovered job was committed.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.discovery_error.is_none()
    }

    /// Returns the failure recorded for a job, if any.
    pub fn failure(&self, job_id: &str) -> Option<&JobFailure> {
        self.failed.iter().find(|f| f.job_id.as_str() == job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_flags() {
        let mut report = CycleReport::default();
        assert!(report.is_idle());
        assert!(report.is_clean());

        report.discovered = 1;
        report.failed.push(JobFailure {
            job_id: JobId::from_key("doc1").unwrap(),
            stage: JobStage::Notify,
            reached: JobState::Published,
            error: WorkerError::Notification(docflow_webhook::Error::timeout()),
        });
        assert!(!report.is_idle());
        assert!(!report.is_clean());
        assert_eq!(report.failure("doc1").unwrap().stage, JobStage::Notify);
        assert!(report.failure("doc2").is_none());
    }
}
