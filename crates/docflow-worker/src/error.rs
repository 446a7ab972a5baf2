//! Worker error types.

use std::borrow::Cow;
use std::fmt;

use docflow_opendal::StorageError;

use crate::job::{JobStage, PipelineStage};

/// Result type alias for worker operations.
pub type Result<T, E = WorkerError> = std::result::Result<T, E>;

/// Type alias for boxed dynamic errors that can be sent across threads.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// Worker error type.
///
/// Every variant except [`Discovery`](Self::Discovery) and
/// [`Configuration`](Self::Configuration) belongs to a single job and maps to
/// the [`JobStage`] that produced it.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// Listing the uploads prefix or reading the completion store failed.
    #[error("discovery failed: {message}")]
    Discovery {
        message: Cow<'static, str>,
        #[source]
        source: Option<BoxedError>,
    },

    /// Fetching the source object into the staging area failed.
    #[error("download of '{key}' failed")]
    Download {
        key: String,
        #[source]
        source: StorageError,
    },

    /// An external tool could not be launched or exited unsuccessfully.
    #[error("{stage} stage failed")]
    PipelineExecution {
        stage: PipelineStage,
        #[source]
        failure: PipelineFailure,
    },

    /// Uploading one of the result artifacts failed.
    #[error("publish of '{key}' failed")]
    Publish {
        key: String,
        #[source]
        source: StorageError,
    },

    /// The status API did not acknowledge the completion.
    #[error("completion notification failed")]
    Notification(#[source] docflow_webhook::Error),

    /// The completion store could not be read or written for a job.
    #[error("completion marker for '{job_id}' failed")]
    Marker {
        job_id: String,
        #[source]
        source: BoxedError,
    },

    /// Required settings are missing or invalid.
    #[error("invalid configuration: {0}")]
    Configuration(Cow<'static, str>),
}

impl WorkerError {
    /// Creates a discovery error with a message.
    pub fn discovery(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Discovery {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a discovery error with a message and source.
    pub fn discovery_with_source(
        message: impl Into<Cow<'static, str>>,
        source: impl Into<BoxedError>,
    ) -> Self {
        Self::Discovery {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Creates a pipeline error for the given stage.
    pub fn pipeline(stage: PipelineStage, failure: PipelineFailure) -> Self {
        Self::PipelineExecution { stage, failure }
    }

    /// Creates a completion marker error.
    pub fn marker(job_id: impl Into<String>, source: impl Into<BoxedError>) -> Self {
        Self::Marker {
            job_id: job_id.into(),
            source: source.into(),
        }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Configuration(message.into())
    }

    /// Returns the job stage this error belongs to, if any.
    pub fn stage(&self) -> Option<JobStage> {
        match self {
            Self::Discovery { .. } | Self::Configuration(_) => None,
            Self::Download { .. } => Some(JobStage::Download),
            Self::PipelineExecution { stage, .. } => Some((*stage).into()),
            Self::Publish { .. } => Some(JobStage::Publish),
            Self::Notification(_) => Some(JobStage::Notify),
            Self::Marker { .. } => Some(JobStage::Commit),
        }
    }

    /// Renders the error followed by each of its sources, `: `-separated.
    pub fn chain(&self) -> ErrorChain<'_> {
        ErrorChain(self)
    }
}

/// Why an external pipeline tool failed.
#[derive(Debug, thiserror::Error)]
pub enum PipelineFailure {
    /// The process could not be started.
    #[error("could not launch '{program}'")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The process ran and reported failure.
    #[error("'{program}' {}{}", describe_exit(.code), describe_stderr(.stderr))]
    ExitStatus {
        program: String,
        code: Option<i32>,
        stderr: String,
    },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exited with status {code}"),
        None => "was terminated by a signal".to_owned(),
    }
}

fn describe_stderr(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}

/// Display adapter returned by [`WorkerError::chain`].
pub struct ErrorChain<'a>(&'a (dyn std::error::Error + 'static));

impl fmt::Display for ErrorChain<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)?;
        let mut source = self.0.source();
        while let Some(err) = source {
            write!(f, ": {err}")?;
            source = err.source();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_mapping() {
        let extract = WorkerError::pipeline(
            PipelineStage::Extract,
            PipelineFailure::ExitStatus {
                program: "python".into(),
                code: Some(1),
                stderr: String::new(),
            },
        );
        assert_eq!(extract.stage(), Some(JobStage::Extract));

        let notify = WorkerError::Notification(docflow_webhook::Error::timeout());
        assert_eq!(notify.stage(), Some(JobStage::Notify));

        assert_eq!(WorkerError::discovery("listing failed").stage(), None);
        assert_eq!(WorkerError::configuration("missing bucket").stage(), None);
    }

    #[test]
    fn test_exit_status_display() {
        let failure = PipelineFailure::ExitStatus {
            program: "render".into(),
            code: Some(2),
            stderr: "no such document".into(),
        };
        assert_eq!(
            failure.to_string(),
            "'render' exited with status 2: no such document"
        );

        let killed = PipelineFailure::ExitStatus {
            program: "render".into(),
            code: None,
            stderr: String::new(),
        };
        assert_eq!(killed.to_string(), "'render' was terminated by a signal");
    }

    #[test]
    fn test_chain_includes_sources() {
        let error = WorkerError::Download {
            key: "uploads/doc1.pdf".into(),
            source: StorageError::NotFound("uploads/doc1.pdf".into()),
        };

        let rendered = error.chain().to_string();
        assert!(rendered.starts_with("download of 'uploads/doc1.pdf' failed: "));
        assert!(rendered.contains("not found"));
    }
}
