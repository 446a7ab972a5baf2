//! Local staging area for downloaded sources.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use docflow_opendal::StorageBackend;

use crate::job::{Candidate, JobId};
use crate::{Result, TRACING_TARGET, WorkerError};

/// Directory sources are downloaded into before extraction.
///
/// Each job's source lands at `{root}/{job_id}.{extension}`; a retried job
/// overwrites its previous download.
#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
    extension: String,
}

impl StagingArea {
    /// Creates a staging area rooted at `root`.
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        let extension: String = extension.into();
        Self {
            root: root.into(),
            extension: extension.trim_start_matches('.').to_ascii_lowercase(),
        }
    }

    /// Returns the staging directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns where a job's source is staged.
    pub fn source_path(&self, job_id: &JobId) -> PathBuf {
        self.root.join(format!("{job_id}.{}", self.extension))
    }

    /// Creates the staging directory if missing.
    pub async fn prepare(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await.map_err(|err| {
            WorkerError::configuration(format!(
                "cannot create staging directory '{}': {err}",
                self.root.display()
            ))
        })
    }

    /// Downloads a candidate's source object into the staging area.
    pub async fn download(
        &self,
        storage: &StorageBackend,
        candidate: &Candidate,
    ) -> Result<PathBuf> {
        let path = self.source_path(&candidate.job_id);

        let size = storage
            .download(&candidate.key, &path)
            .await
            .map_err(|source| WorkerError::Download {
                key: candidate.key.clone(),
                source,
            })?;

        tracing::debug!(
            target: TRACING_TARGET,
            doc_id = %candidate.job_id,
            path = %path.display(),
            size,
            "Source staged"
        );

        Ok(path)
    }

    /// Removes a job's staged source. A missing file is not an error.
    pub async fn clean(&self, job_id: &JobId) -> std::io::Result<()> {
        match tokio::fs::remove_file(self.source_path(job_id)).await {
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}
