//! Durable completion markers.
//!
//! A job counts as done exactly when its marker exists. Markers are written
//! last, after results are published and the status API has acknowledged the
//! job, so a crash anywhere before that point leads to a full retry.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use docflow_opendal::StorageBackend;
use jiff::Timestamp;

use crate::job::JobId;
use crate::{Result, TRACING_TARGET, WorkerError};

/// Persistent record of which jobs have been committed.
#[async_trait::async_trait]
pub trait CompletionStore: Send + Sync {
    /// Returns whether a marker exists for the job.
    async fn is_complete(&self, job_id: &JobId) -> Result<bool>;

    /// Records the job as complete. Marking an already complete job is a no-op.
    async fn mark_complete(&self, job_id: &JobId) -> Result<()>;
}

/// Markers stored as `.done_{job_id}` files in a local directory.
#[derive(Debug, Clone)]
pub struct FsCompletionStore {
    dir: PathBuf,
}

impl FsCompletionStore {
    /// Creates a store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the directory markers are written to.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the marker path for a job.
    pub fn marker_path(&self, job_id: &JobId) -> PathBuf {
        self.dir.join(format!(".done_{job_id}"))
    }
}

#[async_trait::async_trait]
impl CompletionStore for FsCompletionStore {
    async fn is_complete(&self, job_id: &JobId) -> Result<bool> {
        tokio::fs::try_exists(self.marker_path(job_id))
            .await
            .map_err(|err| WorkerError::marker(job_id.as_str(), err))
    }

    async fn mark_complete(&self, job_id: &JobId) -> Result<()> {
        let path = self.marker_path(job_id);
        let temp = self.dir.join(format!(".done_{job_id}.{}.tmp", uuid::Uuid::new_v4()));

        let write = async {
            tokio::fs::create_dir_all(&self.dir).await?;
            tokio::fs::write(&temp, Timestamp::now().to_string()).await?;
            tokio::fs::rename(&temp, &path).await
        };

        if let Err(err) = write.await {
            if let Err(cleanup) = tokio::fs::remove_file(&temp).await
                && cleanup.kind() != ErrorKind::NotFound
            {
                tracing::warn!(
                    target: TRACING_TARGET,
                    path = %temp.display(),
                    error = %cleanup,
                    "Failed to remove partial marker"
                );
            }
            return Err(WorkerError::marker(job_id.as_str(), err));
        }

        tracing::debug!(
            target: TRACING_TARGET,
            doc_id = %job_id,
            path = %path.display(),
            "Completion marker written"
        );

        Ok(())
    }
}

/// Markers stored as objects under a prefix of the bucket.
///
/// Survives loss of the worker's local disk, unlike [`FsCompletionStore`].
#[derive(Debug, Clone)]
pub struct ObjectCompletionStore {
    storage: StorageBackend,
    prefix: String,
}

impl ObjectCompletionStore {
    /// Creates a store writing markers under `prefix`.
    pub fn new(storage: StorageBackend, prefix: impl Into<String>) -> Self {
        Self {
            storage,
            prefix: prefix.into(),
        }
    }

    /// Returns the marker key for a job.
    pub fn marker_key(&self, job_id: &JobId) -> String {
        format!("{}{job_id}", self.prefix)
    }
}

#[async_trait::async_trait]
impl CompletionStore for ObjectCompletionStore {
    async fn is_complete(&self, job_id: &JobId) -> Result<bool> {
        self.storage
            .exists(&self.marker_key(job_id))
            .await
            .map_err(|err| WorkerError::marker(job_id.as_str(), err))
    }

    async fn mark_complete(&self, job_id: &JobId) -> Result<()> {
        let key = self.marker_key(job_id);
        self.storage
            .write(&key, Timestamp::now().to_string().into_bytes())
            .await
            .map_err(|err| WorkerError::marker(job_id.as_str(), err))?;

        tracing::debug!(
            target: TRACING_TARGET,
            doc_id = %job_id,
            key = %key,
            "Completion marker written"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use docflow_opendal::StorageConfig;

    use super::*;

    fn job(id: &str) -> JobId {
        JobId::from_key(&format!("uploads/{id}.pdf")).unwrap()
    }

    #[tokio::test]
    async fn test_fs_store_marks_and_checks() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsCompletionStore::new(dir.path().join("markers"));
        let doc = job("doc1");

        assert!(!store.is_complete(&doc).await.unwrap());
        store.mark_complete(&doc).await.unwrap();
        assert!(store.is_complete(&doc).await.unwrap());
        assert!(dir.path().join("markers/.done_doc1").exists());

        // Idempotent.
        store.mark_complete(&doc).await.unwrap();
        assert!(store.is_complete(&doc).await.unwrap());
        assert!(!store.is_complete(&job("doc2")).await.unwrap());
    }

    #[tokio::test]
    async fn test_fs_store_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsCompletionStore::new(dir.path());
        store.mark_complete(&job("doc1")).await.unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec![".done_doc1".to_owned()]);
    }

    #[tokio::test]
    async fn test_fs_store_write_failure() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocked");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let store = FsCompletionStore::new(&blocker);
        let err = store.mark_complete(&job("doc1")).await.unwrap_err();
        assert!(matches!(err, WorkerError::Marker { .. }));
    }

    #[tokio::test]
    async fn test_object_store_marks_and_checks() {
        let storage = StorageBackend::new(StorageConfig::memory()).unwrap();
        let store = ObjectCompletionStore::new(storage.clone(), "markers/");
        let doc = job("doc1");

        assert!(!store.is_complete(&doc).await.unwrap());
        store.mark_complete(&doc).await.unwrap();
        assert!(store.is_complete(&doc).await.unwrap());
        assert!(storage.exists("markers/doc1").await.unwrap());
    }
}
