//! Upload discovery.

use std::collections::HashSet;
use std::sync::Arc;

use async_stream::try_stream;
use docflow_opendal::StorageBackend;
use futures::{Stream, TryStreamExt};
use strum::{Display, IntoStaticStr};

use super::CompletionStore;
use crate::job::{Candidate, JobId, UploadObject};
use crate::{Result, TRACING_TARGET, WorkerError};

/// Why an upload was not turned into a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum SkipReason {
    /// Smaller than the minimum size, most likely a truncated upload.
    TooSmall,
    /// Does not carry the document extension.
    WrongExtension,
    /// The key has no usable file stem.
    NoIdentifier,
}

/// Eligibility rules applied to every listed upload.
#[derive(Debug, Clone)]
pub struct DiscoveryFilter {
    min_size: u64,
    extension: String,
}

impl DiscoveryFilter {
    /// Creates a filter for `extension` uploads of at least `min_size` bytes.
    pub fn new(min_size: u64, extension: impl Into<String>) -> Self {
        let extension: String = extension.into();
        Self {
            min_size,
            extension: extension.trim_start_matches('.').to_owned(),
        }
    }

    /// Returns the job identifier for an eligible upload.
    ///
    /// The size check runs first so a truncated upload is reported as such
    /// even when it also has the wrong extension.
    pub fn check(&self, object: &UploadObject) -> Result<JobId, SkipReason> {
        if object.size_bytes < self.min_size {
            return Err(SkipReason::TooSmall);
        }

        let matches = object
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.extension));
        if !matches {
            return Err(SkipReason::WrongExtension);
        }

        object.job_id().ok_or(SkipReason::NoIdentifier)
    }
}

/// Finds uploads that still need processing.
#[derive(Clone)]
pub struct Discovery {
    storage: StorageBackend,
    tracker: Arc<dyn CompletionStore>,
    filter: DiscoveryFilter,
    prefix: String,
}

impl Discovery {
    /// Creates a discovery over `prefix`.
    pub fn new(
        storage: StorageBackend,
        tracker: Arc<dyn CompletionStore>,
        filter: DiscoveryFilter,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            tracker,
            filter,
            prefix: prefix.into(),
        }
    }

    /// Streams every eligible, not yet completed upload below the prefix.
    ///
    /// The listing follows continuation pages to the end. When two uploads
    /// map to the same identifier only the first one listed is yielded. A
    /// listing or marker lookup failure ends the stream with a
    /// [`WorkerError::Discovery`].
    pub fn discover(&self) -> impl Stream<Item = Result<Candidate>> + Send + 'static {
        let listing = self.storage.list(&self.prefix);
        let tracker = self.tracker.clone();
        let filter = self.filter.clone();
        let prefix = self.prefix.clone();

        try_stream! {
            let mut listing = std::pin::pin!(listing);
            let mut seen = HashSet::new();

            while let Some(entry) = listing.try_next().await.map_err(|err| {
                WorkerError::discovery_with_source(format!("cannot list '{prefix}'"), err)
            })? {
                let object = UploadObject::from(entry);

                let job_id = match filter.check(&object) {
                    Ok(job_id) => job_id,
                    Err(SkipReason::TooSmall) => {
                        tracing::warn!(
                            target: TRACING_TARGET,
                            key = %object.key,
                            size = object.size_bytes,
                            "Upload too small, skipping"
                        );
                        continue;
                    }
                    Err(reason) => {
                        tracing::trace!(
                            target: TRACING_TARGET,
                            key = %object.key,
                            reason = %reason,
                            "Upload skipped"
                        );
                        continue;
                    }
                };

                if !seen.insert(job_id.clone()) {
                    tracing::warn!(
                        target: TRACING_TARGET,
                        key = %object.key,
                        doc_id = %job_id,
                        "Duplicate document id in listing, skipping"
                    );
                    continue;
                }

                let complete = tracker.is_complete(&job_id).await.map_err(|err| {
                    WorkerError::discovery_with_source(
                        format!("cannot read completion marker for '{job_id}'"),
                        err,
                    )
                })?;
                if complete {
                    continue;
                }

                yield Candidate {
                    job_id,
                    key: object.key,
                    size_bytes: object.size_bytes,
                };
            }
        }
    }
}

impl std::fmt::Debug for Discovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Discovery")
            .field("prefix", &self.prefix)
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use docflow_opendal::StorageConfig;

    use super::*;
    use crate::service::ObjectCompletionStore;

    fn pdf(len: usize) -> Vec<u8> {
        vec![b'%'; len]
    }

    async fn setup() -> (StorageBackend, Arc<ObjectCompletionStore>, Discovery) {
        let storage = StorageBackend::new(StorageConfig::memory()).unwrap();
        let tracker = Arc::new(ObjectCompletionStore::new(storage.clone(), "markers/"));
        let discovery = Discovery::new(
            storage.clone(),
            tracker.clone(),
            DiscoveryFilter::new(1024, "pdf"),
            "uploads/",
        );
        (storage, tracker, discovery)
    }

    async fn collect(discovery: &Discovery) -> Vec<Candidate> {
        discovery.discover().try_collect().await.unwrap()
    }

    #[test]
    fn test_filter_rules() {
        let filter = DiscoveryFilter::new(1024, ".pdf");

        assert_eq!(
            filter.check(&UploadObject::new("uploads/doc1.pdf", 2048)),
            Ok(JobId::from_key("doc1").unwrap())
        );
        assert!(filter.check(&UploadObject::new("uploads/Scan.PDF", 1024)).is_ok());
        assert_eq!(
            filter.check(&UploadObject::new("uploads/notes.txt", 4096)),
            Err(SkipReason::WrongExtension)
        );
        assert_eq!(
            filter.check(&UploadObject::new("uploads/doc1.pdf", 500)),
            Err(SkipReason::TooSmall)
        );
        // Size is checked before the extension.
        assert_eq!(
            filter.check(&UploadObject::new("uploads/notes.txt", 10)),
            Err(SkipReason::TooSmall)
        );
        assert_eq!(
            filter.check(&UploadObject::new("uploads/.pdf", 4096)),
            Err(SkipReason::WrongExtension)
        );
    }

    #[tokio::test]
    async fn test_discovers_eligible_uploads() {
        let (storage, _, discovery) = setup().await;
        storage.write("uploads/doc1.pdf", pdf(2048)).await.unwrap();
        storage.write("uploads/small.pdf", pdf(500)).await.unwrap();
        storage.write("uploads/notes.txt", pdf(4096)).await.unwrap();
        storage.write("results/doc1/report.pdf", pdf(4096)).await.unwrap();

        let found = collect(&discovery).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].job_id.as_str(), "doc1");
        assert_eq!(found[0].key, "uploads/doc1.pdf");
        assert_eq!(found[0].size_bytes, 2048);
    }

    #[tokio::test]
    async fn test_completed_jobs_are_not_rediscovered() {
        let (storage, tracker, discovery) = setup().await;
        storage.write("uploads/doc1.pdf", pdf(2048)).await.unwrap();
        storage.write("uploads/doc2.pdf", pdf(2048)).await.unwrap();

        tracker
            .mark_complete(&JobId::from_key("doc1").unwrap())
            .await
            .unwrap();

        let found = collect(&discovery).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].job_id.as_str(), "doc2");
    }

    #[tokio::test]
    async fn test_duplicate_ids_yield_once() {
        let (storage, _, discovery) = setup().await;
        storage.write("uploads/a/doc1.pdf", pdf(2048)).await.unwrap();
        storage.write("uploads/b/doc1.PDF", pdf(2048)).await.unwrap();

        let found = collect(&discovery).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].job_id.as_str(), "doc1");
    }

    #[tokio::test]
    async fn test_empty_prefix() {
        let (_, _, discovery) = setup().await;
        assert!(collect(&discovery).await.is_empty());
    }

    #[tokio::test]
    async fn test_marker_failure_is_a_discovery_error() {
        struct BrokenStore;

        #[async_trait::async_trait]
        impl CompletionStore for BrokenStore {
            async fn is_complete(&self, job_id: &JobId) -> Result<bool> {
                Err(WorkerError::marker(job_id.as_str(), "store offline"))
            }

            async fn mark_complete(&self, _job_id: &JobId) -> Result<()> {
                Ok(())
            }
        }

        let storage = StorageBackend::new(StorageConfig::memory()).unwrap();
        storage.write("uploads/doc1.pdf", pdf(2048)).await.unwrap();
        let discovery = Discovery::new(
            storage,
            Arc::new(BrokenStore),
            DiscoveryFilter::new(1024, "pdf"),
            "uploads/",
        );

        let result: Result<Vec<_>> = discovery.discover().try_collect().await;
        assert!(matches!(result, Err(WorkerError::Discovery { .. })));
    }
}
