//! Result publishing.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use docflow_opendal::{StorageBackend, StorageError};

use super::OutputLayout;
use crate::job::JobId;
use crate::{Result, TRACING_TARGET, WorkerError};

/// Counts of artifacts uploaded for one job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishSummary {
    pub images: usize,
    pub tables: usize,
}

/// Uploads a job's pipeline output under `{results_prefix}{job_id}/`.
///
/// Images go to `images/`, tables to `tables/` (both keeping their relative
/// paths) and the report to `report.pdf`. Uploads overwrite, so a retried
/// job replaces what an earlier attempt left behind.
#[derive(Debug, Clone)]
pub struct Publisher {
    storage: StorageBackend,
    layout: OutputLayout,
    results_prefix: String,
}

impl Publisher {
    /// Creates a publisher.
    pub fn new(
        storage: StorageBackend,
        layout: OutputLayout,
        results_prefix: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            layout,
            results_prefix: results_prefix.into(),
        }
    }

    /// Returns `{results_prefix}{job_id}/`.
    pub fn job_prefix(&self, job_id: &JobId) -> String {
        format!("{}{job_id}/", self.results_prefix)
    }

    /// Publishes every artifact of a job.
    ///
    /// A missing images or tables directory publishes nothing for that
    /// category. A missing report is an error.
    pub async fn publish(&self, job_id: &JobId) -> Result<PublishSummary> {
        let job_prefix = self.job_prefix(job_id);
        let report = self.layout.report_path(job_id);

        let images = self
            .publish_dir(
                job_id,
                &self.layout.images_dir(job_id),
                &format!("{job_prefix}images/"),
                Some(&report),
            )
            .await?;

        let tables = self
            .publish_dir(
                job_id,
                &self.layout.tables_dir(job_id),
                &format!("{job_prefix}tables/"),
                None,
            )
            .await?;

        let report_key = format!("{job_prefix}report.pdf");
        self.upload(&report, &report_key).await?;

        tracing::info!(
            target: TRACING_TARGET,
            doc_id = %job_id,
            images,
            tables,
            prefix = %job_prefix,
            "Results published"
        );

        Ok(PublishSummary { images, tables })
    }

    async fn publish_dir(
        &self,
        job_id: &JobId,
        dir: &Path,
        key_prefix: &str,
        exclude: Option<&Path>,
    ) -> Result<usize> {
        let files = match collect_files(dir).await {
            Ok(files) => files,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::warn!(
                    target: TRACING_TARGET,
                    doc_id = %job_id,
                    dir = %dir.display(),
                    "Output directory missing, nothing to publish"
                );
                return Ok(0);
            }
            Err(err) => {
                return Err(WorkerError::Publish {
                    key: key_prefix.to_owned(),
                    source: StorageError::io(dir.display().to_string(), err),
                });
            }
        };

        let mut published = 0;
        for path in files {
            if exclude.is_some_and(|excluded| excluded == path) {
                continue;
            }

            let Some(relative) = relative_key(dir, &path) else {
                continue;
            };
            self.upload(&path, &format!("{key_prefix}{relative}"))
                .await?;
            published += 1;
        }

        Ok(published)
    }

    async fn upload(&self, path: &Path, key: &str) -> Result<()> {
        self.storage
            .upload(path, key)
            .await
            .map(|_| ())
            .map_err(|source| WorkerError::Publish {
                key: key.to_owned(),
                source,
            })
    }
}

/// Lists every regular file below `dir`, sorted by path.
async fn collect_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&current).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                files.push(entry.path());
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Builds the `/`-separated key of `path` relative to `root`.
fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = relative
        .components()
        .map(|part| part.as_os_str().to_string_lossy())
        .collect();
    (!parts.is_empty()).then(|| parts.join("/"))
}
