//! Storage backend implementation.

use std::path::Path;

use async_stream::try_stream;
use futures::{Stream, TryStreamExt};
use opendal::{Operator, services};

use crate::TRACING_TARGET;
use crate::config::{BackendKind, StorageConfig};
use crate::error::{StorageError, StorageResult};

/// Unified storage backend that wraps an OpenDAL operator.
#[derive(Clone)]
pub struct StorageBackend {
    operator: Operator,
    config: StorageConfig,
}

impl StorageBackend {
    /// Creates a new storage backend from configuration.
    pub fn new(config: StorageConfig) -> StorageResult<Self> {
        config.validate()?;
        let operator = Self::create_operator(&config)?;

        tracing::info!(
            target: TRACING_TARGET,
            backend = %config.backend,
            bucket = %config.bucket,
            region = ?config.region,
            "Storage backend initialized"
        );

        Ok(Self { operator, config })
    }

    /// Returns the configuration for this backend.
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Lists every object below `prefix`.
    ///
    /// The listing is lazy and recursive, and keeps following continuation
    /// pages until the store reports the end of the prefix. Directory
    /// entries are skipped.
    pub fn list(
        &self,
        prefix: &str,
    ) -> impl Stream<Item = StorageResult<ObjectEntry>> + Send + 'static {
        let operator = self.operator.clone();
        let prefix = prefix.to_owned();

        try_stream! {
            tracing::debug!(target: TRACING_TARGET, prefix = %prefix, "Listing objects");

            let lister = operator
                .lister_with(&prefix)
                .recursive(true)
                .await
                .map_err(StorageError::from)?;
            let mut lister = std::pin::pin!(lister);
            let mut listed = 0usize;

            while let Some(entry) = lister.try_next().await.map_err(StorageError::from)? {
                let path = entry.path();
                if path.ends_with('/') || entry.metadata().mode().is_dir() {
                    continue;
                }

                // Some services omit the size from listings.
                let size = match entry.metadata().content_length() {
                    0 => operator
                        .stat(path)
                        .await
                        .map_err(StorageError::from)?
                        .content_length(),
                    size => size,
                };

                listed += 1;
                yield ObjectEntry {
                    key: path.to_owned(),
                    size,
                };
            }

            tracing::debug!(
                target: TRACING_TARGET,
                prefix = %prefix,
                listed,
                "Listing complete"
            );
        }
    }

    /// Reads an object from storage.
    pub async fn read(&self, key: &str) -> StorageResult<Vec<u8>> {
        tracing::debug!(target: TRACING_TARGET, key = %key, "Reading object");

        let data = self.operator.read(key).await?.to_vec();

        tracing::debug!(
            target: TRACING_TARGET,
            key = %key,
            size = data.len(),
            "Object read complete"
        );

        Ok(data)
    }

    /// Writes an object, replacing any existing object under the same key.
    pub async fn write(&self, key: &str, data: Vec<u8>) -> StorageResult<()> {
        let size = data.len();
        tracing::debug!(target: TRACING_TARGET, key = %key, size, "Writing object");

        self.operator.write(key, data).await?;

        tracing::debug!(target: TRACING_TARGET, key = %key, "Object write complete");

        Ok(())
    }

    /// Deletes an object.
    pub async fn delete(&self, key: &str) -> StorageResult<()> {
        tracing::debug!(target: TRACING_TARGET, key = %key, "Deleting object");

        self.operator.delete(key).await?;

        Ok(())
    }

    /// Checks if an object exists.
    pub async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.operator.exists(key).await?)
    }

    /// Gets metadata for an object.
    pub async fn stat(&self, key: &str) -> StorageResult<FileMetadata> {
        let meta = self.operator.stat(key).await?;

        Ok(FileMetadata {
            size: meta.content_length(),
            content_type: meta.content_type().map(|s| s.to_string()),
        })
    }

    /// Downloads an object into a local file.
    ///
    /// The bytes land in a temporary sibling first and are renamed into
    /// place, so `local_path` either holds the complete object or is left
    /// untouched. Returns the number of bytes written.
    pub async fn download(&self, key: &str, local_path: &Path) -> StorageResult<u64> {
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(parent.display().to_string(), e))?;
        }

        let data = self.operator.read(key).await?.to_bytes();
        let size = data.len() as u64;

        let file_name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let partial =
            local_path.with_file_name(format!(".{file_name}.{}.part", uuid::Uuid::new_v4()));

        if let Err(err) = tokio::fs::write(&partial, &data).await {
            remove_partial(&partial).await;
            return Err(StorageError::io(partial.display().to_string(), err));
        }

        if let Err(err) = tokio::fs::rename(&partial, local_path).await {
            remove_partial(&partial).await;
            return Err(StorageError::io(local_path.display().to_string(), err));
        }

        tracing::debug!(
            target: TRACING_TARGET,
            key = %key,
            path = %local_path.display(),
            size,
            "Object downloaded"
        );

        Ok(size)
    }

    /// Uploads a local file under `key`, overwriting any existing object.
    /// Returns the number of bytes uploaded.
    pub async fn upload(&self, local_path: &Path, key: &str) -> StorageResult<u64> {
        let data = tokio::fs::read(local_path)
            .await
            .map_err(|e| StorageError::io(local_path.display().to_string(), e))?;
        let size = data.len() as u64;

        self.write(key, data).await?;

        tracing::debug!(
            target: TRACING_TARGET,
            key = %key,
            path = %local_path.display(),
            size,
            "File uploaded"
        );

        Ok(size)
    }

    /// Creates an OpenDAL operator based on configuration.
    #[allow(unreachable_patterns)]
    fn create_operator(config: &StorageConfig) -> StorageResult<Operator> {
        match config.backend {
            #[cfg(feature = "s3")]
            BackendKind::S3 => {
                let mut builder = services::S3::default().bucket(&config.bucket);

                if let Some(ref region) = config.region {
                    builder = builder.region(region);
                }

                if let Some(ref endpoint) = config.endpoint {
                    builder = builder.endpoint(endpoint);
                }

                if let Some(ref access_key_id) = config.access_key_id {
                    builder = builder.access_key_id(access_key_id);
                }

                if let Some(ref secret_access_key) = config.secret_access_key {
                    builder = builder.secret_access_key(secret_access_key);
                }

                Operator::new(builder)
                    .map(|op| op.finish())
                    .map_err(|e| StorageError::init(e.to_string()))
            }

            #[cfg(feature = "fs")]
            BackendKind::Fs => {
                let builder = services::Fs::default().root(&config.bucket);

                Operator::new(builder)
                    .map(|op| op.finish())
                    .map_err(|e| StorageError::init(e.to_string()))
            }

            #[cfg(any(feature = "memory", test))]
            BackendKind::Memory => {
                let builder = services::Memory::default();

                Operator::new(builder)
                    .map(|op| op.finish())
                    .map_err(|e| StorageError::init(e.to_string()))
            }

            // Reached when the backend's cargo feature is disabled.
            _ => Err(StorageError::init(format!(
                "backend '{}' is not supported with current features",
                config.backend
            ))),
        }
    }
}

/// Removes a leftover partial download. A missing file is not an error.
async fn remove_partial(path: &Path) {
    if let Err(err) = tokio::fs::remove_file(path).await
        && err.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!(
            target: TRACING_TARGET,
            path = %path.display(),
            error = %err,
            "Failed to remove partial download"
        );
    }
}

/// A single object returned by [`StorageBackend::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    /// Full object key, relative to the bucket root.
    pub key: String,
    /// Object size in bytes.
    pub size: u64,
}

/// Object metadata.
#[derive(Debug, Clone)]
pub struct FileMetadata {
    /// Object size in bytes.
    pub size: u64,
    /// Content type / MIME type.
    pub content_type: Option<String>,
}

impl std::fmt::Debug for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageBackend")
            .field("backend", &self.config.backend)
            .field("bucket", &self.config.bucket)
            .finish()
    }
}
