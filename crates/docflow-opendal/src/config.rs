//! Storage configuration types.

#[cfg(feature = "config")]
use clap::Args;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::error::{StorageError, StorageResult};

/// Which OpenDAL service backs the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[derive(Serialize, Deserialize, Display, EnumString, IntoStaticStr)]
#[cfg_attr(feature = "config", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BackendKind {
    /// Amazon S3 compatible storage.
    #[default]
    S3,
    /// A local directory acting as the bucket.
    Fs,
    /// Process-local memory; contents vanish with the process.
    Memory,
}

/// Object store configuration.
///
/// For [`BackendKind::S3`] the `bucket` is the bucket name; for
/// [`BackendKind::Fs`] it is the root directory of the tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct StorageConfig {
    /// Storage backend to use.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "storage-backend",
            env = "STORAGE_BACKEND",
            value_enum,
            default_value_t = BackendKind::S3
        )
    )]
    #[serde(default)]
    pub backend: BackendKind,

    /// Bucket name (or root directory for the fs backend).
    #[cfg_attr(feature = "config", arg(long = "bucket", env = "BUCKET"))]
    pub bucket: String,

    /// Region of the bucket.
    #[cfg_attr(feature = "config", arg(long = "region", env = "AWS_REGION"))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Custom endpoint URL (for S3-compatible storage like MinIO, R2).
    #[cfg_attr(feature = "config", arg(long = "s3-endpoint", env = "S3_ENDPOINT"))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Access key ID; the ambient credential chain is used when unset.
    #[cfg_attr(
        feature = "config",
        arg(long = "access-key-id", env = "AWS_ACCESS_KEY_ID", hide_env_values = true)
    )]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key_id: Option<String>,

    /// Secret access key.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "secret-access-key",
            env = "AWS_SECRET_ACCESS_KEY",
            hide_env_values = true
        )
    )]
    #[serde(default, skip_serializing)]
    pub secret_access_key: Option<String>,
}

impl StorageConfig {
    /// Creates a new S3 configuration.
    pub fn s3(bucket: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            backend: BackendKind::S3,
            bucket: bucket.into(),
            region: Some(region.into()),
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
        }
    }

    /// Creates a configuration rooted at a local directory.
    pub fn fs(root: impl Into<String>) -> Self {
        Self {
            backend: BackendKind::Fs,
            bucket: root.into(),
            region: None,
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
        }
    }

    /// Creates an in-memory configuration.
    pub fn memory() -> Self {
        Self {
            backend: BackendKind::Memory,
            bucket: "memory".to_owned(),
            region: None,
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
        }
    }

    /// Sets the access credentials.
    pub fn with_credentials(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        self.access_key_id = Some(access_key_id.into());
        self.secret_access_key = Some(secret_access_key.into());
        self
    }

    /// Checks that the settings required by the selected backend are present.
    pub fn validate(&self) -> StorageResult<()> {
        if self.bucket.trim().is_empty() {
            return Err(StorageError::init("bucket must not be empty"));
        }

        if self.backend == BackendKind::S3
            && self.region.as_deref().is_none_or(|r| r.trim().is_empty())
        {
            return Err(StorageError::init("region is required for the s3 backend"));
        }

        if self.access_key_id.is_some() != self.secret_access_key.is_some() {
            return Err(StorageError::init(
                "access key id and secret access key must be set together",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_s3_requires_region() {
        let mut config = StorageConfig::s3("docs", "us-east-1");
        assert!(config.validate().is_ok());

        config.region = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_bucket_is_rejected() {
        assert!(StorageConfig::fs("  ").validate().is_err());
    }

    #[test]
    fn test_partial_credentials_are_rejected() {
        let mut config = StorageConfig::s3("docs", "us-east-1").with_credentials("id", "secret");
        assert!(config.validate().is_ok());

        config.secret_access_key = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backend_kind_names() {
        assert_eq!(BackendKind::S3.to_string(), "s3");
        assert_eq!("memory".parse::<BackendKind>().unwrap(), BackendKind::Memory);
    }
}
