//! Job model: identifiers, upload objects and the per-job state machine.

use derive_more::{AsRef, Display};
use docflow_opendal::ObjectEntry;
use serde::{Deserialize, Serialize};
use strum::{Display as StrumDisplay, IntoStaticStr};

/// Identifier of a document job, derived from the upload's file stem.
///
/// `uploads/report-2024.pdf` becomes `report-2024`. The derivation is a pure
/// function of the key, so the same upload always maps to the same job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(Display, AsRef, Serialize, Deserialize)]
#[as_ref(str)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Derives the identifier from an object key.
    ///
    /// Returns `None` when the key has no usable file stem, e.g. it ends in
    /// `/`, or the stem would be `.` or `..`.
    pub fn from_key(key: &str) -> Option<Self> {
        let file_name = file_name(key)?;
        let stem = match file_name.rfind('.') {
            Some(idx) if idx > 0 => &file_name[..idx],
            _ => file_name,
        };

        if stem.is_empty() || stem == "." || stem == ".." {
            return None;
        }

        Some(Self(stem.to_owned()))
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Returns the last `/`-separated segment of a key, if non-empty.
fn file_name(key: &str) -> Option<&str> {
    key.rsplit('/').next().filter(|name| !name.is_empty())
}

/// A candidate source file in the uploads prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadObject {
    /// Full object key.
    pub key: String,
    /// Object size in bytes.
    pub size_bytes: u64,
}

impl UploadObject {
    /// Creates a new upload object.
    pub fn new(key: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            key: key.into(),
            size_bytes,
        }
    }

    /// Returns the file extension of the key, without the dot.
    ///
    /// Leading dots do not start an extension, so `.pdf` has none.
    pub fn extension(&self) -> Option<&str> {
        let file_name = file_name(&self.key)?;
        match file_name.rfind('.') {
            Some(idx) if idx > 0 => Some(&file_name[idx + 1..]),
            _ => None,
        }
    }

    /// Derives the job identifier for this upload.
    pub fn job_id(&self) -> Option<JobId> {
        JobId::from_key(&self.key)
    }
}

impl From<ObjectEntry> for UploadObject {
    fn from(entry: ObjectEntry) -> Self {
        Self::new(entry.key, entry.size)
    }
}

/// A discovered job: an eligible upload with no completion marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Derived job identifier.
    pub job_id: JobId,
    /// Key of the source object.
    pub key: String,
    /// Size of the source object in bytes.
    pub size_bytes: u64,
}

/// Progress of one job within one poll cycle.
///
/// Never persisted: after a restart only the completion marker survives, so
/// anything short of [`Committed`](Self::Committed) starts over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(StrumDisplay, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum JobState {
    Discovered,
    Downloaded,
    Extracted,
    Published,
    Notified,
    Committed,
}

impl JobState {
    /// Returns the stage that moves a job out of this state.
    pub fn pending_stage(self) -> Option<JobStage> {
        match self {
            Self::Discovered => Some(JobStage::Download),
            Self::Downloaded => Some(JobStage::Extract),
            Self::Extracted => Some(JobStage::Publish),
            Self::Published => Some(JobStage::Notify),
            Self::Notified => Some(JobStage::Commit),
            Self::Committed => None,
        }
    }
}

/// A step of job processing; names where a job failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(StrumDisplay, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum JobStage {
    Download,
    Extract,
    Render,
    Publish,
    Notify,
    Commit,
}

/// The two external pipeline tools, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(StrumDisplay, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum PipelineStage {
    Extract,
    Render,
}

impl From<PipelineStage> for JobStage {
    fn from(stage: PipelineStage) -> Self {
        match stage {
            PipelineStage::Extract => Self::Extract,
            PipelineStage::Render => Self::Render,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(key: &str) -> Option<String> {
        JobId::from_key(key).map(|id| id.as_str().to_owned())
    }

    #[test]
    fn test_job_id_is_file_stem() {
        assert_eq!(id("uploads/doc1.pdf").as_deref(), Some("doc1"));
        assert_eq!(id("uploads/nested/dir/doc2.PDF").as_deref(), Some("doc2"));
        assert_eq!(id("uploads/archive.v2.pdf").as_deref(), Some("archive.v2"));
        assert_eq!(id("uploads/no-extension").as_deref(), Some("no-extension"));
    }

    #[test]
    fn test_job_id_is_deterministic() {
        let key = "uploads/8c2e1f4a-0c55-4a4e-9d0e-2a1c6b1f3e77.pdf";
        assert_eq!(JobId::from_key(key), JobId::from_key(key));
    }

    #[test]
    fn test_job_id_rejects_unusable_stems() {
        assert_eq!(id("uploads/"), None);
        assert_eq!(id(""), None);
        assert_eq!(id("uploads/..pdf"), None);
        assert_eq!(id("uploads/...pdf"), None);
    }

    #[test]
    fn test_extension() {
        assert_eq!(UploadObject::new("uploads/a.pdf", 1).extension(), Some("pdf"));
        assert_eq!(UploadObject::new("uploads/a.PDF", 1).extension(), Some("PDF"));
        assert_eq!(UploadObject::new("uploads/.pdf", 1).extension(), None);
        assert_eq!(UploadObject::new("uploads/a", 1).extension(), None);
    }

    #[test]
    fn test_state_progression() {
        assert_eq!(
            JobState::Discovered.pending_stage(),
            Some(JobStage::Download)
        );
        assert_eq!(JobState::Notified.pending_stage(), Some(JobStage::Commit));
        assert_eq!(JobState::Committed.pending_stage(), None);
        assert!(JobState::Discovered < JobState::Committed);
    }

    #[test]
    fn test_display_names() {
        assert_eq!(JobStage::Notify.to_string(), "notify");
        assert_eq!(JobState::Published.to_string(), "published");
        assert_eq!(JobId::from_key("uploads/doc1.pdf").unwrap().to_string(), "doc1");
    }
}
