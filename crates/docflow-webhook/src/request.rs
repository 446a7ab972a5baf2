//! Notification request and payload types.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single completion notification to deliver.
#[derive(Debug, Clone)]
pub struct NotifyRequest {
    /// Unique identifier for this delivery attempt.
    pub request_id: Uuid,
    /// Identifier of the document whose processing completed.
    pub doc_id: String,
    /// Optional request timeout (uses client default if not set).
    pub timeout: Option<Duration>,
}

impl NotifyRequest {
    /// Creates a new notification request for a document.
    pub fn new(doc_id: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::now_v7(),
            doc_id: doc_id.into(),
            timeout: None,
        }
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns the JSON body sent to the status API.
    pub fn to_payload(&self) -> NotifyPayload {
        NotifyPayload {
            doc_id: self.doc_id.clone(),
        }
    }
}

/// Wire body of the `mark_done` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyPayload {
    /// Identifier of the completed document.
    pub doc_id: String,
}
