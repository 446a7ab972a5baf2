//! Notifier service wrapper with observability.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::{Error, NotifyProvider, NotifyRequest, NotifyResponse, Result, TRACING_TARGET};

/// Cloneable handle around a [`NotifyProvider`].
///
/// Adds logging around every delivery and treats any non-2xx answer as an
/// [`ErrorKind::UnexpectedStatus`](crate::ErrorKind::UnexpectedStatus) error.
#[derive(Clone)]
pub struct NotifierService {
    inner: Arc<dyn NotifyProvider>,
}

impl fmt::Debug for NotifierService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifierService").finish_non_exhaustive()
    }
}

impl NotifierService {
    /// Create a new notifier service wrapper.
    pub fn new<P>(provider: P) -> Self
    where
        P: NotifyProvider + 'static,
    {
        Self {
            inner: Arc::new(provider),
        }
    }

    /// Tells the status API that `doc_id` is done.
    pub async fn mark_done(&self, doc_id: &str) -> Result<NotifyResponse> {
        self.deliver(&NotifyRequest::new(doc_id)).await
    }

    /// Delivers a prepared request.
    pub async fn deliver(&self, request: &NotifyRequest) -> Result<NotifyResponse> {
        let started_at = Instant::now();

        tracing::debug!(
            target: TRACING_TARGET,
            request_id = %request.request_id,
            doc_id = %request.doc_id,
            "Sending completion notification"
        );

        let result = self.inner.notify(request).await;
        let elapsed = started_at.elapsed();

        match result {
            Ok(response) if response.is_success() => {
                tracing::debug!(
                    target: TRACING_TARGET,
                    request_id = %request.request_id,
                    doc_id = %request.doc_id,
                    status_code = response.status_code,
                    elapsed_ms = elapsed.as_millis(),
                    "Completion notification acknowledged"
                );
                Ok(response)
            }
            Ok(response) => {
                tracing::warn!(
                    target: TRACING_TARGET,
                    request_id = %request.request_id,
                    doc_id = %request.doc_id,
                    status_code = response.status_code,
                    elapsed_ms = elapsed.as_millis(),
                    "Completion notification rejected"
                );
                Err(Error::unexpected_status(response.status_code))
            }
            Err(error) => {
                tracing::error!(
                    target: TRACING_TARGET,
                    request_id = %request.request_id,
                    doc_id = %request.doc_id,
                    error = %error,
                    elapsed_ms = elapsed.as_millis(),
                    "Completion notification error"
                );
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use jiff::Timestamp;

    use super::*;
    use crate::ErrorKind;

    struct FixedStatus {
        status: u16,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl NotifyProvider for FixedStatus {
        async fn notify(&self, request: &NotifyRequest) -> Result<NotifyResponse> {
            self.seen.lock().unwrap().push(request.doc_id.clone());
            Ok(NotifyResponse::new(
                request.request_id,
                self.status,
                Timestamp::now(),
            ))
        }
    }

    struct Unreachable;

    #[async_trait::async_trait]
    impl NotifyProvider for Unreachable {
        async fn notify(&self, _request: &NotifyRequest) -> Result<NotifyResponse> {
            Err(Error::network_error().with_message("connection refused"))
        }
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let service = NotifierService::new(FixedStatus {
            status: 200,
            seen: Mutex::default(),
        });

        let response = service.mark_done("doc1").await.unwrap();
        assert_eq!(response.status_code, 200);
    }

    #[tokio::test]
    async fn test_non_success_status_is_an_error() {
        let service = NotifierService::new(FixedStatus {
            status: 500,
            seen: Mutex::default(),
        });

        let error = service.mark_done("doc1").await.unwrap_err();
        assert_eq!(error.kind, ErrorKind::UnexpectedStatus);
        assert_eq!(error.status_code, Some(500));
    }

    #[tokio::test]
    async fn test_transport_error_is_returned() {
        let service = NotifierService::new(Unreachable);

        let error = service.mark_done("doc1").await.unwrap_err();
        assert_eq!(error.kind, ErrorKind::NetworkError);
    }
}
