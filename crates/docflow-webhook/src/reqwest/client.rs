//! Reqwest-based HTTP client for completion notifications.

use std::sync::Arc;

use jiff::Timestamp;
use reqwest::Client;
use url::Url;

use super::{Error, ReqwestConfig, TRACING_TARGET};
use crate::{NotifierService, NotifyProvider, NotifyRequest, NotifyResponse};

/// Inner client that holds the HTTP client and configuration.
struct ReqwestClientInner {
    http: Client,
    endpoint: Url,
    config: ReqwestConfig,
}

/// Reqwest-based HTTP client that posts completion notifications to the
/// status API's `mark_done` endpoint.
///
/// Every call is bounded by the configured timeout and is attempted exactly
/// once; retrying is the caller's business.
#[derive(Clone)]
pub struct ReqwestClient {
    inner: Arc<ReqwestClientInner>,
}

impl std::fmt::Debug for ReqwestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestClient")
            .field("endpoint", &self.inner.endpoint.as_str())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl ReqwestClient {
    /// Creates a new reqwest client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the endpoint URL cannot be derived
    /// from the API base or the HTTP client cannot be built.
    pub fn new(config: ReqwestConfig) -> crate::Result<Self> {
        let timeout = config.effective_timeout();
        let user_agent = config.effective_user_agent();

        let endpoint = config.mark_done_url().map_err(|e| {
            crate::Error::configuration()
                .with_message("invalid status API base URL")
                .with_source(e)
        })?;

        tracing::debug!(
            target: TRACING_TARGET,
            endpoint = %endpoint,
            timeout_ms = timeout.as_millis(),
            "Creating reqwest client"
        );

        let http = Client::builder()
            .timeout(timeout)
            .user_agent(&user_agent)
            .build()
            .map_err(|e| {
                crate::Error::configuration()
                    .with_message("failed to build HTTP client")
                    .with_source(e)
            })?;

        let inner = ReqwestClientInner {
            http,
            endpoint,
            config,
        };

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Gets the client configuration.
    pub fn config(&self) -> &ReqwestConfig {
        &self.inner.config
    }

    /// Returns the resolved completion endpoint.
    pub fn endpoint(&self) -> &Url {
        &self.inner.endpoint
    }

    /// Converts this client into a [`NotifierService`] for use with dependency injection.
    pub fn into_service(self) -> NotifierService {
        NotifierService::new(self)
    }
}

#[async_trait::async_trait]
impl NotifyProvider for ReqwestClient {
    async fn notify(&self, request: &NotifyRequest) -> crate::Result<NotifyResponse> {
        let started_at = Timestamp::now();

        tracing::debug!(
            target: TRACING_TARGET,
            request_id = %request.request_id,
            doc_id = %request.doc_id,
            url = %self.inner.endpoint,
            "Posting completion notification"
        );

        let payload = serde_json::to_vec(&request.to_payload()).map_err(Error::Serde)?;
        let timeout = request
            .timeout
            .unwrap_or_else(|| self.config().effective_timeout());

        let http_response = self
            .inner
            .http
            .post(self.inner.endpoint.clone())
            .header("Content-Type", "application/json")
            .header("X-Request-Id", request.request_id.to_string())
            .timeout(timeout)
            .body(payload)
            .send()
            .await
            .map_err(Error::from)?;

        let status_code = http_response.status().as_u16();
        let response = NotifyResponse::new(request.request_id, status_code, started_at);

        tracing::debug!(
            target: TRACING_TARGET,
            request_id = %request.request_id,
            status_code,
            success = response.is_success(),
            "Completion notification answered"
        );

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::post;

    use super::*;
    use crate::ErrorKind;

    type Received = Arc<Mutex<Vec<serde_json::Value>>>;

    /// Serves a fake status API that records bodies and answers `status`
    /// after `delay`.
    async fn spawn_status_api(status: StatusCode, delay: Duration) -> (SocketAddr, Received) {
        let received: Received = Arc::default();
        let sink = received.clone();

        let app = Router::new().route(
            "/internal/mark_done",
            post(move |axum::Json(body): axum::Json<serde_json::Value>| {
                let sink = sink.clone();
                async move {
                    sink.lock().unwrap().push(body);
                    tokio::time::sleep(delay).await;
                    status
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (addr, received)
    }

    fn client_for(addr: SocketAddr, timeout_secs: u64) -> ReqwestClient {
        let base = Url::parse(&format!("http://{addr}")).unwrap();
        ReqwestClient::new(ReqwestConfig::new(base).with_timeout(timeout_secs)).unwrap()
    }

    #[tokio::test]
    async fn test_posts_doc_id_payload() {
        let (addr, received) = spawn_status_api(StatusCode::OK, Duration::ZERO).await;
        let client = client_for(addr, 5);

        let response = client.notify(&NotifyRequest::new("doc1")).await.unwrap();

        assert!(response.is_success());
        assert_eq!(
            received.lock().unwrap().as_slice(),
            &[serde_json::json!({ "doc_id": "doc1" })]
        );
    }

    #[tokio::test]
    async fn test_reports_non_success_status() {
        let (addr, _) = spawn_status_api(StatusCode::INTERNAL_SERVER_ERROR, Duration::ZERO).await;
        let client = client_for(addr, 5);

        let response = client.notify(&NotifyRequest::new("doc1")).await.unwrap();
        assert_eq!(response.status_code, 500);

        let error = client.into_service().mark_done("doc1").await.unwrap_err();
        assert_eq!(error.kind, ErrorKind::UnexpectedStatus);
    }

    #[tokio::test]
    async fn test_slow_endpoint_times_out() {
        let (addr, _) = spawn_status_api(StatusCode::OK, Duration::from_secs(3)).await;
        let client = client_for(addr, 1);

        let error = client
            .notify(&NotifyRequest::new("doc1"))
            .await
            .unwrap_err();
        assert_eq!(error.kind, ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_network_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let error = client_for(addr, 5)
            .notify(&NotifyRequest::new("doc1"))
            .await
            .unwrap_err();
        assert_eq!(error.kind, ErrorKind::NetworkError);
    }

    #[test]
    fn test_endpoint_resolution() {
        let config = ReqwestConfig::new(Url::parse("http://localhost:8000/").unwrap());
        let client = ReqwestClient::new(config).unwrap();
        assert_eq!(
            client.endpoint().as_str(),
            "http://localhost:8000/internal/mark_done"
        );
    }
}
