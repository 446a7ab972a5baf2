#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod error;
mod service;

pub mod request;
pub mod response;

#[cfg(feature = "reqwest")]
#[cfg_attr(docsrs, doc(cfg(feature = "reqwest")))]
pub mod reqwest;

pub use error::{BoxedError, Error, ErrorKind, Result};
pub use request::{NotifyPayload, NotifyRequest};
pub use response::NotifyResponse;
pub use service::NotifierService;

/// Tracing target for notification operations.
pub const TRACING_TARGET: &str = "docflow_webhook";

/// Core trait for delivering completion notifications.
///
/// Implementations report the HTTP status they received; deciding whether
/// that status counts as an acknowledgement is left to [`NotifierService`].
#[async_trait::async_trait]
pub trait NotifyProvider: Send + Sync {
    /// Delivers a completion notification for a single document.
    async fn notify(&self, request: &NotifyRequest) -> Result<NotifyResponse>;
}
