//! Reqwest-based HTTP client for completion notifications.
//!
//! This module provides a reqwest-based implementation of the
//! [`NotifyProvider`](crate::NotifyProvider) trait.
//!
//! # Example
//!
//! ```rust,ignore
//! use docflow_webhook::reqwest::{ReqwestClient, ReqwestConfig};
//!
//! let config = ReqwestConfig::new("http://localhost:8000".parse()?);
//! let notifier = ReqwestClient::new(config)?.into_service();
//! notifier.mark_done("doc1").await?;
//! ```

mod client;
mod config;
mod error;

pub use client::ReqwestClient;
pub use config::{DEFAULT_TIMEOUT_SECS, MARK_DONE_PATH, ReqwestConfig};
pub use error::Error;

/// Tracing target for reqwest client operations.
pub const TRACING_TARGET: &str = "docflow_webhook::reqwest";
