//! Reqwest client configuration.

use std::time::Duration;

#[cfg(feature = "config")]
use clap::Args;
use serde::{Deserialize, Serialize};
use url::Url;

/// Default timeout for the completion call: 5 seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Path of the completion endpoint, relative to the API base.
pub const MARK_DONE_PATH: &str = "internal/mark_done";

/// Configuration for the notification HTTP client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct ReqwestConfig {
    /// Base URL of the status API (e.g. http://localhost:8000)
    #[cfg_attr(feature = "config", arg(long = "backend-base", env = "BACKEND_BASE"))]
    pub api_base: Url,

    /// Completion call timeout in seconds
    #[cfg_attr(
        feature = "config",
        arg(long = "notify-timeout", env = "NOTIFY_TIMEOUT", default_value_t = DEFAULT_TIMEOUT_SECS)
    )]
    #[serde(default = "default_timeout_secs")]
    pub notify_timeout: u64,

    /// User-Agent header to send with requests
    #[cfg_attr(
        feature = "config",
        arg(long = "http-user-agent", env = "HTTP_USER_AGENT")
    )]
    #[serde(default)]
    pub user_agent: Option<String>,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl ReqwestConfig {
    /// Create a new configuration for the given API base.
    pub fn new(api_base: Url) -> Self {
        Self {
            api_base,
            notify_timeout: DEFAULT_TIMEOUT_SECS,
            user_agent: None,
        }
    }

    /// Returns the effective timeout, using default if zero.
    pub fn effective_timeout(&self) -> Duration {
        if self.notify_timeout == 0 {
            Duration::from_secs(DEFAULT_TIMEOUT_SECS)
        } else {
            Duration::from_secs(self.notify_timeout)
        }
    }

    /// Returns the effective user agent, using default if not set.
    pub fn effective_user_agent(&self) -> String {
        self.user_agent
            .clone()
            .unwrap_or_else(Self::default_user_agent)
    }

    /// Returns the absolute URL of the completion endpoint.
    ///
    /// Trailing slashes on the base are ignored, and any path on the base is
    /// kept, so `http://host/api/` resolves to `http://host/api/internal/mark_done`.
    pub fn mark_done_url(&self) -> Result<Url, url::ParseError> {
        let base = self.api_base.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}/{MARK_DONE_PATH}"))
    }

    /// Returns the default user agent string.
    fn default_user_agent() -> String {
        format!("docflow/{}", env!("CARGO_PKG_VERSION"))
    }

    /// Set the timeout in seconds.
    #[must_use]
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.notify_timeout = timeout_secs;
        self
    }

    /// Set the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(url: &str) -> ReqwestConfig {
        ReqwestConfig::new(Url::parse(url).unwrap())
    }

    #[test]
    fn test_default_timeout() {
        let config = base("http://localhost:8000");
        assert_eq!(config.effective_timeout(), Duration::from_secs(5));
        assert!(config.user_agent.is_none());
    }

    #[test]
    fn test_effective_timeout_uses_default_when_zero() {
        let config = base("http://localhost:8000").with_timeout(0);
        assert_eq!(
            config.effective_timeout(),
            Duration::from_secs(DEFAULT_TIMEOUT_SECS)
        );
    }

    #[test]
    fn test_mark_done_url_trims_trailing_slash() {
        let config = base("http://localhost:8000/");
        assert_eq!(
            config.mark_done_url().unwrap().as_str(),
            "http://localhost:8000/internal/mark_done"
        );
    }

    #[test]
    fn test_mark_done_url_keeps_base_path() {
        let config = base("https://status.example.com/api");
        assert_eq!(
            config.mark_done_url().unwrap().as_str(),
            "https://status.example.com/api/internal/mark_done"
        );
    }

    #[test]
    fn test_effective_user_agent() {
        assert!(base("http://x").effective_user_agent().contains("docflow"));
        assert_eq!(
            base("http://x").with_user_agent("docflow-test/1").effective_user_agent(),
            "docflow-test/1"
        );
    }
}
