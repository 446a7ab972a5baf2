//! Timer used between poll cycles.

use std::time::Duration;

/// Source of the inter-cycle sleep.
///
/// Swapping the clock lets tests drive cycles without real waiting.
#[async_trait::async_trait]
pub trait Clock: Send + Sync {
    /// Suspends for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// [`Clock`] backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait::async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
