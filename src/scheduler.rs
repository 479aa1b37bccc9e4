//! Fixed-interval tickers driving the scanner and processor.
//!
//! A ticker is a loop, not a timer that re-arms itself from a callback:
//! wait the interval, run the task to completion, repeat. The next tick
//! fires a full interval after the previous one *completes*, so a ticker
//! can never overlap itself. Shutdown stops new ticks and waits for any
//! in-flight tick to return.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A single background ticker
pub struct Ticker {
    name: &'static str,
    handle: tokio::task::JoinHandle<()>,
}

impl Ticker {
    /// Spawn a ticker that runs `task` every `interval`, measured from the
    /// completion of the previous run. No tick starts after `shutdown` is
    /// cancelled; an in-flight tick always runs to completion.
    pub fn spawn<F, Fut>(
        name: &'static str,
        interval: Duration,
        shutdown: CancellationToken,
        task: F,
    ) -> Self
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tracing::debug!(ticker = name, interval_ms = interval.as_millis() as u64, "Ticker started");
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                if shutdown.is_cancelled() {
                    break;
                }
                task().await;
            }
            tracing::debug!(ticker = name, "Ticker stopped");
        });

        Self { name, handle }
    }

    /// Wait for the ticker to wind down. The shutdown token must already be
    /// cancelled; this blocks until any in-flight tick returns.
    pub async fn stop(self) {
        if let Err(e) = self.handle.await {
            tracing::error!(ticker = self.name, error = %e, "Ticker task panicked");
        }
    }
}
