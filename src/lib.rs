//! # manga-mirror
//!
//! Backend library for keeping a downstream content catalog continuously
//! aligned with upstream source websites.
//!
//! For each registered series, a scheduled scanner discovers new chapters on
//! the series' sources, compares them with the backend catalog, and emits
//! durable sync tasks. A processor drains those tasks through a four-step
//! external pipeline (enumerate images, stage an archive, persist to durable
//! storage, register in the catalog) with bounded concurrency and per-domain
//! rate limits. Operators drive the registry through an authenticated HTTP
//! API; downstream consumers follow progress over a realtime event stream.
//!
//! ## Design Philosophy
//!
//! - **Library-first** - No CLI or UI; a host binary wires config, service,
//!   and API server together
//! - **At-least-once** - Every chapter is delivered at least once, with
//!   idempotent checks against the catalog; never exactly-once
//! - **Crash-safe** - Stale pipeline state is recovered at boot before any
//!   worker starts
//! - **Event-driven** - Consumers subscribe to lifecycle and progress
//!   events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use manga_mirror::{Config, MirrorService, api, run_with_shutdown};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let service = Arc::new(MirrorService::new(config).await?);
//!
//!     // Recover interrupted state and start the scanner/processor tickers
//!     service.start().await?;
//!
//!     // Serve the admin API until a termination signal arrives
//!     tokio::spawn(api::start_api_server(
//!         service.clone(),
//!         service.config().clone(),
//!     ));
//!     run_with_shutdown(service).await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Admin REST API module
pub mod api;
/// Debounced cache invalidation
pub mod cache;
/// External collaborator clients (scraper, uploader, catalog)
pub mod clients;
/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Error types
pub mod error;
/// Event publication (broadcast + external bus)
pub mod events;
/// Failure notifications with cooldown
pub mod notify;
/// Sync processor draining the task queue
pub mod processor;
/// Retry logic with backoff
pub mod retry;
/// Chapter discovery scanner
pub mod scanner;
/// Fixed-interval tickers
pub mod scheduler;
/// Core service wiring and lifecycle
pub mod service;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use error::{Error, Result, ToHttpStatus};
pub use events::EventPublisher;
pub use service::MirrorService;
pub use types::{
    Event, EventEnvelope, SeriesId, SeriesStatus, SourceId, SourceScanStatus, TaskId, TaskStatus,
};

use std::sync::Arc;

/// Helper function to run the service with graceful signal handling.
///
/// Waits for a termination signal and then calls the service's
/// `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal
///   registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
pub async fn run_with_shutdown(service: Arc<MirrorService>) -> Result<()> {
    wait_for_signal().await;
    service.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
