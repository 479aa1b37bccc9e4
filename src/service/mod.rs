//! Core service wiring: store, clients, tickers, and lifecycle.
//!
//! [`MirrorService`] owns the registry store and the two workers. Boot order
//! is strict: open and migrate the database, recover stale sync state, then
//! start the scanner and processor tickers. Shutdown is the reverse: stop
//! new ticks, wait for in-flight ticks, close the store.

use crate::cache::CachePurger;
use crate::clients::{
    CatalogBackend, ChapterUploader, HttpCatalogClient, HttpScraperClient, HttpUploaderClient,
    SourceScraper,
};
use crate::config::Config;
use crate::db::{Database, RecoveryReport, Series};
use crate::error::Error;
use crate::events::EventPublisher;
use crate::notify::Notifier;
use crate::processor::SyncProcessor;
use crate::scanner::Scanner;
use crate::scheduler::Ticker;
use crate::types::EventEnvelope;
use crate::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

/// The auto-synchronization service core
pub struct MirrorService {
    /// Registry store. Public for hosts and integration tests that need to
    /// inspect durable state; mutations go through the documented operations.
    pub db: Arc<Database>,
    config: Arc<Config>,
    events: EventPublisher,
    scanner: Arc<Scanner>,
    processor: Arc<SyncProcessor>,
    shutdown: CancellationToken,
    tickers: Mutex<Vec<Ticker>>,
}

impl MirrorService {
    /// Build a service with HTTP clients for every collaborator.
    ///
    /// Opens (and migrates) the database but does not start the workers;
    /// call [`start`](Self::start) after construction.
    pub async fn new(config: Config) -> Result<Self> {
        let db = Database::new(&config.persistence.database_path).await?;
        let scraper: Arc<dyn SourceScraper> = Arc::new(HttpScraperClient::new(&config.external)?);
        let uploader: Arc<dyn ChapterUploader> =
            Arc::new(HttpUploaderClient::new(&config.external)?);
        let catalog: Arc<dyn CatalogBackend> = Arc::new(HttpCatalogClient::new(&config.external)?);

        Ok(Self::with_collaborators(config, db, scraper, uploader, catalog))
    }

    /// Build a service over explicit collaborator implementations.
    ///
    /// Tests substitute in-memory fakes here; production goes through
    /// [`new`](Self::new).
    pub fn with_collaborators(
        config: Config,
        db: Database,
        scraper: Arc<dyn SourceScraper>,
        uploader: Arc<dyn ChapterUploader>,
        catalog: Arc<dyn CatalogBackend>,
    ) -> Self {
        let config = Arc::new(config);
        let db = Arc::new(db);
        let events = EventPublisher::new(&config.external);
        let cache = CachePurger::spawn(&config.external);
        let notifier = Arc::new(Notifier::new(&config.external, &config.notifications));

        let scanner = Arc::new(Scanner::new(
            db.clone(),
            scraper.clone(),
            catalog.clone(),
            events.clone(),
            cache.clone(),
            notifier.clone(),
            config.clone(),
        ));
        let processor = Arc::new(SyncProcessor::new(
            db.clone(),
            scraper,
            uploader,
            catalog,
            events.clone(),
            cache,
            notifier,
            config.clone(),
        ));

        Self {
            db,
            config,
            events,
            scanner,
            processor,
            shutdown: CancellationToken::new(),
            tickers: Mutex::new(Vec::new()),
        }
    }

    /// Shared configuration
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// Event publisher for API-level lifecycle events
    pub fn events(&self) -> &EventPublisher {
        &self.events
    }

    /// Subscribe to the in-process event stream
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<EventEnvelope> {
        self.events.subscribe()
    }

    /// Recover interrupted sync state and start the two tickers.
    ///
    /// Recovery runs exactly once, before the first tick, so the invariants
    /// over series and task statuses hold from the first scheduled pass.
    pub async fn start(&self) -> Result<RecoveryReport> {
        let mut tickers = self.tickers.lock().await;
        if !tickers.is_empty() {
            return Err(Error::Other("service already started".to_string()));
        }
        if self.shutdown.is_cancelled() {
            return Err(Error::ShuttingDown);
        }

        let report = self.db.recover_stale_tasks().await?;

        let scanner = self.scanner.clone();
        tickers.push(Ticker::spawn(
            "scanner",
            Duration::from_millis(self.config.scanner.interval_ms),
            self.shutdown.clone(),
            move || {
                let scanner = scanner.clone();
                async move { scanner.tick().await }
            },
        ));

        let processor = self.processor.clone();
        tickers.push(Ticker::spawn(
            "processor",
            Duration::from_millis(self.config.processor.interval_ms),
            self.shutdown.clone(),
            move || {
                let processor = processor.clone();
                async move { processor.tick().await }
            },
        ));

        tracing::info!(
            scanner_interval_ms = self.config.scanner.interval_ms,
            processor_interval_ms = self.config.processor.interval_ms,
            "Mirror service started"
        );
        Ok(report)
    }

    /// Scan one series right away, off the scheduler's cadence.
    ///
    /// Used for the first scan after registration and for force-scans; the
    /// scan runs on a detached task and reports through events.
    pub fn spawn_immediate_scan(&self, series: Series) {
        if self.shutdown.is_cancelled() {
            return;
        }
        let scanner = self.scanner.clone();
        tokio::spawn(async move {
            scanner.scan_series(&series).await;
        });
    }

    /// Stop accepting ticks, wait for in-flight work, close the store
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown.cancel();

        let drained: Vec<Ticker> = {
            let mut tickers = self.tickers.lock().await;
            tickers.drain(..).collect()
        };
        for ticker in drained {
            ticker.stop().await;
        }

        self.db.pool().close().await;
        tracing::info!("Mirror service stopped");
        Ok(())
    }
}
