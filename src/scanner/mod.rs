//! Scanner — discovers missing chapters and emits sync tasks.
//!
//! Each tick picks up every due series (auto-enabled, idle, past its
//! `next_scan_at`), scans up to a configured number of them in parallel,
//! and turns the difference between the fullest source listing and the
//! backend catalog into pending sync tasks.

use crate::Result;
use crate::cache;
use crate::clients::{CatalogBackend, SourceChapter, SourceScraper};
use crate::config::Config;
use crate::db::{Database, NewTask, Series, Source};
use crate::error::Error;
use crate::events::EventPublisher;
use crate::notify::Notifier;
use crate::types::{Event, SeriesStatus, SourceScanStatus};
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;

pub mod chapter_number;

pub use chapter_number::extract_chapter_number;

/// Catalog pages requested per call when building the backend set
const CATALOG_PAGE_SIZE: u32 = 100;

/// Hard cap on catalog pagination; a series beyond this is misbehaving
const MAX_CATALOG_PAGES: u32 = 500;

/// Map a chapter number to a hashable key (milli-chapter resolution)
pub(crate) fn chapter_key(number: f64) -> i64 {
    (number * 1000.0).round() as i64
}

/// A chapter found on the authoritative source but absent from the backend
#[derive(Debug, Clone)]
struct MissingChapter {
    url: String,
    number: f64,
}

/// Periodically discovers missing chapters for due series
pub struct Scanner {
    db: Arc<Database>,
    scraper: Arc<dyn SourceScraper>,
    catalog: Arc<dyn CatalogBackend>,
    events: EventPublisher,
    cache: cache::CachePurger,
    notifier: Arc<Notifier>,
    config: Arc<Config>,
}

impl Scanner {
    /// Wire a scanner against the shared store and collaborators
    pub fn new(
        db: Arc<Database>,
        scraper: Arc<dyn SourceScraper>,
        catalog: Arc<dyn CatalogBackend>,
        events: EventPublisher,
        cache: cache::CachePurger,
        notifier: Arc<Notifier>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            db,
            scraper,
            catalog,
            events,
            cache,
            notifier,
            config,
        }
    }

    /// Scan every due series, bounded by the configured parallelism
    pub async fn tick(&self) {
        let due = match self.db.get_due_series().await {
            Ok(due) => due,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load due series");
                return;
            }
        };
        if due.is_empty() {
            return;
        }

        tracing::debug!(count = due.len(), "Scanning due series");
        futures::stream::iter(due)
            .for_each_concurrent(self.config.scanner.max_concurrent_scans.max(1), |series| {
                async move {
                    self.scan_series(&series).await;
                }
            })
            .await;
    }

    /// Scan one series, converting any failure into the error status plus a
    /// finished event. Never propagates: one bad series must not take down
    /// the tick.
    pub async fn scan_series(&self, series: &Series) {
        if let Err(e) = self.run_scan(series).await {
            let message = e.to_string();
            tracing::warn!(
                series_id = %series.id,
                external_id = %series.external_id,
                error = %message,
                "Scan failed"
            );

            if let Err(db_err) = self
                .db
                .set_series_status(series.id, SeriesStatus::Error, Some(&message))
                .await
            {
                tracing::error!(series_id = %series.id, error = %db_err, "Failed to record scan failure");
            }

            self.events.publish(Event::ScanFinished {
                external_id: series.external_id.clone(),
                status: SeriesStatus::Error,
                missing: 0,
                error: Some(message),
            });

            if let Ok(Some(updated)) = self.db.get_series(series.id).await {
                self.notifier.notify_series_failure(&updated);
            }
        }
    }

    async fn run_scan(&self, series: &Series) -> Result<()> {
        self.db
            .set_series_status(series.id, SeriesStatus::Scanning, None)
            .await?;
        self.events.publish(Event::ScanStarted {
            external_id: series.external_id.clone(),
        });

        let sources = self.db.get_enabled_sources(series.id).await?;
        if sources.is_empty() {
            return Err(Error::Other("no sources".to_string()));
        }

        // Cheap metadata probe: when the source reports nothing newer than
        // the last scan and the counts agree, skip the full listing. A count
        // mismatch forces the full scan since gaps may hide in the middle.
        if self.config.scanner.use_metadata_fast_path
            && self.metadata_says_in_sync(series, &sources[0]).await
        {
            let next_scan_at = self.next_scan_at(series);
            self.db
                .record_scan_result(
                    series.id,
                    series.source_chapter_count,
                    series.source_last_chapter,
                    next_scan_at,
                )
                .await?;
            self.events.publish(Event::ScanFinished {
                external_id: series.external_id.clone(),
                status: SeriesStatus::Idle,
                missing: 0,
                error: None,
            });
            return Ok(());
        }

        // Fetch every enabled source concurrently; each records its own
        // per-source scan outcome.
        let listings = futures::future::join_all(
            sources.iter().map(|source| self.fetch_source(source)),
        )
        .await;

        let successes: Vec<(&Source, Vec<SourceChapter>)> = sources
            .iter()
            .zip(listings)
            .filter_map(|(source, chapters)| chapters.map(|c| (source, c)))
            .collect();
        if successes.is_empty() {
            return Err(Error::Other("all sources failed".to_string()));
        }

        // Authoritative source: the fullest listing wins, ties broken by
        // input order. Sources lag; taking the fullest avoids regressing.
        let mut selected_index = 0;
        for (index, (_, chapters)) in successes.iter().enumerate() {
            if chapters.len() > successes[selected_index].1.len() {
                selected_index = index;
            }
        }
        let (selected, chapters) = (successes[selected_index].0, &successes[selected_index].1);

        let numbered = numbered_chapters(chapters);
        let source_last_chapter = numbered
            .iter()
            .map(|c| c.number)
            .fold(None, |acc: Option<f64>, n| Some(acc.map_or(n, |a| a.max(n))));

        let backend = self.fetch_backend_set(&series.external_id).await?;
        self.db
            .update_backend_chapter_stats(series.id, backend.count, backend.last)
            .await?;

        let missing: Vec<MissingChapter> = numbered
            .into_iter()
            .filter(|c| !backend.keys.contains(&chapter_key(c.number)))
            .collect();

        let next_scan_at = self.next_scan_at(series);
        self.db
            .record_scan_result(
                series.id,
                chapters.len() as i64,
                source_last_chapter,
                next_scan_at,
            )
            .await?;

        if missing.is_empty() {
            self.events.publish(Event::ScanFinished {
                external_id: series.external_id.clone(),
                status: SeriesStatus::Idle,
                missing: 0,
                error: None,
            });
            return Ok(());
        }

        let tasks: Vec<NewTask> = missing
            .iter()
            .enumerate()
            .map(|(index, chapter)| NewTask {
                chapter_url: chapter.url.clone(),
                chapter_number: chapter.number,
                weight: index as i64,
                source_id: Some(selected.id),
            })
            .collect();
        let created = self.db.create_tasks(series.id, &tasks).await?;

        self.db
            .set_series_status(series.id, SeriesStatus::Syncing, None)
            .await?;
        if created > 0 {
            self.db
                .increment_sync_progress_total(series.id, created as i64)
                .await?;
        }

        tracing::info!(
            series_id = %series.id,
            external_id = %series.external_id,
            source = %selected.source_domain,
            missing = missing.len(),
            created,
            "Scan found missing chapters"
        );
        self.events.publish(Event::ScanFinished {
            external_id: series.external_id.clone(),
            status: SeriesStatus::Syncing,
            missing: missing.len() as u64,
            error: None,
        });

        // Listings changed, so downstream caches are stale too
        self.cache.schedule([format!("series:{}", series.external_id)]);

        Ok(())
    }

    /// Fetch one source's listing, recording its scan outcome.
    /// Returns `None` on failure; the caller aggregates.
    async fn fetch_source(&self, source: &Source) -> Option<Vec<SourceChapter>> {
        match self.scraper.list_chapters(&source.source_url).await {
            Ok(chapters) if chapters.is_empty() => {
                self.record_source(source, SourceScanStatus::Empty, None, None, None)
                    .await;
                Some(chapters)
            }
            Ok(chapters) => {
                let last = chapters
                    .iter()
                    .filter_map(extract_chapter_number)
                    .fold(None, |acc: Option<f64>, n| Some(acc.map_or(n, |a| a.max(n))));
                self.record_source(
                    source,
                    SourceScanStatus::Success,
                    Some(chapters.len() as i64),
                    last,
                    None,
                )
                .await;
                Some(chapters)
            }
            Err(e) => {
                let status = match &e {
                    Error::Timeout { .. } => SourceScanStatus::Timeout,
                    _ => SourceScanStatus::Error,
                };
                let message = e.to_string();
                tracing::warn!(
                    source = %source.source_domain,
                    error = %message,
                    "Source listing failed"
                );
                self.record_source(source, status, None, None, Some(&message))
                    .await;
                None
            }
        }
    }

    async fn record_source(
        &self,
        source: &Source,
        status: SourceScanStatus,
        count: Option<i64>,
        last: Option<f64>,
        error: Option<&str>,
    ) {
        if let Err(e) = self
            .db
            .record_source_scan(source.id, status, count, last, error)
            .await
        {
            tracing::error!(source_id = %source.id, error = %e, "Failed to record source scan");
        }
    }

    /// Whether the metadata probe proves the backend is already in sync
    async fn metadata_says_in_sync(&self, series: &Series, primary: &Source) -> bool {
        let Some(known_last) = series.source_last_chapter else {
            return false;
        };

        match self.scraper.source_metadata(&primary.source_url).await {
            Ok(meta) => match (meta.last_chapter, meta.total) {
                (Some(last), Some(total)) => {
                    last <= known_last && total == series.backend_chapter_count
                }
                _ => false,
            },
            Err(e) => {
                tracing::debug!(error = %e, "Metadata probe failed, running full scan");
                false
            }
        }
    }

    /// The backend catalog's full chapter-number set, paginated to exhaustion
    async fn fetch_backend_set(&self, external_id: &str) -> Result<BackendSet> {
        let mut keys = HashSet::new();
        let mut last: Option<f64> = None;
        let mut count: i64 = 0;

        for page in 1..=MAX_CATALOG_PAGES {
            let chunk = self
                .catalog
                .list_chapters(external_id, page, CATALOG_PAGE_SIZE)
                .await?;

            for number in &chunk.chapter_numbers {
                if keys.insert(chapter_key(*number)) {
                    count += 1;
                }
                last = Some(last.map_or(*number, |l| l.max(*number)));
            }

            if chunk.chapter_numbers.is_empty() || page >= chunk.total_pages {
                return Ok(BackendSet { keys, count, last });
            }
        }

        Err(Error::Catalog(format!(
            "catalog listing for {} exceeded {} pages",
            external_id, MAX_CATALOG_PAGES
        )))
    }

    fn next_scan_at(&self, series: &Series) -> i64 {
        let interval_minutes = if series.check_interval_minutes > 0 {
            series.check_interval_minutes
        } else {
            self.config.scanner.default_check_interval_minutes as i64
        };
        chrono::Utc::now().timestamp() + interval_minutes * 60
    }
}

struct BackendSet {
    keys: HashSet<i64>,
    count: i64,
    last: Option<f64>,
}

/// Resolve chapter numbers for a listing, dropping unnumbered items and
/// deduping repeated numbers (first occurrence wins, preserving order)
fn numbered_chapters(chapters: &[SourceChapter]) -> Vec<MissingChapter> {
    let mut seen = HashSet::new();
    let mut numbered = Vec::with_capacity(chapters.len());

    for chapter in chapters {
        let Some(number) = extract_chapter_number(chapter) else {
            tracing::debug!(url = %chapter.url, title = %chapter.title, "Chapter without a number, skipping");
            continue;
        };
        if seen.insert(chapter_key(number)) {
            numbered.push(MissingChapter {
                url: chapter.url.clone(),
                number,
            });
        }
    }

    numbered
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
