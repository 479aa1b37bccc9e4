//! Sync processor — drains pending tasks through the four-step pipeline.
//!
//! Each tick closes out series whose batches already finished, then picks up
//! every `syncing` series with live tasks. Series are processed in parallel
//! up to a bound; within one series chapters run strictly sequentially so
//! per-source-domain rate limits hold.
//!
//! The pipeline per task: enumerate images on the source, stage them into an
//! intermediate archive, persist the archive to durable storage, register
//! the chapter in the backend catalog. The staged archive URL is written to
//! the task between staging and persisting, so a restart (or retry after an
//! upload failure) resumes without re-staging.

use crate::cache::CachePurger;
use crate::clients::{
    CatalogBackend, ChapterUploader, NewCatalogChapter, SourceScraper, StageRequest, UploadRequest,
};
use crate::config::Config;
use crate::db::{Database, Series, SyncTask};
use crate::error::Error;
use crate::events::EventPublisher;
use crate::notify::Notifier;
use crate::types::{Event, SeriesStatus, TaskStatus};
use crate::Result;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;

/// Drains sync tasks created by the scanner
pub struct SyncProcessor {
    db: Arc<Database>,
    scraper: Arc<dyn SourceScraper>,
    uploader: Arc<dyn ChapterUploader>,
    catalog: Arc<dyn CatalogBackend>,
    events: EventPublisher,
    cache: CachePurger,
    notifier: Arc<Notifier>,
    config: Arc<Config>,
}

impl SyncProcessor {
    /// Wire a processor against the shared store and collaborators
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<Database>,
        scraper: Arc<dyn SourceScraper>,
        uploader: Arc<dyn ChapterUploader>,
        catalog: Arc<dyn CatalogBackend>,
        events: EventPublisher,
        cache: CachePurger,
        notifier: Arc<Notifier>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            db,
            scraper,
            uploader,
            catalog,
            events,
            cache,
            notifier,
            config,
        }
    }

    /// One processor pass: close finished batches, then drive active series
    pub async fn tick(&self) {
        if let Err(e) = self.db.resolve_completed_syncing_series().await {
            tracing::error!(error = %e, "Failed to resolve finished syncing series");
        }

        let active = match self.db.get_series_with_active_tasks().await {
            Ok(active) => active,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load series with active tasks");
                return;
            }
        };
        if active.is_empty() {
            return;
        }

        futures::stream::iter(active)
            .for_each_concurrent(self.config.processor.max_concurrent_syncs.max(1), |series| {
                async move {
                    self.process_series(&series).await;
                }
            })
            .await;
    }

    /// Process up to the chapter budget for one series, sequentially.
    ///
    /// With no work left, finalizes the series instead: `error` when any
    /// task failed, `idle` otherwise. Finalization is idempotent.
    pub async fn process_series(&self, series: &Series) {
        let policy = series
            .source_domain
            .as_deref()
            .map(|domain| self.config.domain_policy(domain))
            .unwrap_or_default();
        let budget = self
            .config
            .processor
            .chapters_per_series
            .min(policy.max_concurrent_chapters)
            .max(1);

        let batch = match self.db.get_pending_tasks(series.id, budget as i64).await {
            Ok(batch) => batch,
            Err(e) => {
                tracing::error!(series_id = %series.id, error = %e, "Failed to load pending tasks");
                return;
            }
        };

        if batch.is_empty() {
            self.finalize_series(series).await;
            return;
        }

        let delay = Duration::from_millis(policy.inter_chapter_delay_ms);
        for (index, task) in batch.iter().enumerate() {
            self.process_task(series, task).await;

            if !delay.is_zero() && index + 1 < batch.len() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    /// Close out a series whose batch has fully drained
    async fn finalize_series(&self, series: &Series) {
        let tasks = match self.db.get_tasks_for_series(series.id).await {
            Ok(tasks) => tasks,
            Err(e) => {
                tracing::error!(series_id = %series.id, error = %e, "Failed to inspect tasks");
                return;
            }
        };
        if tasks.iter().any(|t| t.task_status().is_active()) {
            return;
        }

        let any_failed = tasks
            .iter()
            .any(|t| t.task_status() == TaskStatus::Failed);
        let outcome = if any_failed {
            self.db
                .set_series_status(
                    series.id,
                    SeriesStatus::Error,
                    Some("Some chapters failed to sync"),
                )
                .await
        } else {
            match self
                .db
                .set_series_status(series.id, SeriesStatus::Idle, None)
                .await
            {
                Ok(()) => self.db.set_last_synced_at(series.id).await,
                Err(e) => Err(e),
            }
        };
        if let Err(e) = outcome {
            tracing::error!(series_id = %series.id, error = %e, "Failed to finalize series");
            return;
        }
        if let Err(e) = self.db.refresh_sync_progress(series.id).await {
            tracing::error!(series_id = %series.id, error = %e, "Failed to refresh progress");
        }

        tracing::info!(
            series_id = %series.id,
            external_id = %series.external_id,
            failed = any_failed,
            "Sync batch finished"
        );

        if any_failed
            && let Ok(Some(updated)) = self.db.get_series(series.id).await
        {
            self.notifier.notify_series_failure(&updated);
        }
    }

    /// Drive one task through the pipeline, recording the terminal outcome
    async fn process_task(&self, series: &Series, task: &SyncTask) {
        match self.run_pipeline(series, task).await {
            Ok(()) => {
                if let Err(e) = self
                    .db
                    .set_task_status(task.id, TaskStatus::Completed, None, None)
                    .await
                {
                    tracing::error!(task_id = %task.id, error = %e, "Failed to mark task completed");
                }
                if let Err(e) = self.db.refresh_sync_progress(series.id).await {
                    tracing::error!(series_id = %series.id, error = %e, "Failed to refresh progress");
                }

                self.cache
                    .schedule_chapter(&series.external_id, task.chapter_number);
                self.events.publish(Event::SyncProgress {
                    external_id: series.external_id.clone(),
                    chapter_number: task.chapter_number,
                    status: TaskStatus::Completed,
                    error: None,
                });
            }
            Err(e) => {
                let message = e.to_string();
                tracing::warn!(
                    task_id = %task.id,
                    series_id = %series.id,
                    chapter = task.chapter_number,
                    error = %message,
                    "Chapter sync failed"
                );

                if let Err(db_err) = self
                    .db
                    .set_task_status(task.id, TaskStatus::Failed, None, Some(&message))
                    .await
                {
                    tracing::error!(task_id = %task.id, error = %db_err, "Failed to mark task failed");
                }
                if let Err(db_err) = self.db.refresh_sync_progress(series.id).await {
                    tracing::error!(series_id = %series.id, error = %db_err, "Failed to refresh progress");
                }

                self.events.publish(Event::SyncProgress {
                    external_id: series.external_id.clone(),
                    chapter_number: task.chapter_number,
                    status: TaskStatus::Failed,
                    error: Some(message),
                });
            }
        }
    }

    /// The four pipeline steps. A stored archive URL short-circuits straight
    /// to the persist step.
    async fn run_pipeline(&self, series: &Series, task: &SyncTask) -> Result<()> {
        let zip_url = match &task.zip_url {
            Some(zip_url) => zip_url.clone(),
            None => {
                // Step A: enumerate images on the source
                self.db
                    .set_task_status(task.id, TaskStatus::Scraping, None, None)
                    .await?;
                let images = self.scraper.chapter_images(&task.chapter_url).await?;
                if images.is_empty() {
                    return Err(Error::Scraper(
                        "No images found for chapter".to_string(),
                    ));
                }

                // Step B: stage into an intermediate archive
                let staged = self
                    .scraper
                    .stage_chapter(&StageRequest {
                        images,
                        series_external_id: series.external_id.clone(),
                        chapter_number: format_chapter_number(task.chapter_number),
                        series_title: series.title.clone(),
                        chapter_url: task.chapter_url.clone(),
                    })
                    .await?;

                // Persisting the archive URL before the upload step means a
                // restart mid-upload does not repeat the staging work.
                self.db
                    .set_task_status(task.id, TaskStatus::Scraped, Some(&staged.zip_url), None)
                    .await?;
                staged.zip_url
            }
        };

        // Step C: persist to durable storage (idempotent per series+chapter)
        self.db
            .set_task_status(task.id, TaskStatus::Uploading, None, None)
            .await?;
        let uploaded = self
            .uploader
            .upload_single(&UploadRequest {
                zip_url,
                series_external_id: series.external_id.clone(),
                chapter_number: task.chapter_number,
            })
            .await?;

        // Step D: register in the backend catalog
        self.catalog
            .create_chapters(
                &series.external_id,
                &[NewCatalogChapter {
                    chapter_id: uploaded.chapter_id,
                    chapter_number: task.chapter_number,
                    chapter_title: String::new(),
                    chapter_images: uploaded.images,
                    path: uploaded.path,
                    thumbnail_image_url: self.config.external.default_thumbnail_url.clone(),
                }],
            )
            .await?;
        self.db
            .increment_backend_chapter_stats(series.id, task.chapter_number)
            .await?;

        Ok(())
    }
}

/// Render a chapter number the way sources write them: no trailing ".0"
fn format_chapter_number(number: f64) -> String {
    if number.fract() == 0.0 {
        format!("{}", number as i64)
    } else {
        format!("{}", number)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
