//! Series CRUD, status transitions, and scan bookkeeping.

use crate::error::DatabaseError;
use crate::types::{SeriesId, SeriesStatus};
use crate::{Error, Result};

use super::{Database, NewSeries, Series, SeriesFilter, SeriesPatch, SeriesWithSources, StatusCount};
use super::sources::normalize_source_urls;

/// Column list shared by every series SELECT
const SERIES_COLUMNS: &str = "id, external_id, title, manga_url, source_domain, manga_slug, \
     auto_sync_enabled, check_interval_minutes, priority, \
     source_chapter_count, source_last_chapter, backend_chapter_count, backend_last_chapter, \
     status, sync_progress_total, sync_progress_completed, sync_progress_failed, \
     last_scanned_at, last_synced_at, next_scan_at, created_at, updated_at, \
     last_error, last_error_at, consecutive_failures";

impl Database {
    /// Register a new series with its sources.
    ///
    /// The series starts `idle` with `next_scan_at = now` so the scanner picks
    /// it up on its next tick. Fails with `AlreadyRegistered` when the
    /// external catalog id collides.
    pub async fn create_series(&self, new: &NewSeries) -> Result<SeriesWithSources> {
        let normalized = normalize_source_urls(&new.source_urls)?;
        if new.title.trim().is_empty() {
            return Err(Error::Validation("title must not be empty".to_string()));
        }
        if new.check_interval_minutes == 0 {
            return Err(Error::Validation(
                "check_interval_minutes must be positive".to_string(),
            ));
        }

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to begin transaction: {}",
                e
            )))
        })?;

        let existing: Option<i64> =
            sqlx::query_scalar("SELECT id FROM series WHERE external_id = ?")
                .bind(&new.external_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to check external id: {}",
                        e
                    )))
                })?;
        if existing.is_some() {
            return Err(Error::AlreadyRegistered(new.external_id.clone()));
        }

        let primary = &normalized[0];
        let result = sqlx::query(
            r#"
            INSERT INTO series (
                external_id, title, manga_url, source_domain, manga_slug,
                auto_sync_enabled, check_interval_minutes, priority,
                status, next_scan_at, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?)
            "#,
        )
        .bind(&new.external_id)
        .bind(new.title.trim())
        .bind(&primary.url)
        .bind(&primary.domain)
        .bind(&primary.slug)
        .bind(new.auto_sync_enabled)
        .bind(new.check_interval_minutes as i64)
        .bind(new.priority)
        .bind(now)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert series: {}",
                e
            )))
        })?;

        let series_id = SeriesId(result.last_insert_rowid());

        for (index, source) in normalized.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO sources (
                    series_id, source_url, source_domain, manga_slug,
                    priority, is_enabled, created_at
                ) VALUES (?, ?, ?, ?, ?, 1, ?)
                "#,
            )
            .bind(series_id)
            .bind(&source.url)
            .bind(&source.domain)
            .bind(&source.slug)
            .bind((index + 1) as i64)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to insert source: {}",
                    e
                )))
            })?;
        }

        tx.commit().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to commit series create: {}",
                e
            )))
        })?;

        let series = self
            .get_series(series_id)
            .await?
            .ok_or_else(|| Error::Other("series vanished after insert".to_string()))?;
        let sources = self.get_sources(series_id).await?;
        Ok(SeriesWithSources { series, sources })
    }

    /// Get a series by internal id
    pub async fn get_series(&self, id: SeriesId) -> Result<Option<Series>> {
        let row = sqlx::query_as::<_, Series>(&format!(
            "SELECT {} FROM series WHERE id = ?",
            SERIES_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get series: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// Get a series by its external catalog id
    pub async fn get_series_by_external_id(&self, external_id: &str) -> Result<Option<Series>> {
        let row = sqlx::query_as::<_, Series>(&format!(
            "SELECT {} FROM series WHERE external_id = ?",
            SERIES_COLUMNS
        ))
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get series by external id: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// List series with optional status / title-substring filters.
    ///
    /// Returns the page of rows plus the total row count for the filter.
    pub async fn list_series(&self, filter: &SeriesFilter) -> Result<(Vec<Series>, i64)> {
        let page = filter.page.max(1);
        let page_size = filter.page_size.clamp(1, 100);
        let offset = (page - 1) as i64 * page_size as i64;
        let title_pattern = filter
            .title
            .as_ref()
            .map(|t| format!("%{}%", t.to_lowercase()));

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM series
            WHERE (?1 IS NULL OR status = ?1)
              AND (?2 IS NULL OR LOWER(title) LIKE ?2)
            "#,
        )
        .bind(filter.status)
        .bind(&title_pattern)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to count series: {}",
                e
            )))
        })?;

        let rows = sqlx::query_as::<_, Series>(&format!(
            r#"
            SELECT {} FROM series
            WHERE (?1 IS NULL OR status = ?1)
              AND (?2 IS NULL OR LOWER(title) LIKE ?2)
            ORDER BY created_at DESC, id DESC
            LIMIT ?3 OFFSET ?4
            "#,
            SERIES_COLUMNS
        ))
        .bind(filter.status)
        .bind(&title_pattern)
        .bind(page_size as i64)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list series: {}",
                e
            )))
        })?;

        Ok((rows, total))
    }

    /// Apply a partial update to a series.
    ///
    /// Returns the updated series with sources, or `None` when the id does
    /// not exist. Replacing the source set is atomic with respect to the
    /// denormalized primary-source fields.
    pub async fn update_series(
        &self,
        id: SeriesId,
        patch: &SeriesPatch,
    ) -> Result<Option<SeriesWithSources>> {
        if self.get_series(id).await?.is_none() {
            return Ok(None);
        }

        if let Some(interval) = patch.check_interval_minutes
            && interval == 0
        {
            return Err(Error::Validation(
                "check_interval_minutes must be positive".to_string(),
            ));
        }

        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            UPDATE series SET
                title = COALESCE(?, title),
                check_interval_minutes = COALESCE(?, check_interval_minutes),
                priority = COALESCE(?, priority),
                auto_sync_enabled = COALESCE(?, auto_sync_enabled),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(patch.title.as_deref().map(str::trim))
        .bind(patch.check_interval_minutes.map(|v| v as i64))
        .bind(patch.priority)
        .bind(patch.auto_sync_enabled)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update series: {}",
                e
            )))
        })?;

        if let Some(urls) = &patch.source_urls {
            self.replace_sources(id, urls).await?;
        }

        let series = self
            .get_series(id)
            .await?
            .ok_or_else(|| Error::Other("series vanished during update".to_string()))?;
        let sources = self.get_sources(id).await?;
        Ok(Some(SeriesWithSources { series, sources }))
    }

    /// Delete a series; sources and tasks cascade.
    ///
    /// Returns whether a row was deleted.
    pub async fn delete_series(&self, id: SeriesId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM series WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete series: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected() > 0)
    }

    /// Set the aggregate series status.
    ///
    /// A non-empty error message also records `last_error`/`last_error_at`
    /// and bumps `consecutive_failures`.
    pub async fn set_series_status(
        &self,
        id: SeriesId,
        status: SeriesStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        match error.filter(|e| !e.is_empty()) {
            Some(message) => {
                sqlx::query(
                    r#"
                    UPDATE series SET
                        status = ?,
                        last_error = ?,
                        last_error_at = ?,
                        consecutive_failures = consecutive_failures + 1,
                        updated_at = ?
                    WHERE id = ?
                    "#,
                )
                .bind(status.to_i32())
                .bind(message)
                .bind(now)
                .bind(now)
                .bind(id)
                .execute(&self.pool)
                .await
            }
            None => {
                sqlx::query("UPDATE series SET status = ?, updated_at = ? WHERE id = ?")
                    .bind(status.to_i32())
                    .bind(now)
                    .bind(id)
                    .execute(&self.pool)
                    .await
            }
        }
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to set series status: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Record the outcome of a scan that reached the compute-missing stage.
    ///
    /// Zeros the failure streak, clears the last error, and transitions
    /// `scanning -> idle` — but a concurrent transition to `syncing` is never
    /// overridden (conditional status update).
    pub async fn record_scan_result(
        &self,
        id: SeriesId,
        source_chapter_count: i64,
        source_last_chapter: Option<f64>,
        next_scan_at: i64,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            UPDATE series SET
                source_chapter_count = ?,
                source_last_chapter = ?,
                next_scan_at = ?,
                last_scanned_at = ?,
                consecutive_failures = 0,
                last_error = NULL,
                last_error_at = NULL,
                status = CASE WHEN status = 1 THEN 0 ELSE status END,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(source_chapter_count)
        .bind(source_last_chapter)
        .bind(next_scan_at)
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to record scan result: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Overwrite the backend catalog chapter stats
    pub async fn update_backend_chapter_stats(
        &self,
        id: SeriesId,
        count: i64,
        last: Option<f64>,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            UPDATE series SET
                backend_chapter_count = ?,
                backend_last_chapter = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(count)
        .bind(last)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update backend chapter stats: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Bump the backend chapter count after registering one chapter
    pub async fn increment_backend_chapter_stats(
        &self,
        id: SeriesId,
        chapter_number: f64,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            UPDATE series SET
                backend_chapter_count = backend_chapter_count + 1,
                backend_last_chapter = CASE
                    WHEN backend_last_chapter IS NULL OR backend_last_chapter < ?1 THEN ?1
                    ELSE backend_last_chapter
                END,
                updated_at = ?2
            WHERE id = ?3
            "#,
        )
        .bind(chapter_number)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to increment backend chapter stats: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Grow the active batch total after new tasks are created
    pub async fn increment_sync_progress_total(&self, id: SeriesId, delta: i64) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            "UPDATE series SET sync_progress_total = sync_progress_total + ?, updated_at = ? WHERE id = ?",
        )
        .bind(delta)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to increment sync progress total: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Recompute completed/failed progress counters from task rows
    pub async fn refresh_sync_progress(&self, id: SeriesId) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            UPDATE series SET
                sync_progress_completed = (
                    SELECT COUNT(*) FROM sync_tasks
                    WHERE series_id = ?1 AND status IN (4, 6)
                ),
                sync_progress_failed = (
                    SELECT COUNT(*) FROM sync_tasks
                    WHERE series_id = ?1 AND status = 5
                ),
                updated_at = ?2
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to refresh sync progress: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Stamp the last fully drained sync
    pub async fn set_last_synced_at(&self, id: SeriesId) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("UPDATE series SET last_synced_at = ?, updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to set last synced at: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Schedule an immediate scan.
    ///
    /// Clears the status to `idle` unless the series is actively `syncing`
    /// (forcing a scan mid-sync is an idempotent no-op on the status).
    /// Returns whether the series exists.
    pub async fn trigger_force_scan(&self, id: SeriesId) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            UPDATE series SET
                next_scan_at = ?,
                status = CASE WHEN status = 2 THEN status ELSE 0 END,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to trigger force scan: {}",
                e
            )))
        })?;

        Ok(result.rows_affected() > 0)
    }

    /// Series due for a scan: auto-enabled, idle, next_scan_at in the past.
    ///
    /// Higher priority first, then oldest due.
    pub async fn get_due_series(&self) -> Result<Vec<Series>> {
        let now = chrono::Utc::now().timestamp();
        let rows = sqlx::query_as::<_, Series>(&format!(
            r#"
            SELECT {} FROM series
            WHERE auto_sync_enabled = 1 AND status = 0
              AND next_scan_at IS NOT NULL AND next_scan_at <= ?
            ORDER BY priority DESC, next_scan_at ASC
            "#,
            SERIES_COLUMNS
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get due series: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Series in `syncing` with at least one task the processor still owns
    pub async fn get_series_with_active_tasks(&self) -> Result<Vec<Series>> {
        let rows = sqlx::query_as::<_, Series>(&format!(
            r#"
            SELECT {} FROM series s
            WHERE s.status = 2 AND EXISTS (
                SELECT 1 FROM sync_tasks t
                WHERE t.series_id = s.id AND t.status IN (0, 1, 2, 3)
            )
            ORDER BY s.priority DESC, s.id ASC
            "#,
            SERIES_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get series with active tasks: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Per-status series counts
    pub async fn series_status_counts(&self) -> Result<Vec<StatusCount>> {
        let rows = sqlx::query_as::<_, StatusCount>(
            "SELECT status, COUNT(*) AS count FROM series GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to count series by status: {}",
                e
            )))
        })?;

        Ok(rows)
    }
}
