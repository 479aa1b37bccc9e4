//! Sync task upserts, pipeline status transitions, and queue sweeps.

use crate::error::DatabaseError;
use crate::types::{SeriesId, SeriesStatus, TaskId, TaskStatus};
use crate::{Error, Result};

use super::{Database, NewTask, StatusCount, SyncTask};

/// Column list shared by every sync task SELECT
const TASK_COLUMNS: &str = "id, series_id, source_id, chapter_url, chapter_number, weight, \
     status, zip_url, error, retry_count, created_at, updated_at";

impl Database {
    /// Bulk-insert sync tasks for a series inside one transaction.
    ///
    /// Upsert semantics: a task that collides on `(series_id, chapter_number)`
    /// only gets its `updated_at` bumped, so concurrent discovery never
    /// duplicates a chapter. Returns the number of rows actually created.
    pub async fn create_tasks(&self, series_id: SeriesId, tasks: &[NewTask]) -> Result<u64> {
        if tasks.is_empty() {
            return Ok(0);
        }

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to begin transaction: {}",
                e
            )))
        })?;

        let mut created = 0u64;
        for task in tasks {
            let existing: Option<i64> = sqlx::query_scalar(
                "SELECT id FROM sync_tasks WHERE series_id = ? AND chapter_number = ?",
            )
            .bind(series_id)
            .bind(task.chapter_number)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to check task existence: {}",
                    e
                )))
            })?;
            if existing.is_none() {
                created += 1;
            }

            sqlx::query(
                r#"
                INSERT INTO sync_tasks (
                    series_id, source_id, chapter_url, chapter_number,
                    weight, status, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, 0, ?, ?)
                ON CONFLICT(series_id, chapter_number)
                DO UPDATE SET updated_at = excluded.updated_at
                "#,
            )
            .bind(series_id)
            .bind(task.source_id)
            .bind(&task.chapter_url)
            .bind(task.chapter_number)
            .bind(task.weight)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to upsert sync task: {}",
                    e
                )))
            })?;
        }

        tx.commit().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to commit task creation: {}",
                e
            )))
        })?;

        Ok(created)
    }

    /// Tasks awaiting processor work for a series, lightest weight first.
    ///
    /// Includes `scraped` rows so a task recovered mid-pipeline (staged
    /// archive already on hand) resumes instead of starving.
    pub async fn get_pending_tasks(&self, series_id: SeriesId, limit: i64) -> Result<Vec<SyncTask>> {
        let rows = sqlx::query_as::<_, SyncTask>(&format!(
            r#"
            SELECT {} FROM sync_tasks
            WHERE series_id = ? AND status IN (0, 2)
            ORDER BY weight ASC
            LIMIT ?
            "#,
            TASK_COLUMNS
        ))
        .bind(series_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get pending tasks: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// All tasks for a series, lightest weight first
    pub async fn get_tasks_for_series(&self, series_id: SeriesId) -> Result<Vec<SyncTask>> {
        let rows = sqlx::query_as::<_, SyncTask>(&format!(
            "SELECT {} FROM sync_tasks WHERE series_id = ? ORDER BY weight ASC",
            TASK_COLUMNS
        ))
        .bind(series_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get tasks for series: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Failed tasks for a series
    pub async fn get_failed_tasks(&self, series_id: SeriesId) -> Result<Vec<SyncTask>> {
        let rows = sqlx::query_as::<_, SyncTask>(&format!(
            "SELECT {} FROM sync_tasks WHERE series_id = ? AND status = 5 ORDER BY weight ASC",
            TASK_COLUMNS
        ))
        .bind(series_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get failed tasks: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Get a single task by id
    pub async fn get_task(&self, id: TaskId) -> Result<Option<SyncTask>> {
        let row = sqlx::query_as::<_, SyncTask>(&format!(
            "SELECT {} FROM sync_tasks WHERE id = ?",
            TASK_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get task: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// Move a task through the pipeline.
    ///
    /// A `None` zip_url preserves the stored value so the processor can
    /// resume mid-pipeline after a restart; `error` likewise only overwrites
    /// when provided. Transitioning to `failed` bumps `retry_count`.
    pub async fn set_task_status(
        &self,
        id: TaskId,
        status: TaskStatus,
        zip_url: Option<&str>,
        error: Option<&str>,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            UPDATE sync_tasks SET
                status = ?1,
                zip_url = COALESCE(?2, zip_url),
                error = COALESCE(?3, error),
                retry_count = retry_count + (CASE WHEN ?1 = 5 THEN 1 ELSE 0 END),
                updated_at = ?4
            WHERE id = ?5
            "#,
        )
        .bind(status.to_i32())
        .bind(zip_url)
        .bind(error)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to set task status: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Flip all failed tasks of a series back to pending.
    ///
    /// Clears their error message and, when any row was touched, moves the
    /// series to `syncing`. Returns the number of tasks flipped.
    pub async fn retry_failed_tasks(&self, series_id: SeriesId) -> Result<u64> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to begin transaction: {}",
                e
            )))
        })?;

        let result = sqlx::query(
            r#"
            UPDATE sync_tasks SET status = 0, error = NULL, updated_at = ?
            WHERE series_id = ? AND status = 5
            "#,
        )
        .bind(now)
        .bind(series_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to retry failed tasks: {}",
                e
            )))
        })?;

        let retried = result.rows_affected();
        if retried > 0 {
            sqlx::query("UPDATE series SET status = 2, updated_at = ? WHERE id = ?")
                .bind(now)
                .bind(series_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to mark series syncing: {}",
                        e
                    )))
                })?;
        }

        tx.commit().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to commit retry: {}",
                e
            )))
        })?;

        Ok(retried)
    }

    /// Sweep series stuck in `syncing` whose tasks have all reached terminal
    /// states, flipping them to `error` (any failure) or `idle`.
    ///
    /// Returns the number of series resolved.
    pub async fn resolve_completed_syncing_series(&self) -> Result<u64> {
        #[derive(sqlx::FromRow)]
        struct Stuck {
            id: SeriesId,
            failed_count: i64,
        }

        let stuck = sqlx::query_as::<_, Stuck>(
            r#"
            SELECT s.id AS id,
                (SELECT COUNT(*) FROM sync_tasks t
                 WHERE t.series_id = s.id AND t.status = 5) AS failed_count
            FROM series s
            WHERE s.status = 2 AND NOT EXISTS (
                SELECT 1 FROM sync_tasks t
                WHERE t.series_id = s.id AND t.status IN (0, 1, 2, 3)
            )
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to find stuck syncing series: {}",
                e
            )))
        })?;

        let resolved = stuck.len() as u64;
        for series in stuck {
            if series.failed_count > 0 {
                self.set_series_status(
                    series.id,
                    SeriesStatus::Error,
                    Some("Some chapters failed to sync"),
                )
                .await?;
            } else {
                self.set_series_status(series.id, SeriesStatus::Idle, None)
                    .await?;
                self.set_last_synced_at(series.id).await?;
            }
            self.refresh_sync_progress(series.id).await?;
        }

        Ok(resolved)
    }

    /// Per-status task counts
    pub async fn task_status_counts(&self) -> Result<Vec<StatusCount>> {
        let rows = sqlx::query_as::<_, StatusCount>(
            "SELECT status, COUNT(*) AS count FROM sync_tasks GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to count tasks by status: {}",
                e
            )))
        })?;

        Ok(rows)
    }
}
