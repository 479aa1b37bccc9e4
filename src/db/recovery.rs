//! Boot-time recovery of tasks and series interrupted by a restart.

use crate::error::DatabaseError;
use crate::types::{SeriesId, SeriesStatus};
use crate::{Error, Result};

use super::Database;

/// What the recovery pass changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Tasks reset out of transient statuses (scraping/uploading)
    pub tasks_reset: u64,
    /// Series whose status was recomputed
    pub series_recovered: u64,
}

impl Database {
    /// Repair state left behind by an interrupted process.
    ///
    /// Runs exactly once at boot, before any ticker starts:
    ///
    /// 1. Tasks caught mid-pipeline are reset: `scraped` when a staged
    ///    archive exists (resume at the upload step), `pending` otherwise
    ///    (restart from image enumeration).
    /// 2. Series stuck in `scanning`/`syncing` get their status recomputed
    ///    from their tasks: `syncing` while work remains, `error` when only
    ///    failures remain, `idle` otherwise.
    pub async fn recover_stale_tasks(&self) -> Result<RecoveryReport> {
        let now = chrono::Utc::now().timestamp();
        let mut report = RecoveryReport::default();

        // Step 1: no task may survive a restart in a transient status.
        let resumed = sqlx::query(
            r#"
            UPDATE sync_tasks SET status = 2, updated_at = ?
            WHERE status IN (1, 3) AND zip_url IS NOT NULL
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to reset resumable tasks: {}",
                e
            )))
        })?;

        let restarted = sqlx::query(
            r#"
            UPDATE sync_tasks SET status = 0, updated_at = ?
            WHERE status IN (1, 3) AND zip_url IS NULL
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to reset stale tasks: {}",
                e
            )))
        })?;

        report.tasks_reset = resumed.rows_affected() + restarted.rows_affected();

        // Step 2: recompute the status of every series caught mid-flight.
        #[derive(sqlx::FromRow)]
        struct Interrupted {
            id: SeriesId,
            last_synced_at: Option<i64>,
            active_count: i64,
            failed_count: i64,
        }

        let interrupted = sqlx::query_as::<_, Interrupted>(
            r#"
            SELECT s.id AS id,
                s.last_synced_at AS last_synced_at,
                (SELECT COUNT(*) FROM sync_tasks t
                 WHERE t.series_id = s.id AND t.status IN (0, 1, 2, 3)) AS active_count,
                (SELECT COUNT(*) FROM sync_tasks t
                 WHERE t.series_id = s.id AND t.status = 5) AS failed_count
            FROM series s
            WHERE s.status IN (1, 2)
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to find interrupted series: {}",
                e
            )))
        })?;

        for series in interrupted {
            if series.active_count > 0 {
                self.set_series_status(series.id, SeriesStatus::Syncing, None)
                    .await?;
            } else if series.failed_count > 0 {
                self.set_series_status(
                    series.id,
                    SeriesStatus::Error,
                    Some("Some chapters failed to sync"),
                )
                .await?;
            } else {
                self.set_series_status(series.id, SeriesStatus::Idle, None)
                    .await?;
                if series.last_synced_at.is_none() {
                    self.set_last_synced_at(series.id).await?;
                }
            }
            self.refresh_sync_progress(series.id).await?;
            report.series_recovered += 1;
        }

        if report.tasks_reset > 0 || report.series_recovered > 0 {
            tracing::info!(
                tasks_reset = report.tasks_reset,
                series_recovered = report.series_recovered,
                "Recovered stale sync state from previous run"
            );
        }

        Ok(report)
    }
}
