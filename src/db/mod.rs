//! Database layer for manga-mirror
//!
//! Handles SQLite persistence for series, sources, and sync tasks. The
//! registry is the single writer of durable state; every component mutates
//! it only through the operations defined here.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] — Database lifecycle, schema migrations
//! - [`series`] — Series CRUD, status transitions, scan bookkeeping
//! - [`sources`] — Source replacement, normalization, domain migration
//! - [`tasks`] — Sync task upserts, pipeline status transitions, sweeps
//! - [`recovery`] — Boot-time stale-task recovery

use crate::types::{SeriesId, SourceId, TaskId};
use sqlx::{FromRow, sqlite::SqlitePool};

mod migrations;
mod recovery;
mod series;
mod sources;
mod tasks;

pub use recovery::RecoveryReport;
pub use sources::{DomainMigration, MigratedUrl, NormalizedSource, normalize_source_urls};

/// Database handle wrapping the SQLite connection pool
#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

/// New series to be registered
#[derive(Debug, Clone)]
pub struct NewSeries {
    /// Stable external catalog identifier (unique)
    pub external_id: String,
    /// Human title
    pub title: String,
    /// Source listing URLs, primary first (1-3 entries)
    pub source_urls: Vec<String>,
    /// Minutes between scheduled scans
    pub check_interval_minutes: u32,
    /// Scheduling priority (higher scanned first)
    pub priority: i32,
    /// Whether the scanner picks this series up automatically
    pub auto_sync_enabled: bool,
}

/// Partial update applied to an existing series
#[derive(Debug, Clone, Default)]
pub struct SeriesPatch {
    /// New title
    pub title: Option<String>,
    /// New source URL set (replaces all sources)
    pub source_urls: Option<Vec<String>>,
    /// New check interval in minutes
    pub check_interval_minutes: Option<u32>,
    /// New scheduling priority
    pub priority: Option<i32>,
    /// Enable or disable automatic scanning
    pub auto_sync_enabled: Option<bool>,
}

/// Series listing filter
#[derive(Debug, Clone, Default)]
pub struct SeriesFilter {
    /// Only series with this status code
    pub status: Option<i32>,
    /// Case-insensitive title substring
    pub title: Option<String>,
    /// 1-based page number
    pub page: u32,
    /// Page size, clamped to 1..=100
    pub page_size: u32,
}

/// Series record from database
#[derive(Debug, Clone, FromRow)]
pub struct Series {
    /// Unique database ID
    pub id: SeriesId,
    /// Stable external catalog identifier
    pub external_id: String,
    /// Human title
    pub title: String,
    /// Primary source listing URL (denormalized from the priority-1 source)
    pub manga_url: Option<String>,
    /// Primary source hostname
    pub source_domain: Option<String>,
    /// Primary source slug (last non-empty path segment)
    pub manga_slug: Option<String>,
    /// Whether the scanner picks this series up automatically
    pub auto_sync_enabled: bool,
    /// Minutes between scheduled scans
    pub check_interval_minutes: i64,
    /// Scheduling priority (higher scanned first)
    pub priority: i64,
    /// Chapter count on the authoritative source at last scan
    pub source_chapter_count: i64,
    /// Highest chapter number on the authoritative source at last scan
    pub source_last_chapter: Option<f64>,
    /// Chapter count in the backend catalog at last scan
    pub backend_chapter_count: i64,
    /// Highest chapter number in the backend catalog
    pub backend_last_chapter: Option<f64>,
    /// Aggregate status code (see [`crate::types::SeriesStatus`])
    pub status: i32,
    /// Tasks created for the active sync batch
    pub sync_progress_total: i64,
    /// Tasks completed or skipped in the active batch
    pub sync_progress_completed: i64,
    /// Tasks failed in the active batch
    pub sync_progress_failed: i64,
    /// Unix timestamp of the last scan
    pub last_scanned_at: Option<i64>,
    /// Unix timestamp of the last fully drained sync
    pub last_synced_at: Option<i64>,
    /// Unix timestamp of the next scheduled scan
    pub next_scan_at: Option<i64>,
    /// Unix timestamp when the series was registered
    pub created_at: i64,
    /// Unix timestamp of the last mutation
    pub updated_at: i64,
    /// Message of the most recent failure
    pub last_error: Option<String>,
    /// Unix timestamp of the most recent failure
    pub last_error_at: Option<i64>,
    /// Failures since the last successful scan
    pub consecutive_failures: i64,
}

impl Series {
    /// Typed status accessor
    pub fn series_status(&self) -> crate::types::SeriesStatus {
        crate::types::SeriesStatus::from_i32(self.status)
    }
}

/// Series with its sources attached
#[derive(Debug, Clone)]
pub struct SeriesWithSources {
    /// The series row
    pub series: Series,
    /// Sources ordered by priority ascending
    pub sources: Vec<Source>,
}

/// Source record from database
#[derive(Debug, Clone, FromRow)]
pub struct Source {
    /// Unique database ID
    pub id: SourceId,
    /// Owning series
    pub series_id: SeriesId,
    /// Source listing URL
    pub source_url: String,
    /// Source hostname
    pub source_domain: String,
    /// Last non-empty path segment of the source URL
    pub manga_slug: String,
    /// 1-based priority (primary = 1)
    pub priority: i64,
    /// Whether this source participates in scans
    pub is_enabled: bool,
    /// Chapter count seen on the last scan of this source
    pub last_chapter_count: Option<i64>,
    /// Highest chapter number seen on the last scan of this source
    pub last_chapter_number: Option<f64>,
    /// Status code of the last scan (see [`crate::types::SourceScanStatus`])
    pub last_scan_status: Option<i32>,
    /// Error message of the last failed scan
    pub last_scan_error: Option<String>,
    /// Unix timestamp of the last scan of this source
    pub last_scan_at: Option<i64>,
    /// Unix timestamp when the source was attached
    pub created_at: i64,
}

/// New sync task to be inserted
#[derive(Debug, Clone)]
pub struct NewTask {
    /// Chapter URL as it appears on the source
    pub chapter_url: String,
    /// Canonical chapter number (may be fractional)
    pub chapter_number: f64,
    /// Ordering key within the series (FIFO in source order)
    pub weight: i64,
    /// Source the chapter was discovered on
    pub source_id: Option<SourceId>,
}

/// Sync task record from database
#[derive(Debug, Clone, FromRow)]
pub struct SyncTask {
    /// Unique database ID
    pub id: TaskId,
    /// Owning series
    pub series_id: SeriesId,
    /// Source the chapter was discovered on
    pub source_id: Option<SourceId>,
    /// Chapter URL as it appears on the source
    pub chapter_url: String,
    /// Canonical chapter number (may be fractional)
    pub chapter_number: f64,
    /// Ordering key within the series
    pub weight: i64,
    /// Pipeline status code (see [`crate::types::TaskStatus`])
    pub status: i32,
    /// Staged archive URL, set after the stage step succeeds
    pub zip_url: Option<String>,
    /// Message of the most recent failure
    pub error: Option<String>,
    /// Times this task has transitioned to failed
    pub retry_count: i64,
    /// Unix timestamp when the task was created
    pub created_at: i64,
    /// Unix timestamp of the last mutation
    pub updated_at: i64,
}

impl SyncTask {
    /// Typed status accessor
    pub fn task_status(&self) -> crate::types::TaskStatus {
        crate::types::TaskStatus::from_i32(self.status)
    }
}

/// Per-status row counts used by the stats endpoint
#[derive(Debug, Clone, FromRow)]
pub struct StatusCount {
    /// Raw status code
    pub status: i32,
    /// Number of rows carrying it
    pub count: i64,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
