//! Route handlers and their wire DTOs.

pub mod series;
pub mod system;

pub use series::{
    bulk_create_series, create_series, delete_series, force_scan, get_series, list_series,
    retry_failed, update_domain, update_series,
};
pub use system::{event_stream, health_check, mint_event_token, openapi_spec, stats};

use crate::db::{Series, Source, SyncTask};
use crate::types::{SeriesStatus, SourceScanStatus, TaskStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

fn timestamp(unix: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(unix, 0).unwrap_or_else(Utc::now)
}

fn opt_timestamp(unix: Option<i64>) -> Option<DateTime<Utc>> {
    unix.and_then(|ts| DateTime::from_timestamp(ts, 0))
}

/// Sync progress counters for the active batch
#[derive(Debug, Serialize, ToSchema)]
pub struct SyncProgressDto {
    /// Tasks in the batch
    pub total: i64,
    /// Tasks completed or skipped
    pub completed: i64,
    /// Tasks failed
    pub failed: i64,
}

/// Series representation returned by the API
#[derive(Debug, Serialize, ToSchema)]
pub struct SeriesDto {
    /// Internal identifier
    pub id: i64,
    /// External catalog identifier
    pub external_id: String,
    /// Human title
    pub title: String,
    /// Primary source listing URL
    pub manga_url: Option<String>,
    /// Primary source hostname
    pub source_domain: Option<String>,
    /// Primary source slug
    pub manga_slug: Option<String>,
    /// Whether the scanner picks this series up automatically
    pub auto_sync_enabled: bool,
    /// Minutes between scheduled scans
    pub check_interval_minutes: i64,
    /// Scheduling priority
    pub priority: i64,
    /// Chapter count on the authoritative source
    pub source_chapter_count: i64,
    /// Highest chapter number on the authoritative source
    pub source_last_chapter: Option<f64>,
    /// Chapter count in the backend catalog
    pub backend_chapter_count: i64,
    /// Highest chapter number in the backend catalog
    pub backend_last_chapter: Option<f64>,
    /// Aggregate sync status
    pub status: SeriesStatus,
    /// Active batch progress
    pub sync_progress: SyncProgressDto,
    /// Last scan time
    pub last_scanned_at: Option<DateTime<Utc>>,
    /// Last fully drained sync
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Next scheduled scan
    pub next_scan_at: Option<DateTime<Utc>>,
    /// Registration time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
    /// Most recent failure message
    pub last_error: Option<String>,
    /// Most recent failure time
    pub last_error_at: Option<DateTime<Utc>>,
    /// Failures since the last successful scan
    pub consecutive_failures: i64,
    /// Attached sources, priority ascending (detail responses only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<SourceDto>>,
}

impl SeriesDto {
    /// Build the listing representation (no sources attached)
    pub fn from_series(series: &Series) -> Self {
        Self {
            id: series.id.get(),
            external_id: series.external_id.clone(),
            title: series.title.clone(),
            manga_url: series.manga_url.clone(),
            source_domain: series.source_domain.clone(),
            manga_slug: series.manga_slug.clone(),
            auto_sync_enabled: series.auto_sync_enabled,
            check_interval_minutes: series.check_interval_minutes,
            priority: series.priority,
            source_chapter_count: series.source_chapter_count,
            source_last_chapter: series.source_last_chapter,
            backend_chapter_count: series.backend_chapter_count,
            backend_last_chapter: series.backend_last_chapter,
            status: series.series_status(),
            sync_progress: SyncProgressDto {
                total: series.sync_progress_total,
                completed: series.sync_progress_completed,
                failed: series.sync_progress_failed,
            },
            last_scanned_at: opt_timestamp(series.last_scanned_at),
            last_synced_at: opt_timestamp(series.last_synced_at),
            next_scan_at: opt_timestamp(series.next_scan_at),
            created_at: timestamp(series.created_at),
            updated_at: timestamp(series.updated_at),
            last_error: series.last_error.clone(),
            last_error_at: opt_timestamp(series.last_error_at),
            consecutive_failures: series.consecutive_failures,
            sources: None,
        }
    }

    /// Build the detail representation with sources attached
    pub fn with_sources(series: &Series, sources: &[Source]) -> Self {
        let mut dto = Self::from_series(series);
        dto.sources = Some(sources.iter().map(SourceDto::from_source).collect());
        dto
    }
}

/// Source representation returned by the API
#[derive(Debug, Serialize, ToSchema)]
pub struct SourceDto {
    /// Internal identifier
    pub id: i64,
    /// Source listing URL
    pub source_url: String,
    /// Source hostname
    pub source_domain: String,
    /// Slug derived from the URL path
    pub manga_slug: String,
    /// 1-based priority (primary = 1)
    pub priority: i64,
    /// Whether this source participates in scans
    pub is_enabled: bool,
    /// Chapter count seen on the last scan
    pub last_chapter_count: Option<i64>,
    /// Highest chapter number seen on the last scan
    pub last_chapter_number: Option<f64>,
    /// Outcome of the last scan
    pub last_scan_status: Option<SourceScanStatus>,
    /// Error message of the last failed scan
    pub last_scan_error: Option<String>,
    /// Time of the last scan
    pub last_scan_at: Option<DateTime<Utc>>,
}

impl SourceDto {
    fn from_source(source: &Source) -> Self {
        Self {
            id: source.id.get(),
            source_url: source.source_url.clone(),
            source_domain: source.source_domain.clone(),
            manga_slug: source.manga_slug.clone(),
            priority: source.priority,
            is_enabled: source.is_enabled,
            last_chapter_count: source.last_chapter_count,
            last_chapter_number: source.last_chapter_number,
            last_scan_status: source.last_scan_status.map(SourceScanStatus::from_i32),
            last_scan_error: source.last_scan_error.clone(),
            last_scan_at: opt_timestamp(source.last_scan_at),
        }
    }
}

/// Sync task representation returned by the API
#[derive(Debug, Serialize, ToSchema)]
pub struct TaskDto {
    /// Internal identifier
    pub id: i64,
    /// Chapter URL on the source
    pub chapter_url: String,
    /// Canonical chapter number
    pub chapter_number: f64,
    /// Ordering key within the series
    pub weight: i64,
    /// Pipeline status
    pub status: TaskStatus,
    /// Staged archive URL, when staging succeeded
    pub zip_url: Option<String>,
    /// Most recent failure message
    pub error: Option<String>,
    /// Times this task has failed
    pub retry_count: i64,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl TaskDto {
    /// Build from a task row
    pub fn from_task(task: &SyncTask) -> Self {
        Self {
            id: task.id.get(),
            chapter_url: task.chapter_url.clone(),
            chapter_number: task.chapter_number,
            weight: task.weight,
            status: task.task_status(),
            zip_url: task.zip_url.clone(),
            error: task.error.clone(),
            retry_count: task.retry_count,
            created_at: timestamp(task.created_at),
            updated_at: timestamp(task.updated_at),
        }
    }
}
