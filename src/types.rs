//! Core types for manga-mirror

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Unique identifier for a series
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct SeriesId(pub i64);

impl SeriesId {
    /// Create a new SeriesId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for SeriesId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<SeriesId> for i64 {
    fn from(id: SeriesId) -> Self {
        id.0
    }
}

impl std::fmt::Display for SeriesId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SeriesId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

// Implement sqlx Type, Encode, and Decode for database operations
impl sqlx::Type<sqlx::Sqlite> for SeriesId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for SeriesId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for SeriesId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// Unique identifier for a source attached to a series
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct SourceId(pub i64);

impl SourceId {
    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for SourceId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl sqlx::Type<sqlx::Sqlite> for SourceId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for SourceId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for SourceId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// Unique identifier for a sync task
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct TaskId(pub i64);

impl TaskId {
    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for TaskId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl sqlx::Type<sqlx::Sqlite> for TaskId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for TaskId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for TaskId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// Aggregate sync status of a series
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SeriesStatus {
    /// Nothing in flight; waiting for the next scheduled scan
    Idle,
    /// A scan is in progress
    Scanning,
    /// Missing chapters have been found and tasks are being processed
    Syncing,
    /// The last scan or sync batch failed
    Error,
}

impl SeriesStatus {
    /// Convert integer status code to SeriesStatus
    pub fn from_i32(status: i32) -> Self {
        match status {
            0 => SeriesStatus::Idle,
            1 => SeriesStatus::Scanning,
            2 => SeriesStatus::Syncing,
            3 => SeriesStatus::Error,
            _ => SeriesStatus::Error,
        }
    }

    /// Convert SeriesStatus to integer status code
    pub fn to_i32(&self) -> i32 {
        match self {
            SeriesStatus::Idle => 0,
            SeriesStatus::Scanning => 1,
            SeriesStatus::Syncing => 2,
            SeriesStatus::Error => 3,
        }
    }
}

impl std::str::FromStr for SeriesStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(SeriesStatus::Idle),
            "scanning" => Ok(SeriesStatus::Scanning),
            "syncing" => Ok(SeriesStatus::Syncing),
            "error" => Ok(SeriesStatus::Error),
            other => Err(format!("unknown series status: {}", other)),
        }
    }
}

/// Status of a sync task moving one chapter through the pipeline
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Waiting to be picked up by the processor
    Pending,
    /// Enumerating chapter images on the source
    Scraping,
    /// Staged archive available (`zip_url` set)
    Scraped,
    /// Persisting the staged archive to durable storage
    Uploading,
    /// Registered in the backend catalog
    Completed,
    /// Pipeline step failed; awaiting retry or rediscovery
    Failed,
    /// Deliberately not synced
    Skipped,
}

impl TaskStatus {
    /// Convert integer status code to TaskStatus
    pub fn from_i32(status: i32) -> Self {
        match status {
            0 => TaskStatus::Pending,
            1 => TaskStatus::Scraping,
            2 => TaskStatus::Scraped,
            3 => TaskStatus::Uploading,
            4 => TaskStatus::Completed,
            5 => TaskStatus::Failed,
            6 => TaskStatus::Skipped,
            _ => TaskStatus::Failed,
        }
    }

    /// Convert TaskStatus to integer status code
    pub fn to_i32(&self) -> i32 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::Scraping => 1,
            TaskStatus::Scraped => 2,
            TaskStatus::Uploading => 3,
            TaskStatus::Completed => 4,
            TaskStatus::Failed => 5,
            TaskStatus::Skipped => 6,
        }
    }

    /// Whether the task still needs processor attention
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            TaskStatus::Pending
                | TaskStatus::Scraping
                | TaskStatus::Scraped
                | TaskStatus::Uploading
        )
    }

    /// Whether the task has reached a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Skipped
        )
    }
}

/// Outcome of the most recent scan of a single source
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SourceScanStatus {
    /// Listing fetched and non-empty
    Success,
    /// Listing fetched but contained no chapters
    Empty,
    /// The scraper call exceeded its deadline
    Timeout,
    /// Any other scraper failure
    Error,
}

impl SourceScanStatus {
    /// Convert integer status code to SourceScanStatus
    pub fn from_i32(status: i32) -> Self {
        match status {
            0 => SourceScanStatus::Success,
            1 => SourceScanStatus::Empty,
            2 => SourceScanStatus::Timeout,
            3 => SourceScanStatus::Error,
            _ => SourceScanStatus::Error,
        }
    }

    /// Convert SourceScanStatus to integer status code
    pub fn to_i32(&self) -> i32 {
        match self {
            SourceScanStatus::Success => 0,
            SourceScanStatus::Empty => 1,
            SourceScanStatus::Timeout => 2,
            SourceScanStatus::Error => 3,
        }
    }
}

/// Version stamped into every published event envelope
pub const EVENT_VERSION: u32 = 1;

/// Event emitted over the series lifecycle and sync pipeline
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A series was registered
    SeriesCreated {
        /// External catalog identifier
        external_id: String,
        /// Human title
        title: String,
    },

    /// A series was updated through the API
    SeriesUpdated {
        /// External catalog identifier
        external_id: String,
    },

    /// A series was deleted (sources and tasks cascade)
    SeriesDeleted {
        /// External catalog identifier
        external_id: String,
    },

    /// A scan started for a series
    ScanStarted {
        /// External catalog identifier
        external_id: String,
    },

    /// A scan finished, successfully or not
    ScanFinished {
        /// External catalog identifier
        external_id: String,
        /// Resulting series status
        status: SeriesStatus,
        /// Number of missing chapters discovered (0 on failure)
        missing: u64,
        /// Error message when the scan failed
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// One chapter finished its trip through the pipeline
    SyncProgress {
        /// External catalog identifier
        external_id: String,
        /// Chapter number the task covered
        chapter_number: f64,
        /// Terminal task status (completed or failed)
        status: TaskStatus,
        /// Error message when the task failed
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl Event {
    /// Wire name of the event type
    pub fn kind(&self) -> &'static str {
        match self {
            Event::SeriesCreated { .. } => "manga.created",
            Event::SeriesUpdated { .. } => "manga.updated",
            Event::SeriesDeleted { .. } => "manga.deleted",
            Event::ScanStarted { .. } => "manga.scan.started",
            Event::ScanFinished { .. } => "manga.scan.finished",
            Event::SyncProgress { .. } => "manga.sync.progress",
        }
    }

    /// External catalog id of the series the event concerns
    pub fn series_external_id(&self) -> &str {
        match self {
            Event::SeriesCreated { external_id, .. }
            | Event::SeriesUpdated { external_id }
            | Event::SeriesDeleted { external_id }
            | Event::ScanStarted { external_id }
            | Event::ScanFinished { external_id, .. }
            | Event::SyncProgress { external_id, .. } => external_id,
        }
    }
}

/// Published event envelope carried on every channel
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct EventEnvelope {
    /// Wire name of the event type (e.g. "manga.sync.progress")
    #[serde(rename = "type")]
    pub kind: String,
    /// External catalog id of the series the event concerns
    pub series_external_id: String,
    /// Event payload
    pub data: serde_json::Value,
    /// Envelope schema version
    pub event_version: u32,
    /// When the event was emitted
    pub timestamp: DateTime<Utc>,
}

impl EventEnvelope {
    /// Wrap an event in an envelope stamped with the current time
    pub fn new(event: &Event) -> Self {
        Self {
            kind: event.kind().to_string(),
            series_external_id: event.series_external_id().to_string(),
            data: serde_json::to_value(event).unwrap_or(serde_json::Value::Null),
            event_version: EVENT_VERSION,
            timestamp: Utc::now(),
        }
    }
}
