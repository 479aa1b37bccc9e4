//! Contract-bearing clients for the external collaborators.
//!
//! The core orchestrates four black boxes: the source scraper (chapter
//! discovery + image enumeration + staging), the uploader (durable storage),
//! and the catalog backend (system of record). Each contract is a trait so
//! the scanner and processor stay testable without HTTP; the `Http*`
//! implementations in the submodules are the production wiring.

use crate::Result;
use crate::error::Error;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

mod catalog;
mod host_pool;
mod scraper;
mod uploader;

pub use catalog::HttpCatalogClient;
pub use host_pool::HostPool;
pub use scraper::HttpScraperClient;
pub use uploader::HttpUploaderClient;

/// One chapter item discovered on a source listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceChapter {
    /// Chapter title as shown on the source (may contain noise)
    pub title: String,
    /// Chapter page URL
    pub url: String,
    /// Publication date string, when the source exposes one
    #[serde(default)]
    pub date: Option<String>,
    /// Source-provided ordering weight, when present
    #[serde(default)]
    pub weight: Option<i64>,
}

/// Lightweight source metadata used to skip redundant full listings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceMetadata {
    /// Number of the newest chapter the source reports
    pub last_chapter: Option<f64>,
    /// Total chapter count the source reports
    pub total: Option<i64>,
}

/// One image inside a chapter, in reading order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterImage {
    /// 0-based position within the chapter
    pub index: i64,
    /// Direct download URL
    pub download_url: String,
}

/// Request to stage one chapter into an intermediate archive
#[derive(Debug, Clone)]
pub struct StageRequest {
    /// Images to download and package, in reading order
    pub images: Vec<ChapterImage>,
    /// External catalog id of the owning series
    pub series_external_id: String,
    /// Chapter number rendered as a string (fractional-safe)
    pub chapter_number: String,
    /// Series title, used for archive naming
    pub series_title: String,
    /// Chapter URL, passed along as an HTTP Referer hint
    pub chapter_url: String,
}

/// A successfully staged chapter archive
#[derive(Debug, Clone)]
pub struct StagedChapter {
    /// Public URL of the staged archive; stored on the task for resume
    pub zip_url: String,
    /// Archive file name
    pub file_name: String,
    /// Number of images packaged
    pub total_images: i64,
}

/// Request to persist a staged archive into durable storage
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Staged archive URL
    pub zip_url: String,
    /// External catalog id of the owning series
    pub series_external_id: String,
    /// Numeric chapter number (idempotence key together with the series)
    pub chapter_number: f64,
}

/// Result of a durable upload
#[derive(Debug, Clone)]
pub struct UploadedChapter {
    /// Stable chapter identifier assigned by the uploader
    pub chapter_id: String,
    /// Chapter number echoed back as a string
    pub chapter_number: String,
    /// Image manifest of the stored chapter
    pub images: Vec<String>,
    /// Storage path of the stored chapter
    pub path: String,
}

/// One page of chapter numbers from the backend catalog
#[derive(Debug, Clone)]
pub struct CatalogChapterPage {
    /// Chapter numbers on this page
    pub chapter_numbers: Vec<f64>,
    /// 1-based page number
    pub page: u32,
    /// Total pages for the query
    pub total_pages: u32,
    /// Total chapter count for the series
    pub total_records: u64,
}

/// Chapter registration payload for the catalog
#[derive(Debug, Clone, Serialize)]
pub struct NewCatalogChapter {
    /// Stable chapter identifier from the uploader
    pub chapter_id: String,
    /// Numeric chapter number
    pub chapter_number: f64,
    /// Chapter title (empty for auto-synced chapters)
    pub chapter_title: String,
    /// Image manifest
    pub chapter_images: Vec<String>,
    /// Storage path
    pub path: String,
    /// Thumbnail URL
    pub thumbnail_image_url: String,
}

/// Source scraper contract: discovery, image enumeration, and staging
#[async_trait]
pub trait SourceScraper: Send + Sync {
    /// Fetch the full chapter listing for a source URL, consuming every page
    async fn list_chapters(&self, source_url: &str) -> Result<Vec<SourceChapter>>;

    /// Fetch the lightweight metadata for a source URL
    async fn source_metadata(&self, source_url: &str) -> Result<SourceMetadata>;

    /// Enumerate the images of one chapter, in reading order
    async fn chapter_images(&self, chapter_url: &str) -> Result<Vec<ChapterImage>>;

    /// Download, package, and stage one chapter; returns the archive URL
    async fn stage_chapter(&self, request: &StageRequest) -> Result<StagedChapter>;
}

/// Uploader contract: idempotent per `(series, chapter_number)`
#[async_trait]
pub trait ChapterUploader: Send + Sync {
    /// Persist a staged archive; repeats replace rather than duplicate
    async fn upload_single(&self, request: &UploadRequest) -> Result<UploadedChapter>;
}

/// Catalog backend contract: the system of record for published chapters
#[async_trait]
pub trait CatalogBackend: Send + Sync {
    /// One page of chapter numbers, ascending; callers paginate to exhaustion
    async fn list_chapters(
        &self,
        series_external_id: &str,
        page: u32,
        page_size: u32,
    ) -> Result<CatalogChapterPage>;

    /// Register chapters for a series
    async fn create_chapters(
        &self,
        series_external_id: &str,
        chapters: &[NewCatalogChapter],
    ) -> Result<()>;
}

/// Wrap an external call in a deadline; exceeding it yields a
/// timeout-tagged error indistinguishable from other failures upstream.
pub(crate) async fn with_deadline<T, F>(
    service: &'static str,
    deadline: Duration,
    fut: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::timeout(service)),
    }
}
