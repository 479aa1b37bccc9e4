//! HTTP client for the source scraper service.
//!
//! The scraper fronts the upstream websites: it lists chapters for a source
//! URL (paginated, with a cache that may still be warming up), enumerates the
//! images of a chapter, and stages a chapter into an intermediate archive.

use crate::config::ExternalConfig;
use crate::error::Error;
use crate::retry::{RetryPolicy, retry_with_policy};
use crate::{Result, clients};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{
    ChapterImage, HostPool, SourceChapter, SourceMetadata, SourceScraper, StageRequest,
    StagedChapter,
};

/// Listing pages fetched per request
const LISTING_PAGE_SIZE: u32 = 100;

/// Upper bound on listing pages; a source exceeding this is misbehaving
const MAX_LISTING_PAGES: u32 = 500;

/// How often the warm-up poll retries before giving up
const NOT_READY_ATTEMPTS: u32 = 20;

/// HTTP implementation of [`SourceScraper`] over a pool of scraper hosts
pub struct HttpScraperClient {
    http: reqwest::Client,
    hosts: HostPool,
    fetch_timeout: Duration,
    scrape_timeout: Duration,
    stage_timeout: Duration,
    not_ready_policy: RetryPolicy,
}

impl HttpScraperClient {
    /// Build a client from the external configuration.
    ///
    /// Requires at least one scraper base URL.
    pub fn new(external: &ExternalConfig) -> Result<Self> {
        if external.scraper_base_urls.is_empty() {
            return Err(Error::Config {
                message: "at least one scraper base URL is required".to_string(),
                key: Some("SCRAPER_BASE_URL".to_string()),
            });
        }

        Ok(Self {
            http: reqwest::Client::new(),
            hosts: HostPool::new(external.scraper_base_urls.clone()),
            fetch_timeout: Duration::from_millis(external.fetch_timeout_ms),
            scrape_timeout: Duration::from_millis(external.scrape_timeout_ms),
            stage_timeout: Duration::from_millis(external.upload_timeout_ms),
            not_ready_policy: RetryPolicy::fixed(NOT_READY_ATTEMPTS, Duration::from_secs(3)),
        })
    }

    /// Override the warm-up polling delay (tests poll fast)
    pub fn with_not_ready_delay(mut self, delay: Duration) -> Self {
        self.not_ready_policy = RetryPolicy::fixed(NOT_READY_ATTEMPTS, delay);
        self
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let (host_index, base) = self.hosts.acquire();
        let url = format!("{}{}", base, path);

        let outcome = async {
            let response = self
                .http
                .get(&url)
                .query(query)
                .send()
                .await
                .map_err(Error::Network)?;

            let status = response.status();
            if !status.is_success() {
                return Err(Error::Scraper(format!(
                    "scraper returned {} for {}",
                    status, path
                )));
            }

            response
                .json::<T>()
                .await
                .map_err(|e| Error::Scraper(format!("invalid scraper response: {}", e)))
        }
        .await;

        match &outcome {
            Ok(_) => self.hosts.report_success(host_index),
            Err(_) => self.hosts.report_failure(host_index),
        }
        outcome
    }

    async fn fetch_listing_page(&self, source_url: &str, page: u32) -> Result<ListingResponse> {
        let listing: ListingResponse = clients::with_deadline(
            "scraper",
            self.fetch_timeout,
            self.get_json(
                "/api/chapters",
                &[
                    ("url", source_url.to_string()),
                    ("page", page.to_string()),
                    ("limit", LISTING_PAGE_SIZE.to_string()),
                ],
            ),
        )
        .await?;

        // The scraper cache may still be warming up; surface that as a
        // retryable condition for the fixed-delay poll.
        if matches!(listing.status.as_deref(), Some("loading") | Some("not_cached")) {
            return Err(Error::Scraper(format!(
                "chapter listing not ready yet ({})",
                listing.status.as_deref().unwrap_or("unknown")
            )));
        }

        Ok(listing)
    }
}

#[async_trait]
impl SourceScraper for HttpScraperClient {
    async fn list_chapters(&self, source_url: &str) -> Result<Vec<SourceChapter>> {
        let mut chapters = Vec::new();

        for page in 1..=MAX_LISTING_PAGES {
            let listing = retry_with_policy(&self.not_ready_policy, || {
                self.fetch_listing_page(source_url, page)
            })
            .await?;

            chapters.extend(listing.data);
            if !listing.has_more {
                return Ok(chapters);
            }
        }

        Err(Error::Scraper(format!(
            "chapter listing for {} exceeded {} pages",
            source_url, MAX_LISTING_PAGES
        )))
    }

    async fn source_metadata(&self, source_url: &str) -> Result<SourceMetadata> {
        let meta: MetadataResponse = clients::with_deadline(
            "scraper",
            self.fetch_timeout,
            self.get_json("/api/metadata", &[("url", source_url.to_string())]),
        )
        .await?;

        Ok(SourceMetadata {
            last_chapter: meta.last_chapter.and_then(|c| c.number),
            total: meta.total,
        })
    }

    async fn chapter_images(&self, chapter_url: &str) -> Result<Vec<ChapterImage>> {
        let images: ImagesResponse = clients::with_deadline(
            "scraper",
            self.scrape_timeout,
            self.get_json("/api/chapter", &[("url", chapter_url.to_string())]),
        )
        .await?;

        Ok(images.data)
    }

    async fn stage_chapter(&self, request: &StageRequest) -> Result<StagedChapter> {
        let (host_index, base) = self.hosts.acquire();
        let url = format!("{}/api/stage", base);
        let payload = StagePayload {
            image_data_array: &request.images,
            series_external_id: &request.series_external_id,
            chapter_number: &request.chapter_number,
            series_title: &request.series_title,
            chapter_url: &request.chapter_url,
        };

        let outcome = clients::with_deadline("stager", self.stage_timeout, async {
            let response = self
                .http
                .post(&url)
                .json(&payload)
                .send()
                .await
                .map_err(Error::Network)?;

            let status = response.status();
            if !status.is_success() {
                return Err(Error::Stager(format!("stager returned {}", status)));
            }

            let staged: StageResponse = response
                .json()
                .await
                .map_err(|e| Error::Stager(format!("invalid stager response: {}", e)))?;

            if !staged.success {
                return Err(Error::Stager(
                    staged
                        .error
                        .unwrap_or_else(|| "stager reported failure".to_string()),
                ));
            }
            let data = staged
                .data
                .ok_or_else(|| Error::Stager("stager response missing data".to_string()))?;

            Ok(StagedChapter {
                zip_url: data.public_url,
                file_name: data.file_name,
                total_images: data.total_images,
            })
        })
        .await;

        match &outcome {
            Ok(_) => self.hosts.report_success(host_index),
            Err(_) => self.hosts.report_failure(host_index),
        }
        outcome
    }
}

#[derive(Debug, Deserialize)]
struct ListingResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    data: Vec<SourceChapter>,
    #[serde(default, rename = "hasMore")]
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct MetadataResponse {
    #[serde(default, rename = "lastChapter")]
    last_chapter: Option<MetadataChapter>,
    #[serde(default)]
    total: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct MetadataChapter {
    #[serde(default)]
    number: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ChapterImage>,
}

#[derive(Debug, Serialize)]
struct StagePayload<'a> {
    #[serde(rename = "imageDataArray")]
    image_data_array: &'a [ChapterImage],
    series_external_id: &'a str,
    #[serde(rename = "chapterNumber")]
    chapter_number: &'a str,
    #[serde(rename = "seriesTitle")]
    series_title: &'a str,
    #[serde(rename = "chapterUrl")]
    chapter_url: &'a str,
}

#[derive(Debug, Deserialize)]
struct StageResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<StageData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StageData {
    #[serde(rename = "publicUrl")]
    public_url: String,
    #[serde(rename = "fileName")]
    file_name: String,
    #[serde(rename = "totalImages")]
    total_images: i64,
}
