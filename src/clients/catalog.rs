//! HTTP client for the backend catalog, the system of record for chapters.

use crate::config::ExternalConfig;
use crate::error::Error;
use crate::{Result, clients};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{CatalogBackend, CatalogChapterPage, NewCatalogChapter};

/// HTTP implementation of [`CatalogBackend`]
pub struct HttpCatalogClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    fetch_timeout: Duration,
}

impl HttpCatalogClient {
    /// Build a client from the external configuration
    pub fn new(external: &ExternalConfig) -> Result<Self> {
        if external.catalog_base_url.is_empty() {
            return Err(Error::Config {
                message: "catalog base URL is required".to_string(),
                key: Some("CATALOG_BASE_URL".to_string()),
            });
        }

        Ok(Self {
            http: reqwest::Client::new(),
            base_url: external.catalog_base_url.trim_end_matches('/').to_string(),
            api_key: external.catalog_api_key.clone(),
            fetch_timeout: Duration::from_millis(external.fetch_timeout_ms),
        })
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("x-api-key", key),
            None => builder,
        }
    }
}

#[async_trait]
impl CatalogBackend for HttpCatalogClient {
    async fn list_chapters(
        &self,
        series_external_id: &str,
        page: u32,
        page_size: u32,
    ) -> Result<CatalogChapterPage> {
        let url = format!("{}/series/{}/chapters", self.base_url, series_external_id);

        clients::with_deadline("catalog", self.fetch_timeout, async {
            let response = self
                .authorized(self.http.get(&url).query(&[
                    ("page", page.to_string()),
                    ("page_size", page_size.min(100).to_string()),
                    ("sort_order", "asc".to_string()),
                ]))
                .send()
                .await
                .map_err(Error::Network)?;

            let status = response.status();
            if !status.is_success() {
                return Err(Error::Catalog(format!("catalog returned {}", status)));
            }

            let body: ListChaptersResponse = response
                .json()
                .await
                .map_err(|e| Error::Catalog(format!("invalid catalog response: {}", e)))?;

            if body.retcode != 0 {
                return Err(Error::Catalog(format!(
                    "catalog retcode {} listing chapters",
                    body.retcode
                )));
            }

            Ok(CatalogChapterPage {
                chapter_numbers: body.data.into_iter().map(|c| c.chapter_number).collect(),
                page: body.meta.page,
                total_pages: body.meta.total_page,
                total_records: body.meta.total_record,
            })
        })
        .await
    }

    async fn create_chapters(
        &self,
        series_external_id: &str,
        chapters: &[NewCatalogChapter],
    ) -> Result<()> {
        let url = format!("{}/series/{}/chapters", self.base_url, series_external_id);
        let payload = CreateChaptersPayload { chapters };

        clients::with_deadline("catalog", self.fetch_timeout, async {
            let response = self
                .authorized(self.http.post(&url).json(&payload))
                .send()
                .await
                .map_err(Error::Network)?;

            let status = response.status();
            if !status.is_success() {
                return Err(Error::Catalog(format!("catalog returned {}", status)));
            }

            let body: CreateChaptersResponse = response
                .json()
                .await
                .map_err(|e| Error::Catalog(format!("invalid catalog response: {}", e)))?;

            if body.retcode != 0 {
                return Err(Error::Catalog(format!(
                    "catalog retcode {} creating chapters: {}",
                    body.retcode,
                    body.message.unwrap_or_default()
                )));
            }

            Ok(())
        })
        .await
    }
}

#[derive(Debug, Deserialize)]
struct ListChaptersResponse {
    retcode: i32,
    #[serde(default)]
    data: Vec<CatalogChapterItem>,
    meta: ListChaptersMeta,
}

#[derive(Debug, Deserialize)]
struct CatalogChapterItem {
    chapter_number: f64,
}

#[derive(Debug, Deserialize)]
struct ListChaptersMeta {
    page: u32,
    #[serde(default)]
    total_page: u32,
    #[serde(default)]
    total_record: u64,
}

#[derive(Debug, Serialize)]
struct CreateChaptersPayload<'a> {
    chapters: &'a [NewCatalogChapter],
}

#[derive(Debug, Deserialize)]
struct CreateChaptersResponse {
    retcode: i32,
    #[serde(default)]
    message: Option<String>,
}
