//! HTTP client for the durable storage uploader.

use crate::config::ExternalConfig;
use crate::error::Error;
use crate::{Result, clients};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{ChapterUploader, UploadRequest, UploadedChapter};

/// HTTP implementation of [`ChapterUploader`]
pub struct HttpUploaderClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    upload_timeout: Duration,
}

impl HttpUploaderClient {
    /// Build a client from the external configuration
    pub fn new(external: &ExternalConfig) -> Result<Self> {
        if external.uploader_base_url.is_empty() {
            return Err(Error::Config {
                message: "uploader base URL is required".to_string(),
                key: Some("UPLOADER_BASE_URL".to_string()),
            });
        }

        Ok(Self {
            http: reqwest::Client::new(),
            base_url: external.uploader_base_url.trim_end_matches('/').to_string(),
            api_key: external.uploader_api_key.clone(),
            upload_timeout: Duration::from_millis(external.upload_timeout_ms),
        })
    }
}

#[async_trait]
impl ChapterUploader for HttpUploaderClient {
    async fn upload_single(&self, request: &UploadRequest) -> Result<UploadedChapter> {
        let url = format!("{}/upload/single", self.base_url);
        let payload = UploadPayload {
            zip_url: &request.zip_url,
            series_external_id: &request.series_external_id,
            chapter_number: request.chapter_number,
        };

        clients::with_deadline("uploader", self.upload_timeout, async {
            let mut builder = self.http.post(&url).json(&payload);
            if let Some(key) = &self.api_key {
                builder = builder.header("x-api-key", key);
            }

            let response = builder.send().await.map_err(Error::Network)?;
            let status = response.status();
            if !status.is_success() {
                return Err(Error::Uploader(format!("uploader returned {}", status)));
            }

            let body: UploadResponse = response
                .json()
                .await
                .map_err(|e| Error::Uploader(format!("invalid uploader response: {}", e)))?;

            Ok(UploadedChapter {
                chapter_id: body.results.chapter_id,
                chapter_number: body.results.chapter_number,
                images: body.results.data,
                path: body.results.path,
            })
        })
        .await
    }
}

#[derive(Debug, Serialize)]
struct UploadPayload<'a> {
    zip_url: &'a str,
    series_external_id: &'a str,
    chapter_number: f64,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    results: UploadResults,
}

#[derive(Debug, Deserialize)]
struct UploadResults {
    chapter_id: String,
    chapter_number: String,
    #[serde(default)]
    data: Vec<String>,
    path: String,
}
