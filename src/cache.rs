//! Debounced tag-based cache invalidation.
//!
//! Completed chapters schedule opaque purge tags. Tags queued within one
//! debounce window coalesce into a single purge call against the external
//! cache; failures are logged and ignored. Dropping tags under pressure is
//! preferable to stalling a sync tick, so the queue is bounded.

use crate::config::ExternalConfig;
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::sync::mpsc;

/// How long queued tags wait for companions before the purge fires
const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

/// Bounded queue size; overflow drops tags
const QUEUE_CAPACITY: usize = 1024;

/// Handle for scheduling cache purges
#[derive(Clone)]
pub struct CachePurger {
    tx: Option<mpsc::Sender<String>>,
}

impl CachePurger {
    /// Spawn the purge worker; a missing base URL disables purging entirely
    pub fn spawn(external: &ExternalConfig) -> Self {
        let Some(base_url) = external.cache_purge_base_url.clone() else {
            return Self { tx: None };
        };

        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let worker = PurgeWorker {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: external.cache_purge_api_key.clone(),
            timeout: Duration::from_millis(external.fetch_timeout_ms),
        };
        tokio::spawn(worker.run(rx));

        Self { tx: Some(tx) }
    }

    /// Queue purge tags; never blocks, drops on overflow
    pub fn schedule(&self, tags: impl IntoIterator<Item = String>) {
        let Some(tx) = &self.tx else {
            return;
        };
        for tag in tags {
            if let Err(e) = tx.try_send(tag) {
                tracing::debug!(error = %e, "Cache purge queue full, dropping tag");
                break;
            }
        }
    }

    /// Purge tags for one synced chapter
    pub fn schedule_chapter(&self, series_external_id: &str, chapter_number: f64) {
        self.schedule([
            format!("series:{}", series_external_id),
            format!("chapter:{}:{}", series_external_id, chapter_number),
        ]);
    }
}

struct PurgeWorker {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl PurgeWorker {
    /// Drain the queue: batch tags per debounce window, one purge per batch.
    /// Exits when every sender is gone.
    async fn run(self, mut rx: mpsc::Receiver<String>) {
        while let Some(first) = rx.recv().await {
            let mut tags: BTreeSet<String> = BTreeSet::new();
            tags.insert(first);

            // Coalesce everything that arrives inside the window
            let deadline = tokio::time::Instant::now() + DEBOUNCE_WINDOW;
            loop {
                match tokio::time::timeout_at(deadline, rx.recv()).await {
                    Ok(Some(tag)) => {
                        tags.insert(tag);
                    }
                    Ok(None) | Err(_) => break,
                }
            }

            self.purge(tags).await;
        }
    }

    async fn purge(&self, tags: BTreeSet<String>) {
        let tag_count = tags.len();
        let payload = PurgePayload {
            tags: tags.into_iter().collect(),
        };
        let url = format!("{}/purge", self.base_url);

        let mut builder = self.http.post(&url).json(&payload);
        if let Some(key) = &self.api_key {
            builder = builder.header("x-api-key", key);
        }

        match tokio::time::timeout(self.timeout, builder.send()).await {
            Ok(Ok(response)) if response.status().is_success() => {
                tracing::debug!(tags = tag_count, "Cache purge complete");
            }
            Ok(Ok(response)) => {
                tracing::warn!(status = %response.status(), "Cache purge rejected");
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Cache purge request failed");
            }
            Err(_) => {
                tracing::warn!("Cache purge timed out");
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct PurgePayload {
    tags: Vec<String>,
}
