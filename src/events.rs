//! Lifecycle and progress event publication.
//!
//! Events flow two ways: an in-process broadcast channel feeding the SSE
//! endpoint, and a best-effort HTTP publish to the external event bus on a
//! global channel ("list") plus a per-series channel. Bus publication is
//! fire-and-forget; it never blocks or fails the caller.

use crate::config::ExternalConfig;
use crate::error::Error;
use crate::types::{Event, EventEnvelope};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::broadcast;

/// Name of the global channel every event is published to
const GLOBAL_CHANNEL: &str = "list";

/// Buffer size of the in-process broadcast channel
const BROADCAST_BUFFER: usize = 1000;

/// Publisher over the broadcast channel and the optional external bus
#[derive(Clone)]
pub struct EventPublisher {
    tx: broadcast::Sender<EventEnvelope>,
    bus: Option<EventBusClient>,
}

impl EventPublisher {
    /// Build a publisher; the external bus is enabled when configured
    pub fn new(external: &ExternalConfig) -> Self {
        let (tx, _rx) = broadcast::channel(BROADCAST_BUFFER);
        let bus = external
            .event_bus_base_url
            .as_ref()
            .map(|base| EventBusClient {
                http: reqwest::Client::new(),
                base_url: base.trim_end_matches('/').to_string(),
                api_key: external.event_bus_api_key.clone(),
                timeout: Duration::from_millis(external.fetch_timeout_ms),
            });
        Self { tx, bus }
    }

    /// Subscribe to the in-process event stream
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }

    /// Publish an event to all channels.
    ///
    /// Never blocks: the broadcast send drops events when nobody listens,
    /// and bus publication happens on a detached task with failures
    /// swallowed after logging.
    pub fn publish(&self, event: Event) {
        let envelope = EventEnvelope::new(&event);

        // No subscribers is not an error
        let _ = self.tx.send(envelope.clone());

        if let Some(bus) = &self.bus {
            let bus = bus.clone();
            tokio::spawn(async move {
                let series_channel = format!("series:{}", envelope.series_external_id);
                for channel in [GLOBAL_CHANNEL, series_channel.as_str()] {
                    if let Err(e) = bus.publish_to(channel, &envelope).await {
                        tracing::warn!(
                            channel,
                            kind = %envelope.kind,
                            error = %e,
                            "Event bus publish failed"
                        );
                    }
                }
            });
        }
    }

    /// Mint a short-lived capability token scoped to one channel
    /// (or a wildcard for administrative clients).
    pub async fn mint_token(&self, channel: &str) -> Result<String> {
        let bus = self
            .bus
            .as_ref()
            .ok_or_else(|| Error::Other("event bus is not configured".to_string()))?;
        bus.mint_token(channel).await
    }
}

/// Thin client for the external pub/sub service
#[derive(Clone)]
struct EventBusClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl EventBusClient {
    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("x-api-key", key),
            None => builder,
        }
    }

    async fn publish_to(&self, channel: &str, envelope: &EventEnvelope) -> Result<()> {
        let url = format!("{}/channels/{}/publish", self.base_url, channel);
        let response = tokio::time::timeout(
            self.timeout,
            self.authorized(self.http.post(&url).json(envelope)).send(),
        )
        .await
        .map_err(|_| Error::timeout("event bus"))?
        .map_err(Error::Network)?;

        if !response.status().is_success() {
            return Err(Error::Other(format!(
                "event bus returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn mint_token(&self, channel: &str) -> Result<String> {
        let url = format!("{}/tokens", self.base_url);
        let response = tokio::time::timeout(
            self.timeout,
            self.authorized(self.http.post(&url).json(&TokenRequest { channel }))
                .send(),
        )
        .await
        .map_err(|_| Error::timeout("event bus"))?
        .map_err(Error::Network)?;

        if !response.status().is_success() {
            return Err(Error::Other(format!(
                "event bus returned {} minting token",
                response.status()
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Other(format!("invalid event bus response: {}", e)))?;
        Ok(body.token)
    }
}

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    channel: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SeriesStatus, TaskStatus};

    #[tokio::test]
    async fn broadcast_delivers_envelopes_to_subscribers() {
        let publisher = EventPublisher::new(&ExternalConfig::default());
        let mut rx = publisher.subscribe();

        publisher.publish(Event::ScanFinished {
            external_id: "ext-1".to_string(),
            status: SeriesStatus::Syncing,
            missing: 4,
            error: None,
        });

        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.kind, "manga.scan.finished");
        assert_eq!(envelope.series_external_id, "ext-1");
        assert_eq!(envelope.data["missing"], 4);
    }

    #[tokio::test]
    async fn publish_without_subscribers_does_not_panic() {
        let publisher = EventPublisher::new(&ExternalConfig::default());
        publisher.publish(Event::SyncProgress {
            external_id: "ext-2".to_string(),
            chapter_number: 1.0,
            status: TaskStatus::Completed,
            error: None,
        });
    }

    #[tokio::test]
    async fn mint_token_requires_configured_bus() {
        let publisher = EventPublisher::new(&ExternalConfig::default());
        assert!(publisher.mint_token("list").await.is_err());
    }

    #[tokio::test]
    async fn bus_publish_posts_to_global_and_series_channels() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/channels/list/publish"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/channels/series:ext-3/publish"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let external = ExternalConfig {
            event_bus_base_url: Some(server.uri()),
            ..Default::default()
        };
        let publisher = EventPublisher::new(&external);
        publisher.publish(Event::ScanStarted {
            external_id: "ext-3".to_string(),
        });

        // Detached publish task; give it a moment before expectations check
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    }

    #[tokio::test]
    async fn mint_token_round_trip() {
        use wiremock::matchers::{body_partial_json, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tokens"))
            .and(body_partial_json(serde_json::json!({"channel": "series:ext-1"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"token": "cap_abc123"})),
            )
            .mount(&server)
            .await;

        let external = ExternalConfig {
            event_bus_base_url: Some(server.uri()),
            ..Default::default()
        };
        let publisher = EventPublisher::new(&external);
        let token = publisher.mint_token("series:ext-1").await.unwrap();
        assert_eq!(token, "cap_abc123");
    }
}
