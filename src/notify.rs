//! Failure notifications to an external channel, with per-series cooldown.
//!
//! A series only triggers a notification after crossing the consecutive-
//! failure threshold, and at most once per cooldown window. Notification
//! errors never propagate.

use crate::config::{ExternalConfig, NotificationConfig};
use crate::db::Series;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Sends failure notifications for persistently failing series
pub struct Notifier {
    http: reqwest::Client,
    base_url: Option<String>,
    api_key: Option<String>,
    timeout: Duration,
    threshold: u32,
    cooldown: Duration,
    last_sent: Mutex<HashMap<i64, Instant>>,
}

impl Notifier {
    /// Build a notifier; a missing base URL disables it entirely
    pub fn new(external: &ExternalConfig, notifications: &NotificationConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: external
                .notification_base_url
                .as_ref()
                .map(|b| b.trim_end_matches('/').to_string()),
            api_key: external.notification_api_key.clone(),
            timeout: Duration::from_millis(external.fetch_timeout_ms),
            threshold: notifications.notify_after_failures,
            cooldown: Duration::from_millis(notifications.cooldown_ms),
            last_sent: Mutex::new(HashMap::new()),
        }
    }

    /// Notify the channel about a failing series, subject to threshold and
    /// cooldown. Fire-and-forget: errors are logged and swallowed.
    pub fn notify_series_failure(&self, series: &Series) {
        let Some(base_url) = &self.base_url else {
            return;
        };
        if (series.consecutive_failures as u32) < self.threshold {
            return;
        }

        {
            let mut last_sent = self.last_sent.lock().unwrap_or_else(|e| e.into_inner());
            let now = Instant::now();
            if let Some(sent) = last_sent.get(&series.id.get())
                && now.duration_since(*sent) < self.cooldown
            {
                return;
            }
            last_sent.insert(series.id.get(), now);
        }

        let payload = FailureNotification {
            series_external_id: series.external_id.clone(),
            title: series.title.clone(),
            error: series.last_error.clone().unwrap_or_default(),
            consecutive_failures: series.consecutive_failures,
        };
        let url = format!("{}/notify", base_url);
        let http = self.http.clone();
        let api_key = self.api_key.clone();
        let timeout = self.timeout;

        tokio::spawn(async move {
            let mut builder = http.post(&url).json(&payload);
            if let Some(key) = &api_key {
                builder = builder.header("x-api-key", key);
            }

            match tokio::time::timeout(timeout, builder.send()).await {
                Ok(Ok(response)) if response.status().is_success() => {}
                Ok(Ok(response)) => {
                    tracing::warn!(status = %response.status(), "Failure notification rejected");
                }
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "Failure notification request failed");
                }
                Err(_) => {
                    tracing::warn!("Failure notification timed out");
                }
            }
        });
    }
}

#[derive(Debug, Serialize)]
struct FailureNotification {
    series_external_id: String,
    title: String,
    error: String,
    consecutive_failures: i64,
}
