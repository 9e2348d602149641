//! HTTP notifier for out-of-process publishers.
//!
//! A CRUD process that does not share memory with the fan-out server posts
//! its mutations here; the server relays them to every live connection.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{FeedError, FeedResult};
use crate::event::Event;

/// Default web server URL.
const DEFAULT_WEB_URL: &str = "http://127.0.0.1:3030";

/// Notifies the fan-out server of mutations via HTTP.
#[derive(Clone)]
pub struct WebNotifier {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct PublishResponse {
    delivered: usize,
}

impl WebNotifier {
    /// Create a new notifier with default settings.
    ///
    /// Uses the `TASKPULSE_WEB_URL` environment variable if set,
    /// otherwise defaults to `http://127.0.0.1:3030`.
    pub fn new() -> Self {
        let base_url =
            std::env::var("TASKPULSE_WEB_URL").unwrap_or_else(|_| DEFAULT_WEB_URL.to_string());
        Self::with_url(&base_url)
    }

    /// Create a notifier with a custom base URL.
    pub fn with_url(base_url: &str) -> Self {
        debug!(base_url = %base_url, "WebNotifier initialized");
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(2))
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Post `event` to `/internal/publish`.
    ///
    /// Returns how many live connections the server queued it for.
    pub async fn publish(&self, event: &Event) -> FeedResult<usize> {
        let url = format!("{}/internal/publish", self.base_url);
        debug!(url = %url, event = %event.kind(), task_id = event.task().id, "Sending publish request");

        let response = self.client.post(&url).json(event).send().await?;
        if !response.status().is_success() {
            warn!(
                event = %event.kind(),
                status_code = %response.status(),
                "Publish request failed with status"
            );
            return Err(FeedError::PublishRejected(response.status().as_u16()));
        }

        let body: PublishResponse = response.json().await?;
        debug!(event = %event.kind(), delivered = body.delivered, "Publish request accepted");
        Ok(body.delivered)
    }

    /// Like [`publish`](Self::publish), but only logs failures.
    ///
    /// Suited to CRUD handlers where live delivery must never fail the
    /// mutation itself.
    pub async fn publish_best_effort(&self, event: &Event) {
        if let Err(e) = self.publish(event).await {
            debug!(
                event = %event.kind(),
                error = %e,
                "Failed to publish event (fan-out server may not be running)"
            );
        }
    }
}

impl Default for WebNotifier {
    fn default() -> Self {
        Self::new()
    }
}
