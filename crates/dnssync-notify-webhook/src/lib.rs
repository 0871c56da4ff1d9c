// # Webhook Notifier
//
// Posts failure alerts to a Discord-compatible webhook as a single embed.
//
// ## Delivery
//
// `Notifier` methods are synchronous and must not block a sync cycle, so
// each alert is spawned onto the current Tokio runtime and sent in the
// background. Delivery failures are logged and otherwise ignored; there is
// no retry and no queue.
//
// ## Payload
//
// ```json
// {"embeds": [{"title": "[dns-sync] Sync failed: pi2",
//              "description": "Sync failed for spoke: pi2 (pihole)\nError: ..\nTime: ..",
//              "color": 15158332,
//              "timestamp": "2026-01-01T00:00:00+00:00"}]}
// ```

use chrono::{DateTime, Utc};
use dnssync_core::traits::Notifier;
use dnssync_core::{Error, Result};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Embed color for spoke failures
pub const COLOR_SYNC_FAILED: u32 = 0xE7_4C_3C;

/// Embed color for hub outages
pub const COLOR_HUB_UNREACHABLE: u32 = 0xE6_7E_22;

/// Per-request timeout
const REQUEST_TIMEOUT_SECS: u64 = 10;

const TITLE_PREFIX: &str = "[dns-sync]";

#[derive(Debug, Clone, PartialEq, Serialize)]
struct Embed {
    title: String,
    description: String,
    color: u32,
    timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct WebhookPayload {
    embeds: Vec<Embed>,
}

impl WebhookPayload {
    fn single(title: String, description: String, color: u32, at: DateTime<Utc>) -> Self {
        Self {
            embeds: vec![Embed {
                title,
                description,
                color,
                timestamp: at.to_rfc3339(),
            }],
        }
    }

    fn sync_failed(name: &str, server_type: &str, error: &str, at: DateTime<Utc>) -> Self {
        Self::single(
            format!("{} Sync failed: {}", TITLE_PREFIX, name),
            format!(
                "Sync failed for spoke: {} ({})\nError: {}\nTime: {} UTC",
                name,
                server_type,
                error,
                at.format("%Y-%m-%dT%H:%M:%S")
            ),
            COLOR_SYNC_FAILED,
            at,
        )
    }

    fn hub_unreachable(name: &str, server_type: &str, error: &str, at: DateTime<Utc>) -> Self {
        Self::single(
            format!("{} Hub unreachable: {}", TITLE_PREFIX, name),
            format!(
                "Hub server is unreachable: {} ({})\nError: {}\nTime: {} UTC",
                name,
                server_type,
                error,
                at.format("%Y-%m-%dT%H:%M:%S")
            ),
            COLOR_HUB_UNREACHABLE,
            at,
        )
    }
}

/// Discord-compatible webhook notifier
#[derive(Clone)]
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for WebhookNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The webhook URL embeds its own secret token.
        f.debug_struct("WebhookNotifier")
            .field("url", &"<REDACTED>")
            .finish()
    }
}

impl WebhookNotifier {
    /// Create a notifier posting to `url`
    ///
    /// # Returns
    ///
    /// - `Err(Error::Config)` if the URL is empty or the HTTP client cannot be built
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(Error::config("webhook URL is empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::config(format!("failed to build webhook client: {}", e)))?;

        Ok(Self { url, client })
    }

    /// Build from an optional setting, `None` when unset or blank
    pub fn from_optional(url: Option<&str>) -> Result<Option<Self>> {
        match url.map(str::trim) {
            Some(url) if !url.is_empty() => Self::new(url).map(Some),
            _ => Ok(None),
        }
    }

    fn dispatch(&self, payload: WebhookPayload) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("No async runtime available, dropping webhook notification");
                return;
            }
        };

        let client = self.client.clone();
        let url = self.url.clone();
        handle.spawn(async move {
            send(&client, &url, &payload).await;
        });
    }
}

async fn send(client: &reqwest::Client, url: &str, payload: &WebhookPayload) {
    match client.post(url).json(payload).send().await {
        Ok(response) if response.status().is_success() => {
            debug!("Webhook notification delivered (HTTP {})", response.status());
        }
        Ok(response) => {
            warn!("Webhook notification rejected (HTTP {})", response.status());
        }
        Err(e) => {
            warn!("Webhook notification failed: {}", e);
        }
    }
}

impl Notifier for WebhookNotifier {
    fn notify_sync_failed(&self, server_name: &str, server_type: &str, error: &str) {
        self.dispatch(WebhookPayload::sync_failed(
            server_name,
            server_type,
            error,
            Utc::now(),
        ));
    }

    fn notify_hub_unreachable(&self, server_name: &str, server_type: &str, error: &str) {
        self.dispatch(WebhookPayload::hub_unreachable(
            server_name,
            server_type,
            error,
            Utc::now(),
        ));
    }
}
