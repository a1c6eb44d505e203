//! Outbound webhook for inbound messages.
//!
//! At most one target URL, changeable at runtime. Each inbound message not
//! authored by this account is POSTed once as `{event: "message", data}`.
//! Failures are logged and counted, never retried.
//!
//! As a bus listener every POST runs on its own task, so a slow target never
//! holds up the messages behind it. [`MAX_IN_FLIGHT`] caps concurrent POSTs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use parking_lot::RwLock;
use serde_json::json;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use wabridge_core::{Message, SessionEvent};

use crate::bus::{EventListener, ListenerError};

/// Default upper bound on one POST.
pub const DEFAULT_WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);
/// Concurrent POSTs; further deliveries wait for a permit.
pub const MAX_IN_FLIGHT: usize = 32;

/// Webhook delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// Request could not be sent or timed out.
    #[error("webhook request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Target answered with a non-success status.
    #[error("webhook returned HTTP {0}")]
    Status(u16),
}

/// Posts inbound messages to the configured URL.
pub struct WebhookSender {
    url: RwLock<Option<String>>,
    client: reqwest::Client,
    permits: Arc<Semaphore>,
}

impl WebhookSender {
    /// Create a sender with an optional initial URL.
    pub fn new(url: Option<String>, timeout: Duration) -> Self {
        Self {
            url: RwLock::new(url.filter(|u| !u.is_empty())),
            client: reqwest::Client::builder()
                .timeout(timeout)
                .user_agent(concat!("wabridge/", env!("CARGO_PKG_VERSION")))
                .build()
                .unwrap_or_default(),
            permits: Arc::new(Semaphore::new(MAX_IN_FLIGHT)),
        }
    }

    /// Replace or clear the target URL.
    pub fn set_url(&self, url: Option<String>) {
        let url = url.filter(|u| !u.is_empty());
        info!(url = url.as_deref().unwrap_or("<none>"), "webhook target updated");
        *self.url.write() = url;
    }

    /// Current target URL.
    pub fn url(&self) -> Option<String> {
        self.url.read().clone()
    }

    /// POST one message. No-op without a target.
    pub async fn deliver(&self, message: &Message) -> Result<(), WebhookError> {
        let Some(url) = self.url() else {
            return Ok(());
        };
        post(&self.client, &url, message).await
    }
}

async fn post(
    client: &reqwest::Client,
    url: &str,
    message: &Message,
) -> Result<(), WebhookError> {
    let body = json!({ "event": "message", "data": message });
    let response = client.post(url).json(&body).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(WebhookError::Status(status.as_u16()));
    }
    debug!(%url, message_id = %message.message_id, "webhook delivered");
    Ok(())
}

#[async_trait]
impl EventListener for WebhookSender {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn on_event(&self, event: &SessionEvent) -> Result<(), ListenerError> {
        let SessionEvent::MessageUpsert { message } = event else {
            return Ok(());
        };
        if message.from_self {
            return Ok(());
        }
        let Some(url) = self.url() else {
            return Ok(());
        };

        let client = self.client.clone();
        let permits = Arc::clone(&self.permits);
        let message = message.clone();
        drop(tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            if let Err(e) = post(&client, &url, &message).await {
                counter!("webhook_failures_total").increment(1);
                warn!(
                    message_id = %message.message_id,
                    error = %e,
                    "webhook delivery failed"
                );
            }
        }));
        Ok(())
    }
}
