//! Event bridge: session events from the bus become push frames.
//!
//! Frames are `{"type": <wire name>, "timestamp": <RFC 3339>, "data": ...}`
//! with the wire names `qr_code`, `connection_update`, `message_upsert`,
//! and `chats_update`.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use wabridge_core::SessionEvent;
use wabridge_runtime::Subscription;

use super::broadcast::BroadcastManager;

/// A frame sent to push clients.
#[derive(Clone, Debug, Serialize)]
pub struct PushEvent {
    /// Wire name of the event.
    #[serde(rename = "type")]
    pub event_type: &'static str,
    /// When the frame was built.
    pub timestamp: String,
    /// Event payload.
    pub data: Value,
}

impl PushEvent {
    /// Frame for a session event.
    pub fn from_session(event: &SessionEvent) -> Self {
        Self {
            event_type: event.kind().wire_name(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            data: event.payload(),
        }
    }
}

/// Drains a bus subscription into the [`BroadcastManager`].
pub struct EventBridge {
    subscription: Subscription,
    broadcast: Arc<BroadcastManager>,
}

impl EventBridge {
    /// Bridge `subscription` to every push client.
    pub fn new(subscription: Subscription, broadcast: Arc<BroadcastManager>) -> Self {
        Self {
            subscription,
            broadcast,
        }
    }

    /// Run until the bus drops the subscription or `cancel` fires.
    #[tracing::instrument(skip_all, name = "event_bridge")]
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                event = self.subscription.receiver.recv() => {
                    let Some(event) = event else {
                        tracing::info!("event bus closed, bridge exiting");
                        break;
                    };
                    let frame = PushEvent::from_session(&event);
                    tracing::debug!(event_type = frame.event_type, "bridging event to clients");
                    self.broadcast.broadcast_all(&frame).await;
                }
                () = cancel.cancelled() => {
                    tracing::debug!("event bridge cancelled");
                    break;
                }
            }
        }
    }
}
