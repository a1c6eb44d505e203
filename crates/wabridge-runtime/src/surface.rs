//! Operations exposed to remote callers.
//!
//! [`RelayApi`] validates inputs and delegates to the connector and the
//! webhook sender. Transport layers (HTTP routes) only translate requests
//! and errors.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;
use wabridge_core::{Chat, ConnectionState, Message, RelayError, address};

use crate::connector::SessionConnector;
use crate::socket::SendReceipt;
use crate::webhook::WebhookSender;

/// Returned as the challenge while connecting without a code yet.
pub const PENDING_CHALLENGE: &str = "pending";
/// Message count when the caller gives no limit.
pub const DEFAULT_MESSAGE_LIMIT: usize = 50;
/// Largest accepted message limit.
pub const MAX_MESSAGE_LIMIT: usize = 100;

/// Pairing view for remote callers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PairingView {
    /// Current code, [`PENDING_CHALLENGE`], or `None` once connected.
    pub qr: Option<String>,
    /// Whether the session is open.
    pub connected: bool,
}

/// Request surface over the connector.
#[derive(Clone)]
pub struct RelayApi {
    connector: Arc<SessionConnector>,
    webhook: Arc<WebhookSender>,
}

impl RelayApi {
    /// Wrap a connector and a webhook sender.
    pub fn new(connector: Arc<SessionConnector>, webhook: Arc<WebhookSender>) -> Self {
        Self { connector, webhook }
    }

    /// Underlying connector.
    pub fn connector(&self) -> &Arc<SessionConnector> {
        &self.connector
    }

    /// Connection state with the live profile picture.
    pub async fn get_status(&self) -> ConnectionState {
        self.connector.get_status().await
    }

    /// Start (or restart) the session in the background.
    pub fn connect(&self) {
        let connector = Arc::clone(&self.connector);
        drop(tokio::spawn(async move { connector.initialize().await }));
    }

    /// Pairing code view.
    pub fn get_pairing_challenge(&self) -> PairingView {
        let connected = self.connector.connection_state().connected;
        let qr = if connected {
            None
        } else {
            Some(
                self.connector
                    .current_pairing_challenge()
                    .unwrap_or_else(|| PENDING_CHALLENGE.to_string()),
            )
        };
        PairingView { qr, connected }
    }

    /// Send text to a phone number.
    pub async fn send_message(&self, number: &str, text: &str) -> Result<SendReceipt, RelayError> {
        if number.is_empty() || text.is_empty() {
            return Err(RelayError::InvalidInput(
                "Missing required fields: number and text".into(),
            ));
        }
        let digits = address::normalize_phone(number)?;
        self.connector
            .send_text(&address::jid_for_phone(&digits), text)
            .await
    }

    /// Unordered chat snapshot.
    pub fn list_chats(&self) -> Vec<Chat> {
        self.connector.list_chats()
    }

    /// Most recent messages of a chat, newest first.
    ///
    /// `limit` defaults to [`DEFAULT_MESSAGE_LIMIT`] and is clamped to
    /// `1..=MAX_MESSAGE_LIMIT`.
    pub fn get_chat_messages(
        &self,
        chat_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<Message>, RelayError> {
        if chat_id.is_empty() {
            return Err(RelayError::InvalidInput("Chat ID is required".into()));
        }
        Ok(self.connector.get_messages(chat_id, clamp_limit(limit)))
    }

    /// Log out and reset the session.
    pub async fn logout(&self) -> Result<(), RelayError> {
        self.connector.logout().await
    }

    /// Set or clear the webhook target. Returns the stored URL.
    pub fn set_webhook(&self, url: Option<String>) -> Result<Option<String>, RelayError> {
        let url = url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty());
        if let Some(url) = &url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(RelayError::InvalidInput(
                    "Webhook URL must start with http:// or https://".into(),
                ));
            }
        }
        self.webhook.set_url(url.clone());
        info!(enabled = url.is_some(), "webhook configured");
        Ok(url)
    }

    /// Current webhook target.
    pub fn webhook_url(&self) -> Option<String> {
        self.webhook.url()
    }
}

fn clamp_limit(limit: Option<i64>) -> usize {
    match limit {
        None => DEFAULT_MESSAGE_LIMIT,
        Some(n) => usize::try_from(n.max(1))
            .unwrap_or(MAX_MESSAGE_LIMIT)
            .min(MAX_MESSAGE_LIMIT),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use assert_matches::assert_matches;
    use wabridge_core::EventKind;

    use crate::bus::EventBus;
    use crate::connector::ConnectorConfig;
    use crate::testutil::{self, ScriptedFactory};
    use crate::webhook::DEFAULT_WEBHOOK_TIMEOUT;

    const PEER: &str = "5511999998888@s.whatsapp.net";

    struct Fixture {
        api: RelayApi,
        factory: Arc<ScriptedFactory>,
        events: crate::bus::Subscription,
    }

    fn fixture() -> Fixture {
        let factory = Arc::new(ScriptedFactory::new());
        let bus = Arc::new(EventBus::new());
        let events = bus.subscribe("test", &EventKind::ALL);
        let connector = SessionConnector::new(
            factory.clone(),
            None,
            bus,
            ConnectorConfig {
                reconnect_delay: Duration::from_millis(50),
                ..ConnectorConfig::default()
            },
        );
        let webhook = Arc::new(WebhookSender::new(None, DEFAULT_WEBHOOK_TIMEOUT));
        Fixture {
            api: RelayApi::new(connector, webhook),
            factory,
            events,
        }
    }

    impl Fixture {
        async fn wait_for(&mut self, kind: EventKind) {
            tokio::time::timeout(Duration::from_secs(2), async {
                while let Some(event) = self.events.receiver.recv().await {
                    if event.kind() == kind {
                        return;
                    }
                }
            })
            .await
            .unwrap();
        }

        async fn open(&mut self) {
            self.api.connector().initialize().await;
            self.factory
                .emit(testutil::open("5511000000000@s.whatsapp.net", None))
                .await;
            self.wait_for(EventKind::ConnectionUpdate).await;
        }
    }

    #[test]
    fn limit_clamping() {
        assert_eq!(clamp_limit(None), 50);
        assert_eq!(clamp_limit(Some(10)), 10);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(-5)), 1);
        assert_eq!(clamp_limit(Some(1_000)), 100);
    }

    #[tokio::test]
    async fn challenge_is_pending_before_first_code() {
        let f = fixture();
        f.api.connector().initialize().await;
        assert_eq!(
            f.api.get_pairing_challenge(),
            PairingView {
                qr: Some("pending".into()),
                connected: false
            }
        );
    }

    #[tokio::test]
    async fn challenge_is_null_when_connected() {
        let mut f = fixture();
        f.api.connector().initialize().await;
        f.factory.emit(testutil::qr("2@abc")).await;
        f.wait_for(EventKind::PairingChallenge).await;
        assert_eq!(f.api.get_pairing_challenge().qr.as_deref(), Some("2@abc"));

        f.factory
            .emit(testutil::open("5511000000000@s.whatsapp.net", None))
            .await;
        f.wait_for(EventKind::ConnectionUpdate).await;
        assert_eq!(
            f.api.get_pairing_challenge(),
            PairingView {
                qr: None,
                connected: true
            }
        );
    }

    #[tokio::test]
    async fn send_rejects_letters() {
        let f = fixture();
        let err = f.api.send_message("abc123", "hi").await.unwrap_err();
        assert_matches!(err, RelayError::InvalidAddress { digits: 3 });
    }

    #[tokio::test]
    async fn send_rejects_missing_fields() {
        let f = fixture();
        assert_matches!(
            f.api.send_message("", "hi").await,
            Err(RelayError::InvalidInput(_))
        );
        assert_matches!(
            f.api.send_message("5511999998888", "").await,
            Err(RelayError::InvalidInput(_))
        );
    }

    #[tokio::test]
    async fn send_normalizes_formatted_number() {
        let mut f = fixture();
        f.open().await;
        let receipt = f
            .api
            .send_message("+55 11 99999-8888", "hello")
            .await
            .unwrap();
        assert_eq!(receipt.chat_id, "5511999998888@s.whatsapp.net");
        assert_eq!(
            f.factory.socket().unwrap().sent(),
            vec![("5511999998888@s.whatsapp.net".into(), "hello".into())]
        );
    }

    #[tokio::test]
    async fn send_while_disconnected_fails() {
        let f = fixture();
        assert_matches!(
            f.api.send_message("5511999998888", "hello").await,
            Err(RelayError::NotConnected)
        );
    }

    #[tokio::test]
    async fn chat_messages_validation_and_unknown_chat() {
        let f = fixture();
        assert_matches!(
            f.api.get_chat_messages("", None),
            Err(RelayError::InvalidInput(_))
        );
        assert!(f.api.get_chat_messages("unknown-chat", None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn chat_messages_respect_limit() {
        let mut f = fixture();
        f.open().await;
        for i in 0..5 {
            f.factory
                .emit(testutil::text(PEER, &format!("m{i}"), "x", false, i))
                .await;
            f.wait_for(EventKind::MessageUpsert).await;
        }
        let two = f.api.get_chat_messages(PEER, Some(2)).unwrap();
        assert_eq!(two.len(), 2);
        assert_eq!(two[0].message_id, "m4");
        assert_eq!(f.api.get_chat_messages(PEER, Some(0)).unwrap().len(), 1);
        assert_eq!(f.api.list_chats().len(), 1);
    }

    #[test]
    fn webhook_url_validation() {
        let f = fixture();
        assert_matches!(
            f.api.set_webhook(Some("ftp://example.com".into())),
            Err(RelayError::InvalidInput(_))
        );
        assert_eq!(
            f.api
                .set_webhook(Some("https://example.com/hook".into()))
                .unwrap()
                .as_deref(),
            Some("https://example.com/hook")
        );
        assert_eq!(f.api.set_webhook(Some("  ".into())).unwrap(), None);
        assert!(f.api.webhook_url().is_none());
    }

    #[tokio::test]
    async fn connect_runs_in_background() {
        let f = fixture();
        f.api.connect();
        tokio::time::timeout(Duration::from_secs(2), async {
            while f.factory.connect_count() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }
}
