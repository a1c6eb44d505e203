//! Transport abstraction over the WhatsApp protocol session.
//!
//! A [`SocketFactory`] opens one session and hands back a [`SocketHandle`]:
//! the command side ([`WaSocket`]) and an ordered stream of [`RawEvent`]s.
//! Raw events mirror what the protocol library reports; the connector turns
//! them into typed [`wabridge_core::SessionEvent`]s.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use wabridge_core::{
    ChatPatch, ConnectionPhase, DeliveryStatus, Message, RelayError, address, content,
};

/// Disconnect status code meaning the account was logged out remotely.
pub const LOGGED_OUT_STATUS: u16 = 401;

/// Transport failures.
#[derive(Debug, thiserror::Error)]
pub enum SocketError {
    /// Could not establish the session.
    #[error("connect failed: {0}")]
    Connect(String),

    /// The session is gone.
    #[error("socket closed")]
    Closed,

    /// The remote side rejected a request.
    #[error("request failed: {0}")]
    Request(String),

    /// A frame could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<SocketError> for RelayError {
    fn from(e: SocketError) -> Self {
        RelayError::Transport(e.to_string())
    }
}

/// Acknowledgment returned for a sent message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendReceipt {
    /// Address the message was sent to.
    pub chat_id: String,
    /// Network-assigned message id.
    pub message_id: String,
    /// Send time in seconds since the epoch.
    #[serde(default)]
    pub timestamp_seconds: i64,
    /// Delivery status at acknowledgment time.
    #[serde(default)]
    pub status: DeliveryStatus,
}

/// Commands on a live session.
#[async_trait]
pub trait WaSocket: Send + Sync {
    /// Send a text message to an address.
    async fn send_text(&self, jid: &str, text: &str) -> Result<SendReceipt, SocketError>;

    /// Terminate the session on the network side.
    async fn logout(&self) -> Result<(), SocketError>;

    /// Profile picture URL for an address, if it has one.
    async fn profile_picture_url(&self, jid: &str) -> Result<Option<String>, SocketError>;

    /// Close the local end. Idempotent.
    fn close(&self);
}

/// A freshly opened session.
pub struct SocketHandle {
    /// Command side.
    pub socket: Arc<dyn WaSocket>,
    /// Raw events in network order. Ends when the socket goes away.
    pub events: mpsc::Receiver<RawEvent>,
}

/// Opens sessions.
#[async_trait]
pub trait SocketFactory: Send + Sync {
    /// Open a session, resuming from `credentials` when given.
    async fn connect(&self, credentials: Option<Value>) -> Result<SocketHandle, SocketError>;
}

// ── Raw events ──────────────────────────────────────────────────────

/// An event as reported by the protocol library.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum RawEvent {
    /// Connection lifecycle change, possibly carrying a pairing code.
    #[serde(rename = "connection.update")]
    ConnectionUpdate(RawConnectionUpdate),
    /// Credentials changed and should be persisted.
    #[serde(rename = "creds.update")]
    CredsUpdate(Value),
    /// New or historical messages.
    #[serde(rename = "messages.upsert")]
    MessagesUpsert(RawMessagesUpsert),
    /// Full chat list after sync.
    #[serde(rename = "chats.set")]
    ChatsSet(RawChatsSet),
    /// New chats.
    #[serde(rename = "chats.upsert")]
    ChatsUpsert(Vec<RawChat>),
    /// Partial chat updates.
    #[serde(rename = "chats.update")]
    ChatsUpdate(Vec<RawChat>),
}

/// Payload of `connection.update`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawConnectionUpdate {
    /// Lifecycle phase, absent on pure pairing-code rotations.
    #[serde(default)]
    pub connection: Option<ConnectionPhase>,
    /// New pairing code.
    #[serde(default)]
    pub qr: Option<String>,
    /// Why the previous session ended.
    #[serde(default)]
    pub last_disconnect: Option<RawDisconnect>,
    /// Set once right after a successful pairing.
    #[serde(default)]
    pub is_new_login: Option<bool>,
    /// Authenticated account, reported with `open`.
    #[serde(default)]
    pub me: Option<RawMe>,
}

/// Disconnect details.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDisconnect {
    /// Protocol status code; [`LOGGED_OUT_STATUS`] means remote logout.
    #[serde(default)]
    pub status_code: Option<u16>,
    /// Human-readable reason.
    #[serde(default)]
    pub message: Option<String>,
}

/// Account identity as reported by the network.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMe {
    /// Account address, possibly with a device suffix.
    pub id: String,
    /// Push name.
    #[serde(default)]
    pub name: Option<String>,
    /// Verified business name.
    #[serde(default)]
    pub verified_name: Option<String>,
}

impl RawConnectionUpdate {
    /// Whether this update reports a remote logout.
    pub fn is_logged_out(&self) -> bool {
        self.last_disconnect
            .as_ref()
            .and_then(|d| d.status_code)
            .is_some_and(|code| code == LOGGED_OUT_STATUS)
    }

    /// Human-readable close reason, if any.
    pub fn reason(&self) -> Option<String> {
        let disconnect = self.last_disconnect.as_ref()?;
        disconnect.message.clone().or_else(|| {
            disconnect
                .status_code
                .map(|code| format!("status code {code}"))
        })
    }
}

/// Whether an upsert batch carries live traffic or history.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertKind {
    /// Live messages.
    Notify,
    /// History sync.
    Append,
}

/// Payload of `messages.upsert`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawMessagesUpsert {
    /// Messages in network order.
    pub messages: Vec<RawMessage>,
    /// Batch kind.
    #[serde(rename = "type")]
    pub kind: UpsertKind,
}

/// Payload of `chats.set`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawChatsSet {
    /// Every known chat.
    #[serde(default)]
    pub chats: Vec<RawChat>,
}

/// Message key.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessageKey {
    /// Chat address.
    #[serde(default)]
    pub remote_jid: Option<String>,
    /// Message id.
    #[serde(default)]
    pub id: Option<String>,
    /// Whether this account authored the message.
    #[serde(default)]
    pub from_me: bool,
}

/// Delivery status, numeric or named.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawStatus {
    /// Numeric protocol code.
    Code(u8),
    /// Status name, e.g. `SERVER_ACK`.
    Name(String),
}

impl RawStatus {
    fn to_status(&self) -> DeliveryStatus {
        match self {
            Self::Code(code) => DeliveryStatus::from_code(*code),
            Self::Name(name) => {
                serde_json::from_value(Value::String(name.to_uppercase())).unwrap_or_default()
            }
        }
    }
}

/// A message as reported by the network.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessage {
    /// Identity.
    pub key: RawMessageKey,
    /// Content payload; shape depends on the media type.
    #[serde(default)]
    pub message: Option<Value>,
    /// Send time in seconds since the epoch.
    #[serde(default)]
    pub message_timestamp: Option<i64>,
    /// Delivery status.
    #[serde(default)]
    pub status: Option<RawStatus>,
}

impl RawMessage {
    /// Convert to a stored message. `None` when the key lacks an address or id.
    pub fn to_message(&self) -> Option<Message> {
        let chat_id = self.key.remote_jid.clone().filter(|j| !j.is_empty())?;
        let message_id = self.key.id.clone().filter(|i| !i.is_empty())?;
        Some(Message {
            chat_id,
            message_id,
            from_self: self.key.from_me,
            timestamp_seconds: self.message_timestamp.unwrap_or_default(),
            body: content::summarize(self.message.as_ref()),
            delivery_status: self
                .status
                .as_ref()
                .map(RawStatus::to_status)
                .unwrap_or_default(),
        })
    }

    /// Whether the message belongs to a broadcast list or status feed.
    pub fn is_broadcast(&self) -> bool {
        self.key
            .remote_jid
            .as_deref()
            .is_some_and(address::is_broadcast_jid)
    }
}

/// Chat data as reported by the network.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawChat {
    /// Chat address.
    pub id: String,
    /// Contact or group name.
    #[serde(default)]
    pub name: Option<String>,
    /// Unread messages.
    #[serde(default)]
    pub unread_count: Option<u32>,
    /// Last activity in seconds since the epoch.
    #[serde(default)]
    pub conversation_timestamp: Option<i64>,
    /// Most recent message, when the network includes it.
    #[serde(default)]
    pub last_message: Option<RawMessage>,
}

impl From<RawChat> for ChatPatch {
    fn from(raw: RawChat) -> Self {
        // Protocol stubs (group notices, key changes) carry no content.
        let last = raw.last_message.filter(|m| m.message.is_some());
        Self {
            is_group: Some(address::is_group_jid(&raw.id)),
            display_name: raw.name.filter(|n| !n.is_empty()),
            unread_count: raw.unread_count,
            last_activity_timestamp: raw
                .conversation_timestamp
                .or_else(|| last.as_ref().and_then(|m| m.message_timestamp)),
            last_message_summary: last.map(|m| content::summarize(m.message.as_ref())),
            id: raw.id,
        }
    }
}
