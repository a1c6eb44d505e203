//! Typed session events.
//!
//! [`SessionEvent`] is what the connector publishes after the store has
//! absorbed a network event. Listeners subscribe by [`EventKind`]; the push
//! channel uses [`EventKind::wire_name`] as the event type string.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{Chat, ConnectionState, Message};

/// Lifecycle phase carried by a connection update.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionPhase {
    /// Handshake in progress (or waiting for the pairing code to be scanned).
    Connecting,
    /// Session established.
    Open,
    /// Session dropped or failed to start.
    Close,
}

/// Discriminant of [`SessionEvent`], used for subscriptions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A new pairing code was issued.
    PairingChallenge,
    /// The connection state changed.
    ConnectionUpdate,
    /// A message was added to a chat.
    MessageUpsert,
    /// The chat roster changed.
    ChatsUpdate,
}

impl EventKind {
    /// All kinds, in declaration order.
    pub const ALL: [Self; 4] = [
        Self::PairingChallenge,
        Self::ConnectionUpdate,
        Self::MessageUpsert,
        Self::ChatsUpdate,
    ];

    /// Event type string used on the push channel.
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::PairingChallenge => "qr_code",
            Self::ConnectionUpdate => "connection_update",
            Self::MessageUpsert => "message_upsert",
            Self::ChatsUpdate => "chats_update",
        }
    }
}

/// An event fanned out to every registered listener.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// New pairing code; superseded by the next one.
    PairingChallenge {
        /// Opaque code rendered as a scannable image by clients.
        code: String,
    },
    /// Connection state snapshot after a lifecycle change.
    ConnectionUpdate {
        /// Phase reported by the network.
        phase: ConnectionPhase,
        /// State after the change was applied.
        state: ConnectionState,
        /// Disconnect or failure reason, when closing.
        reason: Option<String>,
    },
    /// A message appended to a chat's history.
    MessageUpsert {
        /// The stored message.
        message: Message,
    },
    /// Full chat roster after an update.
    ChatsUpdate {
        /// Unordered chat snapshot.
        chats: Vec<Chat>,
    },
}

impl SessionEvent {
    /// Discriminant of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::PairingChallenge { .. } => EventKind::PairingChallenge,
            Self::ConnectionUpdate { .. } => EventKind::ConnectionUpdate,
            Self::MessageUpsert { .. } => EventKind::MessageUpsert,
            Self::ChatsUpdate { .. } => EventKind::ChatsUpdate,
        }
    }

    /// JSON payload sent to push clients.
    pub fn payload(&self) -> Value {
        match self {
            Self::PairingChallenge { code } => Value::String(code.clone()),
            Self::ConnectionUpdate {
                phase,
                state,
                reason,
            } => serde_json::json!({
                "connection": phase,
                "connected": state.connected,
                "user": state.user,
                "reason": reason,
            }),
            Self::MessageUpsert { message } => {
                serde_json::to_value(message).unwrap_or(Value::Null)
            }
            Self::ChatsUpdate { chats } => serde_json::to_value(chats).unwrap_or(Value::Null),
        }
    }
}
