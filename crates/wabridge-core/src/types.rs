//! Connection, chat, and message types shared across the relay.

use serde::{Deserialize, Serialize};

use crate::address;

/// The account the live session is authenticated as.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    /// Network address of the account.
    pub id: String,
    /// Push name or verified business name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Profile picture URL, resolved lazily on status queries.
    #[serde(default)]
    pub picture_url: Option<String>,
}

/// Snapshot of the single live session.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionState {
    /// Whether the session is open.
    pub connected: bool,
    /// Authenticated account, if any.
    pub user: Option<UserIdentity>,
}

impl ConnectionState {
    /// The fully reset state.
    pub fn disconnected() -> Self {
        Self::default()
    }
}

/// Delivery status reported by the network for a message.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    /// Delivery failed.
    Error,
    /// Not yet acknowledged by the server.
    #[default]
    Pending,
    /// Accepted by the server.
    ServerAck,
    /// Delivered to the recipient device.
    DeliveryAck,
    /// Read by the recipient.
    Read,
    /// Voice note or video played by the recipient.
    Played,
}

impl DeliveryStatus {
    /// Map the network's numeric status code (`0..=5`).
    ///
    /// Unknown codes are treated as pending.
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Self::Error,
            2 => Self::ServerAck,
            3 => Self::DeliveryAck,
            4 => Self::Read,
            5 => Self::Played,
            _ => Self::Pending,
        }
    }
}

/// A message as retained in per-chat history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Chat the message belongs to.
    pub chat_id: String,
    /// Network-assigned message id.
    pub message_id: String,
    /// Whether this account authored the message.
    pub from_self: bool,
    /// Send time in seconds since the epoch.
    pub timestamp_seconds: i64,
    /// Display summary of the payload.
    pub body: String,
    /// Last reported delivery status.
    pub delivery_status: DeliveryStatus,
}

/// A conversation thread with a contact or group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    /// Network address; immutable once set.
    pub id: String,
    /// Contact or group name.
    pub display_name: Option<String>,
    /// Whether the chat is a group.
    pub is_group: bool,
    /// Inbound messages not yet seen by the operator.
    pub unread_count: u32,
    /// Summary of the most recent message.
    pub last_message_summary: Option<String>,
    /// Seconds since the epoch of the most recent activity.
    pub last_activity_timestamp: i64,
}

impl Chat {
    /// Create an empty chat for an address, deriving name and group flag from it.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: Some(address::display_name_from_jid(&id)),
            is_group: address::is_group_jid(&id),
            id,
            unread_count: 0,
            last_message_summary: None,
            last_activity_timestamp: 0,
        }
    }

    /// Shallow-merge the present fields of a patch into this chat.
    ///
    /// The `id` of the patch is ignored.
    pub fn merge(&mut self, patch: ChatPatch) {
        if let Some(name) = patch.display_name {
            self.display_name = Some(name);
        }
        if let Some(is_group) = patch.is_group {
            self.is_group = is_group;
        }
        if let Some(unread) = patch.unread_count {
            self.unread_count = unread;
        }
        if let Some(summary) = patch.last_message_summary {
            self.last_message_summary = Some(summary);
        }
        if let Some(ts) = patch.last_activity_timestamp {
            self.last_activity_timestamp = ts;
        }
    }
}

/// Partial chat data reported by the network.
///
/// Absent fields leave the stored value untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPatch {
    /// Address of the chat to upsert.
    pub id: String,
    /// New display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// New group flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_group: Option<bool>,
    /// New unread count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unread_count: Option<u32>,
    /// New last-message summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_summary: Option<String>,
    /// New activity timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_activity_timestamp: Option<i64>,
}

impl ChatPatch {
    /// A patch that only names the chat.
    pub fn for_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}
