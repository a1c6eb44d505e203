//! In-memory chat roster and bounded per-chat message history.
//!
//! The store is plain synchronous state with no I/O. The connector owns it
//! behind a single mutex, so a message append and its unread increment are
//! never observed separately.

use std::collections::{HashMap, VecDeque};

use wabridge_core::{Chat, ChatPatch, Message};

/// Messages retained per chat before the oldest is evicted.
pub const MESSAGE_HISTORY_LIMIT: usize = 100;

/// Chat metadata and message history derived from network events.
#[derive(Debug)]
pub struct ChatStore {
    chats: HashMap<String, Chat>,
    messages: HashMap<String, VecDeque<Message>>,
    history_limit: usize,
}

impl ChatStore {
    /// Create an empty store with the default history limit.
    pub fn new() -> Self {
        Self::with_history_limit(MESSAGE_HISTORY_LIMIT)
    }

    /// Create an empty store keeping at most `limit` messages per chat.
    pub fn with_history_limit(limit: usize) -> Self {
        Self {
            chats: HashMap::new(),
            messages: HashMap::new(),
            history_limit: limit.max(1),
        }
    }

    /// Upsert chats by id, shallow-merging the fields each patch carries.
    pub fn apply_chats_snapshot<I>(&mut self, patches: I)
    where
        I: IntoIterator<Item = ChatPatch>,
    {
        for patch in patches {
            if patch.id.is_empty() {
                continue;
            }
            self.chats
                .entry(patch.id.clone())
                .or_insert_with(|| Chat::new(patch.id.clone()))
                .merge(patch);
        }
    }

    /// Append a message to its chat and refresh the chat summary.
    ///
    /// The chat is created if unknown. Unread count moves only for messages
    /// not authored by this account.
    pub fn apply_inbound_message(&mut self, message: Message) {
        let chat = self
            .chats
            .entry(message.chat_id.clone())
            .or_insert_with(|| Chat::new(message.chat_id.clone()));
        if !message.from_self {
            chat.unread_count = chat.unread_count.saturating_add(1);
        }
        chat.last_message_summary = Some(message.body.clone());
        chat.last_activity_timestamp = message.timestamp_seconds;

        let history = self.messages.entry(message.chat_id.clone()).or_default();
        history.push_back(message);
        while history.len() > self.history_limit {
            let _ = history.pop_front();
        }
    }

    /// Unordered snapshot of every chat.
    pub fn list_chats(&self) -> Vec<Chat> {
        self.chats.values().cloned().collect()
    }

    /// A single chat by id.
    pub fn chat(&self, chat_id: &str) -> Option<&Chat> {
        self.chats.get(chat_id)
    }

    /// Up to `limit` most recent messages of a chat, newest first.
    ///
    /// Unknown chats yield an empty list.
    pub fn get_messages(&self, chat_id: &str, limit: usize) -> Vec<Message> {
        self.messages
            .get(chat_id)
            .map(|history| history.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    /// Number of stored messages for a chat.
    pub fn message_count(&self, chat_id: &str) -> usize {
        self.messages.get(chat_id).map_or(0, VecDeque::len)
    }

    /// Drop every chat and message.
    pub fn clear_all(&mut self) {
        self.chats.clear();
        self.messages.clear();
    }
}

impl Default for ChatStore {
    fn default() -> Self {
        Self::new()
    }
}
