//! Scripted in-memory transport for tests.
//!
//! [`ScriptedFactory`] hands out [`ScriptedSocket`]s and keeps the sending
//! half of each socket's event stream so tests can inject raw events with
//! [`ScriptedFactory::emit`]. The helper functions build common raw events.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use wabridge_core::{ConnectionPhase, DeliveryStatus};

use crate::socket::{
    RawChat, RawConnectionUpdate, RawDisconnect, RawEvent, RawMe, RawMessage, RawMessageKey,
    RawMessagesUpsert, RawStatus, SendReceipt, SocketError, SocketFactory, SocketHandle,
    UpsertKind, WaSocket,
};

/// Socket that records commands and fails on request.
#[derive(Default)]
pub struct ScriptedSocket {
    sent: Mutex<Vec<(String, String)>>,
    send_delay: Mutex<Option<Duration>>,
    picture: Mutex<Option<String>>,
    fail_sends: AtomicBool,
    fail_logout: AtomicBool,
    fail_picture: AtomicBool,
    logged_out: AtomicBool,
    closed: AtomicBool,
    next_id: AtomicU64,
}

impl ScriptedSocket {
    /// `(jid, text)` pairs sent so far.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().clone()
    }

    /// Make sends fail.
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Make logout fail.
    pub fn fail_logout(&self, fail: bool) {
        self.fail_logout.store(fail, Ordering::SeqCst);
    }

    /// Make profile picture lookups fail.
    pub fn fail_picture(&self, fail: bool) {
        self.fail_picture.store(fail, Ordering::SeqCst);
    }

    /// Delay every send.
    pub fn set_send_delay(&self, delay: Duration) {
        *self.send_delay.lock() = Some(delay);
    }

    /// Picture URL returned for any address.
    pub fn set_picture(&self, url: Option<String>) {
        *self.picture.lock() = url;
    }

    /// Whether `logout` succeeded on this socket.
    pub fn logged_out(&self) -> bool {
        self.logged_out.load(Ordering::SeqCst)
    }

    /// Whether `close` was called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WaSocket for ScriptedSocket {
    async fn send_text(&self, jid: &str, text: &str) -> Result<SendReceipt, SocketError> {
        let delay = *self.send_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(SocketError::Request("send rejected".into()));
        }
        self.sent.lock().push((jid.to_string(), text.to_string()));
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(SendReceipt {
            chat_id: jid.to_string(),
            message_id: format!("3EB0SCRIPTED{n:04}"),
            timestamp_seconds: 1_700_000_000,
            status: DeliveryStatus::ServerAck,
        })
    }

    async fn logout(&self) -> Result<(), SocketError> {
        if self.fail_logout.load(Ordering::SeqCst) {
            return Err(SocketError::Request("logout rejected".into()));
        }
        self.logged_out.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn profile_picture_url(&self, _jid: &str) -> Result<Option<String>, SocketError> {
        if self.fail_picture.load(Ordering::SeqCst) {
            return Err(SocketError::Request("item-not-found".into()));
        }
        Ok(self.picture.lock().clone())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Factory producing [`ScriptedSocket`]s.
#[derive(Default)]
pub struct ScriptedFactory {
    connects: AtomicUsize,
    fail_next: AtomicBool,
    connect_delay: Mutex<Option<Duration>>,
    last_credentials: Mutex<Option<Value>>,
    sockets: Mutex<Vec<Arc<ScriptedSocket>>>,
    current: Mutex<Option<mpsc::Sender<RawEvent>>>,
}

impl ScriptedFactory {
    /// Empty factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `connect` calls, failed ones included.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Credentials passed to the latest `connect`.
    pub fn last_credentials(&self) -> Option<Value> {
        self.last_credentials.lock().clone()
    }

    /// Fail the next `connect`.
    pub fn fail_next_connect(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Delay every `connect`.
    pub fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.lock() = Some(delay);
    }

    /// Most recently created socket.
    pub fn socket(&self) -> Option<Arc<ScriptedSocket>> {
        self.sockets.lock().last().cloned()
    }

    /// Number of created sockets that were closed.
    pub fn sockets_closed(&self) -> usize {
        self.sockets.lock().iter().filter(|s| s.is_closed()).count()
    }

    /// Event sender of the most recent socket.
    pub fn sender(&self) -> Option<mpsc::Sender<RawEvent>> {
        self.current.lock().clone()
    }

    /// Inject an event into the most recent socket. Returns `false` if the
    /// connector no longer listens.
    pub async fn emit(&self, event: RawEvent) -> bool {
        let Some(tx) = self.sender() else {
            return false;
        };
        tx.send(event).await.is_ok()
    }
}

#[async_trait]
impl SocketFactory for ScriptedFactory {
    async fn connect(&self, credentials: Option<Value>) -> Result<SocketHandle, SocketError> {
        let _ = self.connects.fetch_add(1, Ordering::SeqCst);
        *self.last_credentials.lock() = credentials;

        let delay = *self.connect_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(SocketError::Connect("scripted failure".into()));
        }

        let socket = Arc::new(ScriptedSocket::default());
        let (tx, events) = mpsc::channel(64);
        self.sockets.lock().push(socket.clone());
        *self.current.lock() = Some(tx);
        Ok(SocketHandle { socket, events })
    }
}

// ── Raw event builders ──────────────────────────────────────────────

/// Pairing code rotation.
pub fn qr(code: &str) -> RawEvent {
    RawEvent::ConnectionUpdate(RawConnectionUpdate {
        qr: Some(code.to_string()),
        ..RawConnectionUpdate::default()
    })
}

/// Session open as `user_id`.
pub fn open(user_id: &str, name: Option<&str>) -> RawEvent {
    RawEvent::ConnectionUpdate(RawConnectionUpdate {
        connection: Some(ConnectionPhase::Open),
        me: Some(RawMe {
            id: user_id.to_string(),
            name: name.map(str::to_string),
            verified_name: None,
        }),
        ..RawConnectionUpdate::default()
    })
}

/// Session closed with a status code.
pub fn close(status_code: u16, message: &str) -> RawEvent {
    RawEvent::ConnectionUpdate(RawConnectionUpdate {
        connection: Some(ConnectionPhase::Close),
        last_disconnect: Some(RawDisconnect {
            status_code: Some(status_code),
            message: Some(message.to_string()),
        }),
        ..RawConnectionUpdate::default()
    })
}

/// Credentials changed.
pub fn creds(value: Value) -> RawEvent {
    RawEvent::CredsUpdate(value)
}

fn raw_text(chat: &str, id: &str, text: &str, from_me: bool, timestamp: i64) -> RawMessage {
    RawMessage {
        key: RawMessageKey {
            remote_jid: Some(chat.to_string()),
            id: Some(id.to_string()),
            from_me,
        },
        message: Some(json!({ "conversation": text })),
        message_timestamp: Some(timestamp),
        status: Some(RawStatus::Code(2)),
    }
}

/// Live text message.
pub fn text(chat: &str, id: &str, body: &str, from_me: bool, timestamp: i64) -> RawEvent {
    RawEvent::MessagesUpsert(RawMessagesUpsert {
        messages: vec![raw_text(chat, id, body, from_me, timestamp)],
        kind: UpsertKind::Notify,
    })
}

/// History-sync text message.
pub fn history(chat: &str, id: &str, body: &str) -> RawEvent {
    RawEvent::MessagesUpsert(RawMessagesUpsert {
        messages: vec![raw_text(chat, id, body, false, 0)],
        kind: UpsertKind::Append,
    })
}

/// New chats with no metadata beyond their ids.
pub fn chats_upsert(ids: &[&str]) -> RawEvent {
    RawEvent::ChatsUpsert(
        ids.iter()
            .map(|id| RawChat {
                id: (*id).to_string(),
                ..RawChat::default()
            })
            .collect(),
    )
}
