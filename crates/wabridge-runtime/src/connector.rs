//! Session connector: owns the single live socket.
//!
//! The connector drives `UNINITIALIZED → CONNECTING → CONNECTED`, feeds raw
//! network events through the [`ChatStore`] and then the [`EventBus`] in
//! network order, persists credentials, and reconnects after a fixed delay
//! unless the account was logged out remotely.
//!
//! Every socket instance gets a generation number. Events, reconnect timers,
//! and late `connect` results from an older generation are discarded.

use std::sync::{Arc, Weak};
use std::time::Duration;

use metrics::counter;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use wabridge_core::{
    Chat, ChatPatch, ConnectionPhase, ConnectionState, Message, RelayError, SessionEvent,
    UserIdentity,
};

use crate::bus::EventBus;
use crate::credentials::CredentialStore;
use crate::socket::{
    RawChat, RawConnectionUpdate, RawEvent, RawMe, SendReceipt, SocketFactory, UpsertKind,
    WaSocket,
};
use crate::store::{ChatStore, MESSAGE_HISTORY_LIMIT};

/// Connector tuning.
#[derive(Clone, Debug)]
pub struct ConnectorConfig {
    /// Fixed delay before reconnecting after a drop.
    pub reconnect_delay: Duration,
    /// Upper bound on a single send or profile lookup.
    pub send_timeout: Duration,
    /// Messages kept per chat.
    pub history_limit: usize,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(5),
            send_timeout: Duration::from_secs(10),
            history_limit: MESSAGE_HISTORY_LIMIT,
        }
    }
}

/// Lifecycle of the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionPhase {
    /// No socket; `initialize` has not run or the account logged out.
    Uninitialized,
    /// Socket opening, waiting for pairing, or waiting to reconnect.
    Connecting,
    /// Session open.
    Connected,
}

struct Inner {
    phase: SessionPhase,
    state: ConnectionState,
    challenge: Option<String>,
    socket: Option<Arc<dyn WaSocket>>,
    generation: u64,
    reconnect: Option<JoinHandle<()>>,
    pump: Option<JoinHandle<()>>,
}

impl Inner {
    fn new() -> Self {
        Self {
            phase: SessionPhase::Uninitialized,
            state: ConnectionState::disconnected(),
            challenge: None,
            socket: None,
            generation: 0,
            reconnect: None,
            pump: None,
        }
    }

    fn abort_reconnect(&mut self) {
        if let Some(handle) = self.reconnect.take() {
            handle.abort();
        }
    }
}

/// Owner of the network session and of the chat store.
pub struct SessionConnector {
    factory: Arc<dyn SocketFactory>,
    credentials: Option<CredentialStore>,
    store: Mutex<ChatStore>,
    bus: Arc<EventBus>,
    config: ConnectorConfig,
    inner: Mutex<Inner>,
    init_guard: tokio::sync::Mutex<()>,
    this: Weak<Self>,
}

impl SessionConnector {
    /// Create a connector. Nothing happens until [`Self::initialize`].
    pub fn new(
        factory: Arc<dyn SocketFactory>,
        credentials: Option<CredentialStore>,
        bus: Arc<EventBus>,
        config: ConnectorConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            factory,
            credentials,
            store: Mutex::new(ChatStore::with_history_limit(config.history_limit)),
            bus,
            config,
            inner: Mutex::new(Inner::new()),
            init_guard: tokio::sync::Mutex::new(()),
            this: this.clone(),
        })
    }

    /// Event bus the connector publishes to.
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Open a session, resuming from stored credentials when present.
    ///
    /// Overlapping calls return immediately, as do calls while connected.
    /// Failure is published as a `close` connection update, not returned.
    #[instrument(skip(self))]
    pub async fn initialize(&self) {
        let Ok(_guard) = self.init_guard.try_lock() else {
            debug!("initialization already in progress");
            return;
        };

        let generation = {
            let mut inner = self.inner.lock();
            if inner.phase == SessionPhase::Connected {
                debug!("session already connected");
                return;
            }
            inner.generation += 1;
            inner.abort_reconnect();
            if let Some(pump) = inner.pump.take() {
                pump.abort();
            }
            if let Some(socket) = inner.socket.take() {
                socket.close();
            }
            inner.phase = SessionPhase::Connecting;
            inner.state = ConnectionState::disconnected();
            inner.generation
        };

        let credentials = self.credentials.as_ref().and_then(CredentialStore::load);
        info!(generation, resume = credentials.is_some(), "opening session");

        match self.factory.connect(credentials).await {
            Ok(handle) => {
                let mut inner = self.inner.lock();
                if inner.generation != generation {
                    debug!(generation, "session superseded while connecting");
                    handle.socket.close();
                    return;
                }
                inner.socket = Some(handle.socket);
                inner.pump = Some(self.spawn_pump(generation, handle.events));
            }
            Err(e) => {
                warn!(generation, error = %e, "session initialization failed");
                {
                    let mut inner = self.inner.lock();
                    if inner.generation != generation {
                        return;
                    }
                    inner.phase = SessionPhase::Uninitialized;
                    inner.state = ConnectionState::disconnected();
                }
                self.bus.publish(SessionEvent::ConnectionUpdate {
                    phase: ConnectionPhase::Close,
                    state: ConnectionState::disconnected(),
                    reason: Some(e.to_string()),
                });
            }
        }
    }

    /// Send a text message. Requires an open session.
    #[instrument(skip(self, text), fields(text_len = text.len()))]
    pub async fn send_text(&self, jid: &str, text: &str) -> Result<SendReceipt, RelayError> {
        let socket = {
            let inner = self.inner.lock();
            match (&inner.socket, inner.phase) {
                (Some(socket), SessionPhase::Connected) => Arc::clone(socket),
                _ => return Err(RelayError::NotConnected),
            }
        };

        let timeout = self.config.send_timeout;
        let receipt = tokio::time::timeout(timeout, socket.send_text(jid, text))
            .await
            .map_err(|_| RelayError::Timeout(timeout))??;

        counter!("messages_sent_total").increment(1);
        debug!(message_id = %receipt.message_id, "message sent");
        Ok(receipt)
    }

    /// Log out on the network, then reset all local session state.
    ///
    /// A no-op without a socket.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<(), RelayError> {
        let socket = self.inner.lock().socket.clone();
        let Some(socket) = socket else {
            debug!("no session to log out");
            return Ok(());
        };

        socket.logout().await?;
        self.reset_session();
        info!("logged out");

        self.bus.publish(SessionEvent::ConnectionUpdate {
            phase: ConnectionPhase::Close,
            state: ConnectionState::disconnected(),
            reason: Some("logged out".into()),
        });
        Ok(())
    }

    /// Connection state, with the user's profile picture looked up live.
    pub async fn get_status(&self) -> ConnectionState {
        let (mut state, socket) = {
            let inner = self.inner.lock();
            (inner.state.clone(), inner.socket.clone())
        };
        if !state.connected {
            return state;
        }
        if let (Some(user), Some(socket)) = (state.user.as_mut(), socket) {
            let lookup = tokio::time::timeout(
                self.config.send_timeout,
                socket.profile_picture_url(&user.id),
            )
            .await;
            user.picture_url = match lookup {
                Ok(Ok(url)) => url,
                Ok(Err(e)) => {
                    debug!(error = %e, "profile picture lookup failed");
                    None
                }
                Err(_) => {
                    debug!("profile picture lookup timed out");
                    None
                }
            };
        }
        state
    }

    /// Last pairing code, or `None` once connected.
    pub fn current_pairing_challenge(&self) -> Option<String> {
        let inner = self.inner.lock();
        if inner.state.connected {
            None
        } else {
            inner.challenge.clone()
        }
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> SessionPhase {
        self.inner.lock().phase
    }

    /// Connection state without the profile lookup.
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.lock().state.clone()
    }

    /// Unordered chat snapshot.
    pub fn list_chats(&self) -> Vec<Chat> {
        self.store.lock().list_chats()
    }

    /// Up to `limit` most recent messages of a chat, newest first.
    pub fn get_messages(&self, chat_id: &str, limit: usize) -> Vec<Message> {
        self.store.lock().get_messages(chat_id, limit)
    }

    /// Stop background tasks and close the socket, keeping credentials.
    pub fn shutdown(&self) {
        let socket = {
            let mut inner = self.inner.lock();
            inner.generation += 1;
            inner.abort_reconnect();
            if let Some(pump) = inner.pump.take() {
                pump.abort();
            }
            inner.phase = SessionPhase::Uninitialized;
            inner.state = ConnectionState::disconnected();
            inner.socket.take()
        };
        if let Some(socket) = socket {
            socket.close();
        }
        info!("session connector stopped");
    }

    // ── Event path ──────────────────────────────────────────────────

    fn spawn_pump(&self, generation: u64, mut events: mpsc::Receiver<RawEvent>) -> JoinHandle<()> {
        let weak = self.this.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(this) = weak.upgrade() else {
                    break;
                };
                if this.inner.lock().generation != generation {
                    break;
                }
                this.handle_raw_event(generation, event);
            }
            debug!(generation, "event pump finished");
        })
    }

    fn handle_raw_event(&self, generation: u64, event: RawEvent) {
        match event {
            RawEvent::ConnectionUpdate(update) => {
                self.handle_connection_update(generation, update);
            }
            RawEvent::CredsUpdate(creds) => {
                if let Some(store) = &self.credentials {
                    if let Err(e) = store.save(&creds) {
                        warn!(error = %e, "failed to persist credentials");
                    }
                }
            }
            RawEvent::MessagesUpsert(upsert) => {
                if upsert.kind != UpsertKind::Notify {
                    debug!(count = upsert.messages.len(), "ignoring history upsert");
                    return;
                }
                for raw in upsert.messages {
                    if raw.is_broadcast() {
                        continue;
                    }
                    let Some(message) = raw.to_message() else {
                        debug!("skipping message without address or id");
                        continue;
                    };
                    self.store.lock().apply_inbound_message(message.clone());
                    counter!("messages_received_total").increment(1);
                    self.bus.publish(SessionEvent::MessageUpsert { message });
                }
            }
            RawEvent::ChatsSet(set) => self.apply_chats(set.chats),
            RawEvent::ChatsUpsert(chats) | RawEvent::ChatsUpdate(chats) => {
                self.apply_chats(chats);
            }
        }
    }

    fn apply_chats(&self, raw: Vec<RawChat>) {
        if raw.is_empty() {
            return;
        }
        let chats = {
            let mut store = self.store.lock();
            store.apply_chats_snapshot(raw.into_iter().map(ChatPatch::from));
            store.list_chats()
        };
        self.bus.publish(SessionEvent::ChatsUpdate { chats });
    }

    fn handle_connection_update(&self, generation: u64, update: RawConnectionUpdate) {
        if let Some(code) = update.qr.clone() {
            let issued = {
                let mut inner = self.inner.lock();
                if inner.state.connected {
                    false
                } else {
                    inner.challenge = Some(code.clone());
                    true
                }
            };
            if issued {
                info!("pairing code issued");
                self.bus.publish(SessionEvent::PairingChallenge { code });
            }
        }

        let Some(phase) = update.connection else {
            return;
        };
        let reason = update.reason();

        let state = match phase {
            ConnectionPhase::Open => {
                let mut inner = self.inner.lock();
                inner.phase = SessionPhase::Connected;
                inner.challenge = None;
                inner.abort_reconnect();
                inner.state = ConnectionState {
                    connected: true,
                    user: update.me.map(user_from_me),
                };
                info!(user = ?inner.state.user.as_ref().map(|u| &u.id), "session open");
                inner.state.clone()
            }
            ConnectionPhase::Close if update.is_logged_out() => {
                warn!("session logged out remotely, not reconnecting");
                self.reset_session();
                ConnectionState::disconnected()
            }
            ConnectionPhase::Close => {
                {
                    let mut inner = self.inner.lock();
                    inner.phase = SessionPhase::Connecting;
                    inner.state = ConnectionState::disconnected();
                }
                warn!(reason = reason.as_deref().unwrap_or("unknown"), "session closed");
                self.schedule_reconnect(generation);
                ConnectionState::disconnected()
            }
            ConnectionPhase::Connecting => {
                let mut inner = self.inner.lock();
                inner.phase = SessionPhase::Connecting;
                inner.state.connected = false;
                inner.state.clone()
            }
        };

        self.bus.publish(SessionEvent::ConnectionUpdate {
            phase,
            state,
            reason,
        });
    }

    fn schedule_reconnect(&self, generation: u64) {
        let weak = self.this.clone();
        let delay = self.config.reconnect_delay;
        info!(?delay, "scheduling reconnect");

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(this) = weak.upgrade() else {
                return;
            };
            {
                let mut inner = this.inner.lock();
                if inner.generation != generation || inner.phase != SessionPhase::Connecting {
                    debug!(generation, "reconnect no longer needed");
                    return;
                }
                // detach our own handle so initialize() does not abort this task
                drop(inner.reconnect.take());
            }
            counter!("session_reconnects_total").increment(1);
            this.initialize().await;
        });

        let mut inner = self.inner.lock();
        if let Some(previous) = inner.reconnect.replace(handle) {
            previous.abort();
        }
    }

    /// Drop the socket and every piece of session state, credentials included.
    fn reset_session(&self) {
        let socket = {
            let mut inner = self.inner.lock();
            inner.generation += 1;
            inner.phase = SessionPhase::Uninitialized;
            inner.state = ConnectionState::disconnected();
            inner.challenge = None;
            inner.abort_reconnect();
            // detached, not aborted: this may run on the pump itself
            drop(inner.pump.take());
            inner.socket.take()
        };
        if let Some(socket) = socket {
            socket.close();
        }
        self.store.lock().clear_all();
        if let Some(store) = &self.credentials {
            if let Err(e) = store.clear() {
                warn!(error = %e, "failed to delete credentials");
            }
        }
    }
}

fn user_from_me(me: RawMe) -> UserIdentity {
    UserIdentity {
        id: me.id,
        display_name: me.name.or(me.verified_name),
        picture_url: None,
    }
}
