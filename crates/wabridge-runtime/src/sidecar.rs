//! WebSocket client for the protocol sidecar.
//!
//! The WhatsApp protocol runs in a separate process that speaks JSON over a
//! WebSocket:
//!
//! - request: `{"id": 7, "method": "sendMessage", "params": {...}}`
//! - response: `{"id": 7, "ok": true, "result": ...}` or
//!   `{"id": 7, "ok": false, "error": "..."}`
//! - notification: `{"event": "messages.upsert", "data": {...}}`
//!
//! One handler task owns the stream. When the stream ends without a local
//! close, pending requests fail and a synthetic `close` update is emitted so
//! the connector schedules a reconnect.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use wabridge_core::ConnectionPhase;

use crate::socket::{
    RawConnectionUpdate, RawDisconnect, RawEvent, SendReceipt, SocketError, SocketFactory,
    SocketHandle, WaSocket,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Pending request waiting for its response.
type PendingTx = oneshot::Sender<Result<Value, String>>;

/// Raw events buffered between the handler task and the connector.
const EVENT_QUEUE_CAPACITY: usize = 256;

/// Status code of the synthetic close emitted when the sidecar goes away.
const CONNECTION_LOST_STATUS: u16 = 408;

/// Opens sessions through a sidecar.
pub struct SidecarSocketFactory {
    url: String,
    session_path: PathBuf,
    request_timeout: Duration,
}

impl SidecarSocketFactory {
    /// Factory connecting to `url`; `session_path` is forwarded to the sidecar.
    pub fn new(url: impl Into<String>, session_path: PathBuf, request_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            session_path,
            request_timeout,
        }
    }
}

#[async_trait]
impl SocketFactory for SidecarSocketFactory {
    async fn connect(&self, credentials: Option<Value>) -> Result<SocketHandle, SocketError> {
        let (ws, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| SocketError::Connect(format!("{}: {e}", self.url)))?;
        info!(url = %self.url, "connected to protocol sidecar");

        let (cmd_tx, cmd_rx) = mpsc::channel::<Command>(64);
        let (event_tx, events) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let cancel = CancellationToken::new();
        drop(tokio::spawn(handler_loop(ws, cmd_rx, event_tx, cancel.clone())));

        let socket = Arc::new(SidecarSocket {
            cmd_tx,
            cancel,
            request_timeout: self.request_timeout,
        });

        let params = json!({
            "sessionPath": self.session_path.to_string_lossy(),
            "credentials": credentials,
        });
        if let Err(e) = socket.request("connect", params).await {
            socket.close();
            return Err(SocketError::Connect(e.to_string()));
        }

        Ok(SocketHandle { socket, events })
    }
}

struct Command {
    method: &'static str,
    params: Value,
    response_tx: PendingTx,
}

/// Command side of a sidecar session.
pub struct SidecarSocket {
    cmd_tx: mpsc::Sender<Command>,
    cancel: CancellationToken,
    request_timeout: Duration,
}

impl SidecarSocket {
    async fn request(&self, method: &'static str, params: Value) -> Result<Value, SocketError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command {
                method,
                params,
                response_tx: tx,
            })
            .await
            .map_err(|_| SocketError::Closed)?;

        let result = tokio::time::timeout(self.request_timeout, rx)
            .await
            .map_err(|_| SocketError::Request(format!("{method} timed out")))?
            .map_err(|_| SocketError::Closed)?;

        result.map_err(SocketError::Request)
    }
}

#[async_trait]
impl WaSocket for SidecarSocket {
    async fn send_text(&self, jid: &str, text: &str) -> Result<SendReceipt, SocketError> {
        let result = self
            .request("sendMessage", json!({ "jid": jid, "text": text }))
            .await?;
        serde_json::from_value(result)
            .map_err(|e| SocketError::Protocol(format!("bad sendMessage result: {e}")))
    }

    async fn logout(&self) -> Result<(), SocketError> {
        let _ = self.request("logout", json!({})).await?;
        Ok(())
    }

    async fn profile_picture_url(&self, jid: &str) -> Result<Option<String>, SocketError> {
        let result = self
            .request("profilePictureUrl", json!({ "jid": jid }))
            .await?;
        Ok(result.as_str().map(String::from))
    }

    fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for SidecarSocket {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Frame received from the sidecar.
#[derive(Deserialize)]
#[serde(untagged)]
enum Frame {
    Response(ResponseFrame),
    Event(RawEvent),
}

#[derive(Deserialize)]
struct ResponseFrame {
    id: u64,
    ok: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

impl ResponseFrame {
    fn into_result(self) -> Result<Value, String> {
        if self.ok {
            Ok(self.result)
        } else {
            Err(self.error.unwrap_or_else(|| "sidecar error".into()))
        }
    }
}

/// In-flight requests keyed by id.
#[derive(Default)]
struct PendingRequests {
    waiting: HashMap<u64, PendingTx>,
}

impl PendingRequests {
    /// Track a request, forgetting any whose caller gave up (timed out).
    fn insert(&mut self, id: u64, tx: PendingTx) {
        self.waiting.retain(|_, tx| !tx.is_closed());
        let _ = self.waiting.insert(id, tx);
    }

    fn complete(&mut self, id: u64, result: Result<Value, String>) {
        if let Some(tx) = self.waiting.remove(&id) {
            let _ = tx.send(result);
        }
    }

    fn fail_all(&mut self, reason: &str) {
        for (_, tx) in self.waiting.drain() {
            let _ = tx.send(Err(reason.to_string()));
        }
    }

    fn len(&self) -> usize {
        self.waiting.len()
    }

    fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }
}

async fn handler_loop(
    ws: WsStream,
    mut cmd_rx: mpsc::Receiver<Command>,
    event_tx: mpsc::Sender<RawEvent>,
    cancel: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let mut pending = PendingRequests::default();
    let mut next_id: u64 = 1;

    let reason = loop {
        tokio::select! {
            () = cancel.cancelled() => {
                let _ = ws_tx.send(WsMessage::Close(None)).await;
                break None;
            }
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { break None };
                let id = next_id;
                next_id += 1;
                let frame = json!({
                    "id": id,
                    "method": cmd.method,
                    "params": cmd.params,
                });
                if let Err(e) = ws_tx.send(WsMessage::Text(frame.to_string().into())).await {
                    let _ = cmd.response_tx.send(Err(e.to_string()));
                    break Some(format!("sidecar write failed: {e}"));
                }
                pending.insert(id, cmd.response_tx);
            }
            msg = ws_rx.next() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => break Some(format!("sidecar read failed: {e}")),
                    None => break Some("sidecar connection lost".to_string()),
                };
                let text = match msg {
                    WsMessage::Text(text) => text,
                    WsMessage::Close(_) => break Some("sidecar closed the connection".to_string()),
                    _ => continue,
                };
                match serde_json::from_str::<Frame>(&text) {
                    Ok(Frame::Response(response)) => {
                        pending.complete(response.id, response.into_result());
                    }
                    Ok(Frame::Event(event)) => {
                        if event_tx.send(event).await.is_err() {
                            break None;
                        }
                    }
                    Err(e) => debug!(error = %e, "ignoring unrecognized sidecar frame"),
                }
            }
        }
    };

    if !pending.is_empty() {
        debug!(count = pending.len(), "failing in-flight sidecar requests");
    }
    pending.fail_all("socket closed");

    if let Some(reason) = reason {
        warn!(%reason, "sidecar session ended");
        let update = RawConnectionUpdate {
            connection: Some(ConnectionPhase::Close),
            last_disconnect: Some(RawDisconnect {
                status_code: Some(CONNECTION_LOST_STATUS),
                message: Some(reason),
            }),
            ..RawConnectionUpdate::default()
        };
        let _ = event_tx.send(RawEvent::ConnectionUpdate(update)).await;
    } else {
        debug!("sidecar session closed");
    }
}
