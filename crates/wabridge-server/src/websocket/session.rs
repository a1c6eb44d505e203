//! Push-channel session lifecycle, from upgrade through disconnect.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::broadcast::BroadcastManager;
use super::connection::ClientConnection;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};

/// Frame type sent once right after the upgrade.
pub const CONNECTION_ESTABLISHED: &str = "connection_established";

/// Ping cadence for one push session.
#[derive(Clone, Copy, Debug)]
pub struct Heartbeat {
    /// Interval between server pings.
    pub interval: Duration,
    /// Silence after which the client is dropped.
    pub timeout: Duration,
    /// Outbound frames buffered before drops start.
    pub queue_capacity: usize,
}

/// First frame of every session.
pub fn established_frame(client_id: &str) -> serde_json::Value {
    serde_json::json!({
        "type": CONNECTION_ESTABLISHED,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "data": { "clientId": client_id },
    })
}

/// Run a push session for one connected client.
///
/// The client only receives: text and binary frames it sends are ignored,
/// pings and pongs count as liveness. The session ends on close, on a
/// missed pong deadline, or when `cancel` fires.
#[instrument(skip_all, fields(client_id = %client_id))]
pub async fn run_ws_session(
    ws: WebSocket,
    client_id: String,
    broadcast: Arc<BroadcastManager>,
    heartbeat: Heartbeat,
    cancel: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(heartbeat.queue_capacity.max(1));
    let connection = Arc::new(ClientConnection::new(client_id.clone(), send_tx));

    let connection_start = Instant::now();
    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    if let Ok(json) = serde_json::to_string(&established_frame(&client_id)) {
        let _ = ws_tx.send(Message::Text(json.into())).await;
    }

    broadcast.add(connection.clone()).await;

    // Fires when the writer stops for any reason, so the reader stops too.
    let writer_done = CancellationToken::new();
    let outbound_done = writer_done.clone().drop_guard();
    let outbound_conn = connection.clone();
    let outbound_cancel = cancel.clone();
    let outbound = tokio::spawn(async move {
        let _done = outbound_done;
        let mut ping_interval = tokio::time::interval(heartbeat.interval);
        // The first tick fires immediately.
        let _ = ping_interval.tick().await;

        loop {
            tokio::select! {
                frame = send_rx.recv() => {
                    let Some(frame) = frame else { break };
                    if ws_tx.send(Message::Text(frame.to_string().into())).await.is_err() {
                        break;
                    }
                }
                _ = ping_interval.tick() => {
                    if !outbound_conn.check_alive()
                        && outbound_conn.last_pong_elapsed() > heartbeat.timeout
                    {
                        warn!(timeout = ?heartbeat.timeout, "client unresponsive, disconnecting");
                        break;
                    }
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
                () = outbound_cancel.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    loop {
        let msg = tokio::select! {
            msg = ws_rx.next() => msg,
            () = cancel.cancelled() => break,
            () = writer_done.cancelled() => {
                debug!("writer stopped");
                break;
            }
        };
        let Some(Ok(msg)) = msg else { break };
        match msg {
            Message::Close(_) => {
                info!("client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => connection.mark_alive(),
            Message::Text(_) | Message::Binary(_) => {
                debug!("ignoring client frame");
            }
        }
    }

    info!(dropped = connection.drop_count(), "client disconnected");
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection_start.elapsed().as_secs_f64());
    broadcast.remove(&client_id).await;
    if cancel.is_cancelled() {
        // Let the writer flush its close frame.
        let _ = tokio::time::timeout(Duration::from_secs(1), outbound).await;
    } else {
        outbound.abort();
    }
}
