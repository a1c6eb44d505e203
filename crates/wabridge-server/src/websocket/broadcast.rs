//! Fan-out of push frames to every connected client.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::counter;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::connection::ClientConnection;
use super::event_bridge::PushEvent;
use crate::metrics::WS_BROADCAST_DROPS_TOTAL;

/// Registry of connected push clients.
pub struct BroadcastManager {
    connections: RwLock<HashMap<String, Arc<ClientConnection>>>,
}

impl BroadcastManager {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a connection, replacing any with the same id.
    pub async fn add(&self, connection: Arc<ClientConnection>) {
        let mut conns = self.connections.write().await;
        let _ = conns.insert(connection.id.clone(), connection);
    }

    /// Remove a connection by id.
    pub async fn remove(&self, connection_id: &str) {
        let mut conns = self.connections.write().await;
        let _ = conns.remove(connection_id);
    }

    /// Serialize once and enqueue on every client.
    ///
    /// A full or closed client queue drops the frame for that client only.
    pub async fn broadcast_all(&self, event: &PushEvent) {
        let json = match serde_json::to_string(event) {
            Ok(j) => Arc::new(j),
            Err(e) => {
                warn!(event_type = event.event_type, error = %e, "failed to serialize event");
                return;
            }
        };
        let conns = self.connections.read().await;
        debug!(
            event_type = event.event_type,
            recipients = conns.len(),
            "broadcast event to all"
        );
        for conn in conns.values() {
            if !conn.send(Arc::clone(&json)) {
                counter!(WS_BROADCAST_DROPS_TOTAL).increment(1);
                warn!(
                    conn_id = %conn.id,
                    event_type = event.event_type,
                    "failed to send event to client"
                );
            }
        }
    }

    /// Number of connected clients.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}

impl Default for BroadcastManager {
    fn default() -> Self {
        Self::new()
    }
}
