//! Server configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the HTTP and push-channel listener.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent push-channel connections.
    pub max_connections: usize,
    /// Seconds between server pings on the push channel.
    pub heartbeat_interval_secs: u64,
    /// Seconds without a pong before a push client is dropped.
    pub heartbeat_timeout_secs: u64,
    /// Max inbound `WebSocket` message size in bytes.
    pub max_message_size: usize,
    /// Outbound frames buffered per push client before drops start.
    pub client_queue_capacity: usize,
}

impl ServerConfig {
    /// Ping interval as a `Duration`.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    /// Pong timeout as a `Duration`.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs.max(1))
    }

    /// `host:port` string for binding.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 50,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 60,
            max_message_size: 64 * 1024,
            client_queue_capacity: 1024,
        }
    }
}
