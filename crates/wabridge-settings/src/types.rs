//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so partial
//! JSON files are accepted; missing fields get their production default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Fallback session directory when the configured one is unsafe.
pub const DEFAULT_SESSION_PATH: &str = "./auth_info";

/// Root settings type.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WabridgeSettings {
    /// HTTP / push-channel server.
    pub server: ServerSettings,
    /// Session connector.
    pub session: SessionSettings,
    /// Outbound webhook.
    pub webhook: WebhookSettings,
    /// Shared-secret gate.
    pub auth: AuthSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

/// Server network settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Maximum concurrent push-channel clients.
    pub max_connections: usize,
    /// Interval between server pings on the push channel.
    pub heartbeat_interval_secs: u64,
    /// Silence after which a push client is dropped.
    pub heartbeat_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            max_connections: 50,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 60,
        }
    }
}

/// Session connector settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Directory holding persisted pairing credentials.
    pub session_path: String,
    /// WebSocket URL of the protocol sidecar.
    pub sidecar_url: String,
    /// Fixed delay before reconnecting after a drop.
    pub reconnect_delay_ms: u64,
    /// Upper bound on a single send.
    pub send_timeout_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            session_path: DEFAULT_SESSION_PATH.to_string(),
            sidecar_url: "ws://127.0.0.1:3002".to_string(),
            reconnect_delay_ms: 5_000,
            send_timeout_ms: 10_000,
        }
    }
}

impl SessionSettings {
    /// Session directory, with paths directly under `/auth` replaced by
    /// [`DEFAULT_SESSION_PATH`].
    pub fn resolved_session_path(&self) -> PathBuf {
        let path = Path::new(&self.session_path);
        let under_root_auth =
            path.starts_with("/auth") && path.components().count() <= 3;
        if under_root_auth {
            tracing::warn!(
                path = %self.session_path,
                "dangerous session path detected, using relative path instead"
            );
            PathBuf::from(DEFAULT_SESSION_PATH)
        } else {
            path.to_path_buf()
        }
    }

    /// Reconnect delay as a `Duration`.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Send timeout as a `Duration`.
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

/// Outbound webhook settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebhookSettings {
    /// Initial target URL; can be changed at runtime.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Upper bound on one POST.
    pub timeout_ms: u64,
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            url: None,
            timeout_ms: 10_000,
        }
    }
}

impl WebhookSettings {
    /// POST timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Shared-secret settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// Dashboard and API password. Generated at startup when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// `tracing` filter directive, e.g. `info` or `wabridge_runtime=debug`.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = WabridgeSettings::default();
        assert_eq!(s.server.port, 3001);
        assert_eq!(s.session.session_path, "./auth_info");
        assert_eq!(s.session.reconnect_delay(), Duration::from_secs(5));
        assert_eq!(s.session.send_timeout(), Duration::from_secs(10));
        assert_eq!(s.webhook.timeout(), Duration::from_secs(10));
        assert!(s.webhook.url.is_none());
        assert!(s.auth.password.is_none());
        assert_eq!(s.logging.level, "info");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: WabridgeSettings =
            serde_json::from_str(r#"{"server": {"port": 8080}}"#).unwrap();
        assert_eq!(s.server.port, 8080);
        assert_eq!(s.server.host, "0.0.0.0");
        assert_eq!(s.session.reconnect_delay_ms, 5_000);
    }

    #[test]
    fn camel_case_keys() {
        let v = serde_json::to_value(WabridgeSettings::default()).unwrap();
        assert!(v["session"]["sessionPath"].is_string());
        assert!(v["server"]["maxConnections"].is_number());
    }

    #[test]
    fn root_auth_path_is_replaced() {
        let s = SessionSettings {
            session_path: "/auth".into(),
            ..SessionSettings::default()
        };
        assert_eq!(s.resolved_session_path(), PathBuf::from(DEFAULT_SESSION_PATH));

        let s = SessionSettings {
            session_path: "/auth/info".into(),
            ..SessionSettings::default()
        };
        assert_eq!(s.resolved_session_path(), PathBuf::from(DEFAULT_SESSION_PATH));
    }

    #[test]
    fn deep_auth_path_is_kept() {
        let s = SessionSettings {
            session_path: "/auth/relay/session/data".into(),
            ..SessionSettings::default()
        };
        assert_eq!(
            s.resolved_session_path(),
            PathBuf::from("/auth/relay/session/data")
        );
    }

    #[test]
    fn ordinary_path_is_kept() {
        let s = SessionSettings {
            session_path: "/var/lib/wabridge".into(),
            ..SessionSettings::default()
        };
        assert_eq!(s.resolved_session_path(), PathBuf::from("/var/lib/wabridge"));
    }
}
