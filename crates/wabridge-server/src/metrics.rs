//! Prometheus metrics recorder and `/metrics` rendering.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the global Prometheus recorder.
///
/// Call once at startup, before anything records. The returned handle
/// renders the `/metrics` body.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric names recorded across the workspace.

/// Push-channel connections opened (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Push-channel connections closed (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Open push-channel connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Push-channel connection lifetime (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Push frames dropped on full client queues (counter).
pub const WS_BROADCAST_DROPS_TOTAL: &str = "ws_broadcast_drops_total";
/// Rejected credentials on `/api/*` and `/ws` (counter).
pub const AUTH_FAILURES_TOTAL: &str = "auth_failures_total";
/// Session events dropped on full bus subscriber queues (counter).
pub const EVENT_BUS_DROPS_TOTAL: &str = "event_bus_drops_total";
/// Inbound messages stored (counter).
pub const MESSAGES_RECEIVED_TOTAL: &str = "messages_received_total";
/// Outbound text messages accepted by the network (counter).
pub const MESSAGES_SENT_TOTAL: &str = "messages_sent_total";
/// Failed webhook deliveries (counter).
pub const WEBHOOK_FAILURES_TOTAL: &str = "webhook_failures_total";
/// Scheduled reconnect attempts (counter).
pub const SESSION_RECONNECTS_TOTAL: &str = "session_reconnects_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_without_global_install() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            metrics::counter!(MESSAGES_SENT_TOTAL).increment(3);
        });
        let output = render(&handle);
        assert!(output.contains("messages_sent_total 3"), "{output}");
    }

    #[test]
    fn metric_constants_are_snake_case() {
        let names = [
            WS_CONNECTIONS_TOTAL,
            WS_DISCONNECTIONS_TOTAL,
            WS_CONNECTIONS_ACTIVE,
            WS_CONNECTION_DURATION_SECONDS,
            WS_BROADCAST_DROPS_TOTAL,
            AUTH_FAILURES_TOTAL,
            EVENT_BUS_DROPS_TOTAL,
            MESSAGES_RECEIVED_TOTAL,
            MESSAGES_SENT_TOTAL,
            WEBHOOK_FAILURES_TOTAL,
            SESSION_RECONNECTS_TOTAL,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
