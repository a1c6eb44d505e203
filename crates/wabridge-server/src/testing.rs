//! Fixtures shared by the in-crate route tests.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::Value;
use wabridge_runtime::testutil::{self, ScriptedFactory};
use wabridge_runtime::{ConnectorConfig, EventBus, RelayApi, SessionConnector, WebhookSender};
use wabridge_runtime::webhook::DEFAULT_WEBHOOK_TIMEOUT;

use crate::auth::SharedSecret;
use crate::config::ServerConfig;
use crate::server::RelayServer;

pub(crate) const SECRET: &str = "test-secret";

pub(crate) struct TestServer {
    pub server: RelayServer,
    pub factory: Arc<ScriptedFactory>,
}

impl TestServer {
    pub fn connector(&self) -> &Arc<SessionConnector> {
        self.server.api().connector()
    }

    /// Initialize and drive the scripted socket to an open session.
    pub async fn open_session(&self) {
        self.connector().initialize().await;
        let _ = self
            .factory
            .emit(testutil::open("5511000000000@s.whatsapp.net", None))
            .await;
        eventually(|| self.connector().connection_state().connected).await;
    }
}

pub(crate) fn make_server() -> TestServer {
    let factory = Arc::new(ScriptedFactory::new());
    let connector = SessionConnector::new(
        factory.clone(),
        None,
        Arc::new(EventBus::new()),
        ConnectorConfig {
            reconnect_delay: Duration::from_millis(50),
            ..ConnectorConfig::default()
        },
    );
    let webhook = Arc::new(WebhookSender::new(None, DEFAULT_WEBHOOK_TIMEOUT));
    let handle = PrometheusBuilder::new().build_recorder().handle();
    let server = RelayServer::new(
        ServerConfig::default(),
        RelayApi::new(connector, webhook),
        SharedSecret::new(SECRET),
        handle,
    );
    TestServer { server, factory }
}

pub(crate) fn authed(method: &str, uri: &str, body: Body) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {SECRET}"))
        .header("content-type", "application/json")
        .body(body)
        .unwrap()
}

pub(crate) async fn read_json(resp: Response) -> (StatusCode, Value) {
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), 1_000_000)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

/// Poll `check` until it holds, failing after two seconds.
pub(crate) async fn eventually(check: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
