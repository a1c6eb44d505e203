//! End-to-end tests over a real listener: HTTP with `reqwest`, the push
//! channel with `tokio-tungstenite`, webhook targets with `wiremock`.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::{Value, json};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use wabridge_core::EventKind;
use wabridge_runtime::testutil::{self, ScriptedFactory};
use wabridge_runtime::webhook::DEFAULT_WEBHOOK_TIMEOUT;
use wabridge_runtime::{ConnectorConfig, EventBus, RelayApi, SessionConnector, WebhookSender};
use wabridge_server::{EventBridge, RelayServer, ServerConfig, SharedSecret};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(5);
const SECRET: &str = "integration-secret";
const SELF_ID: &str = "5511000000000@s.whatsapp.net";
const PEER: &str = "5511999998888@s.whatsapp.net";

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

struct Harness {
    base: String,
    ws_url: String,
    server: Arc<RelayServer>,
    factory: Arc<ScriptedFactory>,
    http: reqwest::Client,
}

/// Boot a relay over a scripted socket, with push bridge and webhook wired.
async fn boot() -> Harness {
    boot_with(ServerConfig::default()).await
}

async fn boot_with(config: ServerConfig) -> Harness {
    let factory = Arc::new(ScriptedFactory::new());
    let bus = Arc::new(EventBus::new());
    let connector = SessionConnector::new(
        factory.clone(),
        None,
        bus.clone(),
        ConnectorConfig {
            reconnect_delay: Duration::from_millis(50),
            ..ConnectorConfig::default()
        },
    );
    let webhook = Arc::new(WebhookSender::new(None, DEFAULT_WEBHOOK_TIMEOUT));
    let _ = bus.subscribe_listener(&[EventKind::MessageUpsert], webhook.clone());

    let handle = PrometheusBuilder::new().build_recorder().handle();
    let server = Arc::new(RelayServer::new(
        config,
        RelayApi::new(connector, webhook),
        SharedSecret::new(SECRET),
        handle,
    ));

    let bridge = EventBridge::new(
        bus.subscribe("push", &EventKind::ALL),
        server.broadcast().clone(),
    );
    let _bridge = tokio::spawn(bridge.run(server.shutdown().token()));

    let (addr, _handle) = server.listen().await.unwrap();
    Harness {
        base: format!("http://{addr}"),
        ws_url: format!("ws://{addr}/ws?token={SECRET}"),
        server,
        factory,
        http: reqwest::Client::new(),
    }
}

impl Harness {
    async fn get(&self, route: &str) -> (u16, Value) {
        let resp = self
            .http
            .get(format!("{}{route}", self.base))
            .bearer_auth(SECRET)
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }

    async fn post(&self, route: &str, body: Value) -> (u16, Value) {
        let resp = self
            .http
            .post(format!("{}{route}", self.base))
            .bearer_auth(SECRET)
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }

    async fn connect_and_open(&self) {
        let (status, _) = self.post("/api/session/connect", json!({})).await;
        assert_eq!(status, 200);
        wait_until(|| self.factory.sender().is_some()).await;
        assert!(self.factory.emit(testutil::open(SELF_ID, Some("Ops"))).await);
        wait_until(|| self.server.api().connector().connection_state().connected).await;
    }
}

async fn wait_until(check: impl Fn() -> bool) {
    timeout(TIMEOUT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn read_json(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timeout waiting for message")
            .expect("stream closed")
            .expect("ws error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Skip frames until one of `event_type` arrives.
async fn read_event(ws: &mut WsStream, event_type: &str) -> Value {
    loop {
        let frame = read_json(ws).await;
        if frame["type"] == event_type {
            return frame;
        }
    }
}

async fn open_push(h: &Harness) -> WsStream {
    let (mut ws, _) = connect_async(h.ws_url.as_str()).await.unwrap();
    let hello = read_json(&mut ws).await;
    assert_eq!(hello["type"], "connection_established");
    wait_until_async(|| async { h.server.broadcast().connection_count().await == 1 }).await;
    ws
}

async fn wait_until_async<F, Fut>(check: F)
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    timeout(TIMEOUT, async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn e2e_health_is_public() {
    let h = boot().await;
    let resp = reqwest::get(format!("{}/health", h.base)).await.unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["connections"], 0);
}

#[tokio::test]
async fn e2e_protected_routes_need_secret() {
    let h = boot().await;
    let resp = h
        .http
        .get(format!("{}/api/chats", h.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 401);

    let resp = h
        .http
        .get(format!("{}/api/chats", h.base))
        .header("authorization", SECRET)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
}

#[tokio::test]
async fn e2e_login_returns_token() {
    let h = boot().await;
    let resp = h
        .http
        .post(format!("{}/api/auth/login", h.base))
        .json(&json!({ "password": SECRET }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["token"], SECRET);
}

#[tokio::test]
async fn e2e_push_channel_rejects_bad_token() {
    let h = boot().await;
    let url = h.ws_url.replace(SECRET, "wrong");
    assert!(connect_async(url.as_str()).await.is_err());
    assert_eq!(h.server.broadcast().connection_count().await, 0);
}

#[tokio::test]
async fn e2e_pairing_code_reaches_push_clients() {
    let h = boot().await;
    let mut ws = open_push(&h).await;

    let (_, body) = h.post("/api/session/connect", json!({})).await;
    assert_eq!(body["message"], "Connection initialized successfully");
    wait_until(|| h.factory.sender().is_some()).await;
    assert!(h.factory.emit(testutil::qr("2@pairing")).await);

    let frame = read_event(&mut ws, "qr_code").await;
    assert_eq!(frame["data"], "2@pairing");

    let (_, qr) = h.get("/api/session/qr").await;
    assert_eq!(qr["qr"], "2@pairing");
    assert_eq!(qr["connected"], false);
}

#[tokio::test]
async fn e2e_inbound_message_flow() {
    let h = boot().await;
    let mut ws = open_push(&h).await;
    h.connect_and_open().await;

    let frame = read_event(&mut ws, "connection_update").await;
    assert_eq!(frame["data"]["connection"], "open");

    assert!(h.factory.emit(testutil::text(PEER, "m1", "hello there", false, 1_700_000_000)).await);
    let frame = read_event(&mut ws, "message_upsert").await;
    assert_eq!(frame["data"]["chatId"], PEER);
    assert_eq!(frame["data"]["body"], "hello there");

    let (_, chats) = h.get("/api/chats").await;
    assert_eq!(chats.as_array().unwrap().len(), 1);
    assert_eq!(chats[0]["unreadCount"], 1);

    let (_, messages) = h.get(&format!("/api/chats/{PEER}/messages")).await;
    assert_eq!(messages[0]["messageId"], "m1");

    let (status, unknown) = h.get("/api/chats/nobody@s.whatsapp.net/messages").await;
    assert_eq!(status, 200);
    assert_eq!(unknown, json!([]));
}

#[tokio::test]
async fn e2e_send_text() {
    let h = boot().await;

    let (status, body) = h
        .post("/api/messages/text", json!({ "number": "5511999998888", "text": "hi" }))
        .await;
    assert_eq!(status, 500);
    assert_eq!(body["details"], "WhatsApp not connected");

    h.connect_and_open().await;
    let (status, body) = h
        .post("/api/messages/text", json!({ "number": "+55 11 99999-8888", "text": "hi" }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["chatId"], PEER);

    let (status, _) = h
        .post("/api/messages/text", json!({ "number": "abc123", "text": "hi" }))
        .await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn e2e_webhook_receives_inbound_only() {
    let h = boot().await;
    let target = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&target)
        .await;

    let hook_url = format!("{}/hook", target.uri());
    let (status, body) = h
        .post("/api/session/webhook", json!({ "url": hook_url }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["url"], hook_url);

    h.connect_and_open().await;
    assert!(h.factory.emit(testutil::text(PEER, "own", "mine", true, 1)).await);
    assert!(h.factory.emit(testutil::text(PEER, "in1", "theirs", false, 2)).await);

    wait_until_async(|| async {
        target
            .received_requests()
            .await
            .is_some_and(|r| !r.is_empty())
    })
    .await;
    // Give a stray second delivery time to show up.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let requests = target.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["event"], "message");
    assert_eq!(body["data"]["messageId"], "in1");
}

#[tokio::test]
async fn e2e_logout_resets_session() {
    let h = boot().await;
    let mut ws = open_push(&h).await;
    h.connect_and_open().await;
    let _ = read_event(&mut ws, "connection_update").await;

    let (status, body) = h.post("/api/session/logout", json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(body["message"], "Logged out successfully");
    assert!(h.factory.socket().unwrap().logged_out());

    let frame = read_event(&mut ws, "connection_update").await;
    assert_eq!(frame["data"]["connection"], "close");
    assert_eq!(frame["data"]["connected"], false);

    let (_, status_body) = h.get("/api/session/status").await;
    assert_eq!(status_body["connected"], false);
}

#[tokio::test]
async fn e2e_shutdown_closes_push_clients() {
    let h = boot().await;
    let mut ws = open_push(&h).await;

    h.server.shutdown().shutdown();
    let ended = timeout(TIMEOUT, async {
        loop {
            match ws.next().await {
                None | Some(Err(_) | Ok(Message::Close(_))) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(ended.is_ok());
    wait_until_async(|| async { h.server.broadcast().connection_count().await == 0 }).await;
}

#[tokio::test]
async fn e2e_unresponsive_push_client_is_dropped() {
    let h = boot_with(ServerConfig {
        heartbeat_interval_secs: 1,
        heartbeat_timeout_secs: 1,
        ..ServerConfig::default()
    })
    .await;

    // Never polled again, so pings go unanswered.
    let _ws = open_push(&h).await;
    wait_until_async(|| async { h.server.broadcast().connection_count().await == 0 }).await;

    let body: Value = reqwest::get(format!("{}/health", h.base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["connections"], 0);
}
