//! # wabridge
//!
//! WhatsApp session relay binary: loads settings, wires the session
//! connector, webhook, and push bridge, then serves HTTP until ctrl-c.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use wabridge_core::EventKind;
use wabridge_runtime::{
    ConnectorConfig, CredentialStore, EventBus, RelayApi, SessionConnector, SidecarSocketFactory,
    WebhookSender,
};
use wabridge_server::{EventBridge, RelayServer, ServerConfig, SharedSecret};
use wabridge_settings::WabridgeSettings;

/// WhatsApp session relay.
#[derive(Parser, Debug)]
#[command(name = "wabridge", version, about = "WhatsApp session relay")]
struct Cli {
    /// Settings file (JSON). A missing file means defaults.
    #[arg(long, default_value = "wabridge.json")]
    config: PathBuf,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Protocol sidecar WebSocket URL (overrides settings).
    #[arg(long)]
    sidecar_url: Option<String>,
}

impl Cli {
    /// Command-line flags win over file and environment.
    fn apply(&self, settings: &mut WabridgeSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(url) = &self.sidecar_url {
            settings.session.sidecar_url.clone_from(url);
        }
    }
}

fn server_config(settings: &WabridgeSettings) -> ServerConfig {
    ServerConfig {
        host: settings.server.host.clone(),
        port: settings.server.port,
        max_connections: settings.server.max_connections,
        heartbeat_interval_secs: settings.server.heartbeat_interval_secs,
        heartbeat_timeout_secs: settings.server.heartbeat_timeout_secs,
        ..ServerConfig::default()
    }
}

fn connector_config(settings: &WabridgeSettings) -> ConnectorConfig {
    ConnectorConfig {
        reconnect_delay: settings.session.reconnect_delay(),
        send_timeout: settings.session.send_timeout(),
        ..ConnectorConfig::default()
    }
}

fn ensure_session_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)
        .with_context(|| format!("Failed to create session directory: {}", path.display()))
}

fn print_generated_password(password: &str) {
    let rule = "=".repeat(60);
    eprintln!("{rule}");
    eprintln!("WABRIDGE LOGIN PASSWORD");
    eprintln!("{rule}");
    eprintln!("Password: {password}");
    eprintln!("{rule}");
    eprintln!("Save this password: it is not shown again.");
    eprintln!("It is also the API key for /api/* and /ws.");
    eprintln!("{rule}");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let mut settings = wabridge_settings::load_settings_from_path(&args.config)
        .with_context(|| format!("Failed to load settings from {}", args.config.display()))?;
    args.apply(&mut settings);

    wabridge_core::logging::init_subscriber(&settings.logging.level);
    let metrics_handle = wabridge_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    let session_path = settings.session.resolved_session_path();
    ensure_session_dir(&session_path)?;

    let secret = SharedSecret::from_config(settings.auth.password.as_deref());
    if secret.was_generated() {
        print_generated_password(secret.expose());
    }

    // Session: sidecar transport, persisted credentials, event bus
    let bus = Arc::new(EventBus::new());
    let factory = Arc::new(SidecarSocketFactory::new(
        settings.session.sidecar_url.clone(),
        session_path.clone(),
        settings.session.send_timeout(),
    ));
    let connector = SessionConnector::new(
        factory,
        Some(CredentialStore::new(&session_path)),
        bus.clone(),
        connector_config(&settings),
    );

    let webhook = Arc::new(WebhookSender::new(
        settings.webhook.url.clone(),
        settings.webhook.timeout(),
    ));
    let (_, webhook_task) = bus.subscribe_listener(&[EventKind::MessageUpsert], webhook.clone());

    let server = RelayServer::new(
        server_config(&settings),
        RelayApi::new(connector.clone(), webhook),
        secret,
        metrics_handle,
    );

    // Event bridge: session events → push clients
    let bridge = EventBridge::new(
        bus.subscribe("push", &EventKind::ALL),
        server.broadcast().clone(),
    );
    let bridge_task = tokio::spawn(bridge.run(server.shutdown().token()));

    let (addr, serve_task) = server
        .listen()
        .await
        .context("Failed to bind server")?;
    tracing::info!(
        %addr,
        sidecar = %settings.session.sidecar_url,
        session_path = %session_path.display(),
        "wabridge listening"
    );

    let init = Arc::clone(&connector);
    drop(tokio::spawn(async move { init.initialize().await }));

    server.shutdown().wait_for_signal().await;

    tracing::info!("Shutting down...");
    connector.shutdown();
    server
        .shutdown()
        .graceful_shutdown(vec![serve_task, bridge_task], None)
        .await;
    webhook_task.abort();

    tracing::info!("Shutdown complete");
    Ok(())
}
