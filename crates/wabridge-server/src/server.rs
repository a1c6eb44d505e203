//! `RelayServer`: Axum HTTP + `WebSocket` server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Json, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use uuid::Uuid;
use wabridge_runtime::RelayApi;

use crate::auth::{self, SharedSecret};
use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::health::{self, HealthResponse};
use crate::routes;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::broadcast::BroadcastManager;
use crate::websocket::session::{Heartbeat, run_ws_session};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Request surface over the session.
    pub api: RelayApi,
    /// Password guarding `/api/*` and `/ws`.
    pub secret: SharedSecret,
    /// Push-channel client registry.
    pub broadcast: Arc<BroadcastManager>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Listener and push-channel settings.
    pub config: Arc<ServerConfig>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`.
    pub metrics: PrometheusHandle,
}

/// The relay's HTTP front end.
pub struct RelayServer {
    config: Arc<ServerConfig>,
    api: RelayApi,
    secret: SharedSecret,
    broadcast: Arc<BroadcastManager>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: PrometheusHandle,
}

impl RelayServer {
    /// Create a server. Nothing is bound until [`Self::listen`].
    pub fn new(
        config: ServerConfig,
        api: RelayApi,
        secret: SharedSecret,
        metrics: PrometheusHandle,
    ) -> Self {
        Self {
            config: Arc::new(config),
            api,
            secret,
            broadcast: Arc::new(BroadcastManager::new()),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics,
        }
    }

    fn state(&self) -> AppState {
        AppState {
            api: self.api.clone(),
            secret: self.secret.clone(),
            broadcast: self.broadcast.clone(),
            shutdown: self.shutdown.clone(),
            config: self.config.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = self.state();
        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/ws", get(ws_handler))
            .merge(routes::router(&state))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(CorsLayer::permissive()),
            )
            .with_state(state)
    }

    /// Bind and serve in the background until shutdown.
    ///
    /// Returns the bound address (useful with port 0) and the serve task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(self.config.bind_address()).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();

        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = result {
                error!(error = %e, "server stopped with error");
            }
            info!("server stopped");
        });

        info!(%addr, "listening");
        Ok((addr, handle))
    }

    /// Push-channel client registry.
    pub fn broadcast(&self) -> &Arc<BroadcastManager> {
        &self.broadcast
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Request surface.
    pub fn api(&self) -> &RelayApi {
        &self.api
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let connections = state.broadcast.connection_count().await;
    Json(health::health_check(state.start_time, connections))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    crate::metrics::render(&state.metrics)
}

/// Query of `GET /ws`.
#[derive(Debug, Default, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

/// GET /ws: authenticate, then upgrade to a push session.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<WsQuery>,
) -> Result<Response, ApiError> {
    let candidate = auth::header_credential(&headers)
        .or(query.token.as_deref())
        .filter(|c| !c.is_empty());
    auth::authorize(&state.secret, candidate)?;

    if state.broadcast.connection_count().await >= state.config.max_connections {
        return Err(ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "Too many connections",
        ));
    }

    let client_id = format!("client_{}", Uuid::now_v7().simple());
    let heartbeat = Heartbeat {
        interval: state.config.heartbeat_interval(),
        timeout: state.config.heartbeat_timeout(),
        queue_capacity: state.config.client_queue_capacity,
    };
    let broadcast = state.broadcast.clone();
    let cancel = state.shutdown.token();
    Ok(ws
        .max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| run_ws_session(socket, client_id, broadcast, heartbeat, cancel)))
}
