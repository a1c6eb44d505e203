//! `/api/session`: connect, pairing code, status, logout, webhook.

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use wabridge_core::ConnectionState;
use wabridge_runtime::PairingView;

use crate::error::ApiError;
use crate::server::AppState;

/// Body of `POST /api/session/webhook`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WebhookRequest {
    /// New target; `null` or empty disables the webhook.
    pub url: Option<String>,
}

/// Session routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/session/connect", post(connect))
        .route("/api/session/qr", get(qr))
        .route("/api/session/status", get(status))
        .route("/api/session/logout", post(logout))
        .route("/api/session/webhook", post(webhook))
}

/// POST /api/session/connect
///
/// Starts the session in the background; progress arrives on the push
/// channel and through `/qr` and `/status`.
async fn connect(State(state): State<AppState>) -> Json<Value> {
    state.api.connect();
    Json(json!({ "message": "Connection initialized successfully" }))
}

/// GET /api/session/qr
async fn qr(State(state): State<AppState>) -> Json<PairingView> {
    Json(state.api.get_pairing_challenge())
}

/// GET /api/session/status
async fn status(State(state): State<AppState>) -> Json<ConnectionState> {
    Json(state.api.get_status().await)
}

/// POST /api/session/logout
async fn logout(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    state
        .api
        .logout()
        .await
        .map_err(|e| ApiError::from_relay("Failed to logout", &e))?;
    Ok(Json(json!({ "message": "Logged out successfully" })))
}

/// POST /api/session/webhook
async fn webhook(
    State(state): State<AppState>,
    body: Result<Json<WebhookRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(req) = body?;
    let url = state
        .api
        .set_webhook(req.url)
        .map_err(|e| ApiError::from_relay("Failed to set webhook", &e))?;
    Ok(Json(json!({ "message": "Webhook updated successfully", "url": url })))
}
