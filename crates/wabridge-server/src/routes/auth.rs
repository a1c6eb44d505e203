//! `/api/auth`: password login and credential check.

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use metrics::counter;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::auth::{INVALID_CREDENTIAL, header_credential};
use crate::metrics::AUTH_FAILURES_TOTAL;
use crate::server::AppState;

/// Body of `POST /api/auth/login`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    /// The shared secret.
    pub password: Option<String>,
}

/// Auth routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/status", get(status))
}

/// POST /api/auth/login
///
/// The token handed back is the password itself; clients send it as
/// `Authorization: Bearer <token>`.
async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    let password = body
        .ok()
        .and_then(|Json(req)| req.password)
        .filter(|p| !p.is_empty());
    let Some(password) = password else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Password is required", "success": false })),
        );
    };

    if state.secret.verify(&password) {
        (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": "Authentication successful",
                "token": password,
            })),
        )
    } else {
        counter!(AUTH_FAILURES_TOTAL).increment(1);
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": INVALID_CREDENTIAL, "success": false })),
        )
    }
}

/// GET /api/auth/status
async fn status(State(state): State<AppState>, headers: HeaderMap) -> Json<Value> {
    let authenticated = header_credential(&headers).is_some_and(|c| state.secret.verify(c));
    Json(json!({
        "authenticated": authenticated,
        "passwordSet": state.secret.is_set(),
    }))
}
