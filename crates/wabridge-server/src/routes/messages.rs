//! `/api/messages`: outbound text.

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::ApiError;
use crate::server::AppState;

/// Body of `POST /api/messages/text`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SendTextRequest {
    /// Phone number in any formatting, as a string or a JSON number.
    pub number: Option<Value>,
    /// Message text.
    pub text: Option<String>,
}

impl SendTextRequest {
    fn number(&self) -> String {
        match &self.number {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        }
    }
}

/// Message routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/api/messages/text", post(send_text))
}

/// POST /api/messages/text
async fn send_text(
    State(state): State<AppState>,
    body: Result<Json<SendTextRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(req) = body?;
    let receipt = state
        .api
        .send_message(&req.number(), req.text.as_deref().unwrap_or_default())
        .await
        .map_err(|e| ApiError::from_relay("Failed to send message", &e))?;
    Ok(Json(json!({
        "success": true,
        "message": "Message sent successfully",
        "data": receipt,
    })))
}
