//! `/api/chats`: roster and per-chat history.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use wabridge_core::{Chat, Message};

use crate::error::ApiError;
use crate::server::AppState;

/// Query of `GET /api/chats/{id}/messages`.
#[derive(Debug, Default, Deserialize)]
pub struct MessagesQuery {
    /// Requested count; unparsable values fall back to the default.
    pub limit: Option<String>,
}

impl MessagesQuery {
    fn limit(&self) -> Option<i64> {
        self.limit.as_deref().and_then(|l| l.trim().parse().ok())
    }
}

/// Chat routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/chats", get(list_chats))
        .route("/api/chats/{id}/messages", get(chat_messages))
}

/// GET /api/chats
async fn list_chats(State(state): State<AppState>) -> Json<Vec<Chat>> {
    Json(state.api.list_chats())
}

/// GET /api/chats/{id}/messages?limit=
async fn chat_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<Vec<Message>>, ApiError> {
    state
        .api
        .get_chat_messages(&id, query.limit())
        .map(Json)
        .map_err(|e| ApiError::from_relay("Failed to fetch chat messages", &e))
}
