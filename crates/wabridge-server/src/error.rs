//! HTTP error responses.
//!
//! Every failure leaves the server as `{"error": ..., "details": ...}` with
//! the status chosen from the [`RelayError`] variant: bad input is 400, a
//! missing or wrong secret is 401, everything else is 500 carrying the
//! underlying message in `details`.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::warn;
use wabridge_core::RelayError;

/// An error rendered as a JSON response.
#[derive(Debug, thiserror::Error)]
#[error("{status}: {message}")]
pub struct ApiError {
    status: StatusCode,
    message: String,
    details: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a str>,
}

impl ApiError {
    /// Error with an explicit status.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: None,
        }
    }

    /// 400 with a caller-facing message.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// 401 with a caller-facing message.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    /// 500 with a summary and the underlying cause.
    pub fn internal(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
            details: Some(details.into()),
        }
    }

    /// Map a relay failure. `context` summarizes the operation for 500s.
    pub fn from_relay(context: &str, err: &RelayError) -> Self {
        match err {
            RelayError::InvalidAddress { .. } | RelayError::InvalidInput(_) => {
                Self::bad_request(err.to_string())
            }
            RelayError::Auth(message) => Self::unauthorized(message.clone()),
            RelayError::NotConnected | RelayError::Transport(_) | RelayError::Timeout(_) => {
                warn!(code = err.code(), error = %err, context, "request failed");
                Self::internal(context, err.to_string())
            }
        }
    }

    /// Response status.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Caller-facing message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: &self.message,
            details: self.details.as_deref(),
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn body_json(err: ApiError) -> (StatusCode, serde_json::Value) {
        let resp = err.into_response();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn invalid_address_is_bad_request() {
        let err = ApiError::from_relay(
            "Failed to send message",
            &RelayError::InvalidAddress { digits: 3 },
        );
        let (status, body) = body_json(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid phone number format"));
        assert!(body.get("details").is_none());
    }

    #[tokio::test]
    async fn not_connected_is_internal_with_details() {
        let err = ApiError::from_relay("Failed to send message", &RelayError::NotConnected);
        let (status, body) = body_json(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Failed to send message");
        assert_eq!(body["details"], "WhatsApp not connected");
    }

    #[tokio::test]
    async fn timeout_is_internal() {
        let err = ApiError::from_relay(
            "Failed to logout",
            &RelayError::Timeout(Duration::from_secs(10)),
        );
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message(), "Failed to logout");
    }

    #[tokio::test]
    async fn auth_is_unauthorized() {
        let err = ApiError::from_relay("ignored", &RelayError::Auth("Invalid password".into()));
        let (status, body) = body_json(err).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid password");
    }
}
