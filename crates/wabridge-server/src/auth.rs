//! Shared-secret authentication.
//!
//! One password guards `/api/session`, `/api/messages`, `/api/chats`, and
//! the push channel. Callers send it as `Authorization: Bearer <secret>` or
//! as the bare header value; the push channel also accepts `?token=`.

use std::fmt;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use metrics::counter;
use rand::Rng;
use rand::distr::Alphanumeric;
use tracing::debug;

use crate::error::ApiError;
use crate::metrics::AUTH_FAILURES_TOTAL;

/// Length of generated passwords.
pub const GENERATED_PASSWORD_LEN: usize = 32;

/// Message for requests without credentials.
pub const MISSING_CREDENTIAL: &str = "Authorization header required";
/// Message for requests with the wrong credential.
pub const INVALID_CREDENTIAL: &str = "Invalid password";

/// Random alphanumeric password.
pub fn generate_password() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_PASSWORD_LEN)
        .map(char::from)
        .collect()
}

/// The process-wide password.
#[derive(Clone)]
pub struct SharedSecret {
    password: Arc<str>,
    generated: bool,
}

impl SharedSecret {
    /// Wrap a configured password.
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: Arc::from(password.into()),
            generated: false,
        }
    }

    /// Use the configured password, or generate one when absent or empty.
    pub fn from_config(password: Option<&str>) -> Self {
        match password.filter(|p| !p.is_empty()) {
            Some(p) => Self::new(p),
            None => Self {
                password: Arc::from(generate_password()),
                generated: true,
            },
        }
    }

    /// Whether the password was generated at startup.
    pub fn was_generated(&self) -> bool {
        self.generated
    }

    /// Whether a non-empty password is in force.
    pub fn is_set(&self) -> bool {
        !self.password.is_empty()
    }

    /// The password itself, for printing once at startup.
    pub fn expose(&self) -> &str {
        &self.password
    }

    /// Compare without short-circuiting on the first differing byte.
    pub fn verify(&self, candidate: &str) -> bool {
        let expected = self.password.as_bytes();
        let candidate = candidate.as_bytes();
        if expected.is_empty() || expected.len() != candidate.len() {
            return false;
        }
        expected
            .iter()
            .zip(candidate)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedSecret")
            .field("password", &"<redacted>")
            .field("generated", &self.generated)
            .finish()
    }
}

/// Credential from an `Authorization` value, with or without `Bearer `.
pub fn strip_bearer(value: &str) -> &str {
    value.strip_prefix("Bearer ").unwrap_or(value)
}

/// Credential carried in the `Authorization` header, if any.
pub fn header_credential(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(strip_bearer)
        .filter(|v| !v.is_empty())
}

/// Check a presented credential, mapping failures to 401.
pub fn authorize(secret: &SharedSecret, candidate: Option<&str>) -> Result<(), ApiError> {
    let Some(candidate) = candidate else {
        counter!(AUTH_FAILURES_TOTAL).increment(1);
        return Err(ApiError::unauthorized(MISSING_CREDENTIAL));
    };
    if secret.verify(candidate) {
        Ok(())
    } else {
        counter!(AUTH_FAILURES_TOTAL).increment(1);
        debug!("rejected credential");
        Err(ApiError::unauthorized(INVALID_CREDENTIAL))
    }
}

/// Middleware guarding the protected `/api` routes.
pub async fn require_auth(
    State(secret): State<SharedSecret>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    authorize(&secret, header_credential(request.headers()))?;
    Ok(next.run(request).await)
}
