//! Relay error taxonomy.

use std::time::Duration;

/// Machine-readable code for [`RelayError::NotConnected`].
pub const NOT_CONNECTED: &str = "NOT_CONNECTED";
/// Machine-readable code for [`RelayError::InvalidAddress`].
pub const INVALID_ADDRESS: &str = "INVALID_ADDRESS";
/// Machine-readable code for [`RelayError::InvalidInput`].
pub const INVALID_INPUT: &str = "INVALID_INPUT";
/// Machine-readable code for [`RelayError::Transport`] and [`RelayError::Timeout`].
pub const TRANSPORT_ERROR: &str = "TRANSPORT_ERROR";
/// Machine-readable code for [`RelayError::Auth`].
pub const AUTH_ERROR: &str = "AUTH_ERROR";

/// Errors raised by the session connector and the request surface.
///
/// The store and the event bus never produce these for normal flow.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// An operation needing a live session was attempted while disconnected.
    #[error("WhatsApp not connected")]
    NotConnected,

    /// Phone number outside the accepted digit range.
    #[error("Invalid phone number format ({digits} digits)")]
    InvalidAddress {
        /// Digit count after stripping non-digits.
        digits: usize,
    },

    /// Malformed request parameter.
    #[error("{0}")]
    InvalidInput(String),

    /// The underlying network call failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The underlying network call did not finish in time.
    #[error("transport timed out after {0:?}")]
    Timeout(Duration),

    /// Missing or wrong shared secret.
    #[error("{0}")]
    Auth(String),
}

impl RelayError {
    /// Machine-readable error code for this variant.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotConnected => NOT_CONNECTED,
            Self::InvalidAddress { .. } => INVALID_ADDRESS,
            Self::InvalidInput(_) => INVALID_INPUT,
            Self::Transport(_) | Self::Timeout(_) => TRANSPORT_ERROR,
            Self::Auth(_) => AUTH_ERROR,
        }
    }

    /// Whether the caller sent bad input (as opposed to a server-side failure).
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidAddress { .. } | Self::InvalidInput(_))
    }
}

/// Result type for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
