//! # wabridge-core
//!
//! Shared vocabulary for the WhatsApp relay crates:
//!
//! - **Types**: `ConnectionState`, `UserIdentity`, `Chat`, `ChatPatch`, `Message`
//! - **Content**: rendering of raw message payloads into display summaries
//! - **Events**: `SessionEvent`, the tagged union fanned out to listeners
//! - **Addresses**: phone-number normalization and network address helpers
//! - **Errors**: `RelayError` taxonomy via `thiserror`
//! - **Logging**: `tracing` subscriber initialization

#![deny(unsafe_code)]

pub mod address;
pub mod content;
pub mod errors;
pub mod events;
pub mod logging;
pub mod types;

pub use errors::{RelayError, Result};
pub use events::{ConnectionPhase, EventKind, SessionEvent};
pub use types::{Chat, ChatPatch, ConnectionState, DeliveryStatus, Message, UserIdentity};
