//! # wabridge-server
//!
//! Axum HTTP + `WebSocket` front end for the relay.
//!
//! - REST routes over [`wabridge_runtime::RelayApi`] (session, messages, chats)
//! - Shared-secret authentication for `/api/*` and the push channel
//! - `WebSocket` push channel fed from the session event bus
//! - Health check, Prometheus `/metrics`, graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod auth;
pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod routes;
pub mod server;
pub mod shutdown;
pub mod websocket;

#[cfg(test)]
mod testing;

pub use auth::SharedSecret;
pub use config::ServerConfig;
pub use error::ApiError;
pub use server::{AppState, RelayServer};
pub use websocket::event_bridge::EventBridge;
