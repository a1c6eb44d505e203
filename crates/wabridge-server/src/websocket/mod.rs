//! Push channel: connection registry, per-client outbound queues, ping/pong
//! liveness, and the bridge from session events to client frames.

pub mod broadcast;
pub mod connection;
pub mod event_bridge;
pub mod session;
