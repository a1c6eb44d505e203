//! # wabridge-runtime
//!
//! The moving parts of the relay:
//!
//! - [`socket`]: transport traits and the raw protocol event vocabulary
//! - [`sidecar`]: JSON-over-WebSocket transport to the protocol sidecar
//! - [`credentials`]: pairing credential persistence
//! - [`store`]: chat roster and bounded message history
//! - [`bus`]: ordered, non-blocking event fan-out
//! - [`webhook`]: outbound POST per inbound message
//! - [`connector`]: the session state machine tying it together
//! - [`surface`]: validated operations for remote callers

#![deny(unsafe_code)]

pub mod bus;
pub mod connector;
pub mod credentials;
pub mod sidecar;
pub mod socket;
pub mod store;
pub mod surface;
pub mod webhook;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use bus::{EventBus, EventListener, ListenerError, Subscription, SubscriptionId};
pub use connector::{ConnectorConfig, SessionConnector, SessionPhase};
pub use credentials::CredentialStore;
pub use sidecar::SidecarSocketFactory;
pub use socket::{SendReceipt, SocketError, SocketFactory, WaSocket};
pub use store::ChatStore;
pub use surface::{PairingView, RelayApi};
pub use webhook::WebhookSender;
