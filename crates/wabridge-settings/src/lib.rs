//! # wabridge-settings
//!
//! Configuration for the WhatsApp relay, loaded from three layers (in
//! priority order):
//! 1. **Compiled defaults**: [`WabridgeSettings::default()`]
//! 2. **Settings file**: JSON, deep-merged over defaults
//! 3. **Environment variables**: `PORT`, `SESSION_PATH`, `API_PASSWORD`, ...
//!
//! Settings are loaded once by the binary and passed down explicitly.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, deep_merge, load_settings_from_path};
pub use types::*;
