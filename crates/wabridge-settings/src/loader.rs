//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`WabridgeSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::WabridgeSettings;

/// Load settings from a file path with env var overrides.
///
/// A missing file yields defaults; invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<WabridgeSettings> {
    let defaults = serde_json::to_value(WabridgeSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: WabridgeSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply process environment overrides.
pub fn apply_env_overrides(settings: &mut WabridgeSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Empty values are ignored; numeric values outside their range are ignored
/// with a warning.
pub fn apply_overrides_from<F>(settings: &mut WabridgeSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = read("PORT").and_then(|v| parse_ranged("PORT", &v, 1, 65_535)) {
        settings.server.port = u16::try_from(v).unwrap_or(settings.server.port);
    }
    if let Some(v) = read("HOST") {
        settings.server.host = v;
    }

    // ── Session ─────────────────────────────────────────────────────
    if let Some(v) = read("SESSION_PATH") {
        settings.session.session_path = v;
    }
    if let Some(v) = read("WA_SIDECAR_URL") {
        settings.session.sidecar_url = v;
    }
    if let Some(v) = read("RECONNECT_DELAY_MS")
        .and_then(|v| parse_ranged("RECONNECT_DELAY_MS", &v, 100, 3_600_000))
    {
        settings.session.reconnect_delay_ms = v;
    }
    if let Some(v) =
        read("SEND_TIMEOUT_MS").and_then(|v| parse_ranged("SEND_TIMEOUT_MS", &v, 100, 600_000))
    {
        settings.session.send_timeout_ms = v;
    }

    // ── Webhook / auth / logging ────────────────────────────────────
    if let Some(v) = read("WEBHOOK_URL") {
        settings.webhook.url = Some(v);
    }
    if let Some(v) = read("API_PASSWORD") {
        settings.auth.password = Some(v);
    }
    if let Some(v) = read("LOG_LEVEL") {
        settings.logging.level = v;
    }
}

/// Parse a string as a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

fn parse_ranged(key: &str, val: &str, min: u64, max: u64) -> Option<u64> {
    let result = parse_u64_range(val, min, max);
    if result.is_none() {
        tracing::warn!(key, value = %val, "invalid numeric env var, ignoring");
    }
    result
}
