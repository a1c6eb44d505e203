//! Rendering of raw message payloads into display summaries.
//!
//! The network delivers message bodies as a JSON object keyed by content
//! kind (`conversation`, `extendedTextMessage`, `imageMessage`, ...). Text is
//! shown as-is; media gets a tagged placeholder.

use serde_json::Value;

/// Summary used when no known content kind is present.
pub const MEDIA_FALLBACK: &str = "Media message";

/// Render a payload into the summary stored on messages and chats.
pub fn summarize(payload: Option<&Value>) -> String {
    let Some(payload) = payload else {
        return MEDIA_FALLBACK.to_owned();
    };

    if let Some(text) = str_at(payload, &["conversation"]) {
        return text.to_owned();
    }
    if let Some(text) = str_at(payload, &["extendedTextMessage", "text"]) {
        return text.to_owned();
    }
    if payload.get("imageMessage").is_some() {
        return tagged("📷", str_at(payload, &["imageMessage", "caption"]), "Image");
    }
    if payload.get("videoMessage").is_some() {
        return tagged("🎥", str_at(payload, &["videoMessage", "caption"]), "Video");
    }
    if payload.get("audioMessage").is_some() {
        return "🎵 Audio message".to_owned();
    }
    if payload.get("documentMessage").is_some() {
        return tagged(
            "📄",
            str_at(payload, &["documentMessage", "fileName"]),
            "Document",
        );
    }
    MEDIA_FALLBACK.to_owned()
}

fn tagged(icon: &str, label: Option<&str>, fallback: &str) -> String {
    format!("{icon} {}", label.unwrap_or(fallback))
}

fn str_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    path.iter()
        .try_fold(value, |v, key| v.get(key))?
        .as_str()
        .filter(|s| !s.is_empty())
}
