//! logriver: buffered logging through a message broker into a search index.
//!
//! This crate re-exports the core layers and the collaborator backends so that
//! the CLI and the integration harnesses import them from one place.
//!
//! # Architecture
//!
//! ```text
//! Logger / BatchLogger ──► Emitter ──► broker ──► river ──► index
//!                                                             │
//!                                           Query ◄───────────┘
//! ```

pub use logriver_backends as backends;
pub use logriver_core::*;

/// Interpret a command-line message: JSON if it parses, a plain string
/// otherwise.
pub fn parse_message(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

/// Split a `key=value` pair; the value goes through [`parse_message`].
pub fn parse_keyed(raw: &str) -> Option<(String, serde_json::Value)> {
    let (key, value) = raw.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), parse_message(value)))
}
