//! Fixed instants and message corpora used across harnesses.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};

pub const LOG_NAME: &str = "applog";
pub const INDEX_NAME: &str = "pylogger";

/// `2013-05-01T12:00:00Z` plus `minutes`.
pub fn instant(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2013, 5, 1, 12, 0, 0).single().unwrap() + chrono::Duration::minutes(minutes)
}

/// Severity, minute offset and message for a small history of a service.
pub fn history() -> Vec<(&'static str, i64, Value)> {
    vec![
        ("INFO", 0, json!("service started")),
        ("INFO", 1, json!({"user": "alice", "action": "login"})),
        ("ERROR", 2, json!(["db timeout", "retrying"])),
        ("INFO", 3, json!({"user": "bob", "action": "login"})),
        ("ERROR", 4, json!("db unreachable")),
        ("ERROR", 5, json!({"errors": 3})),
        ("INFO", 6, json!("service stopped")),
    ]
}
