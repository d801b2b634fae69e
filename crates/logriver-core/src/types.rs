//! Core types shared across the client: [`Severity`], [`LogName`] and the
//! [`LogRecord`] handed to the emitter.

use std::sync::LazyLock;

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;

use crate::error::{LogError, Result};

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// Upper-cased, non-empty severity tag.
///
/// `INFO` and `ERROR` are the tags the plain logger uses; any other
/// caller-supplied tag is accepted and normalised the same way.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Severity(String);

impl Severity {
    pub const INFO: &'static str = "INFO";
    pub const ERROR: &'static str = "ERROR";

    pub fn new(tag: &str) -> Result<Self> {
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(LogError::EmptySeverity);
        }
        Ok(Severity(tag.to_uppercase()))
    }

    pub fn info() -> Self {
        Severity(Self::INFO.to_string())
    }

    pub fn error() -> Self {
        Severity(Self::ERROR.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for Severity {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self> {
        Severity::new(s)
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// LogName
// ---------------------------------------------------------------------------

static LOG_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9-][A-Za-z0-9_.-]*$").expect("log name pattern is valid")
});

/// Name of one logical log stream.
///
/// The name doubles as the index document type and is embedded in the
/// broker exchange/queue names, so it is restricted to characters every
/// collaborator accepts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogName(String);

impl LogName {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if LOG_NAME.is_match(&name) {
            Ok(LogName(name))
        } else {
            Err(LogError::InvalidLogName(name))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Exchange and queue name: `<namespace>.<name>`.
    pub fn routing_destination(&self, namespace: &str) -> String {
        format!("{namespace}.{}", self.0)
    }

    /// River registration name: `<namespace>_<name>`.
    pub fn river_name(&self, namespace: &str) -> String {
        format!("{namespace}_{}", self.0)
    }
}

impl std::fmt::Display for LogName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// LogRecord
// ---------------------------------------------------------------------------

/// One logical log entry, built at emit/flush time and consumed by the
/// envelope encoder.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub severity: Severity,
    /// A string for plain logging; an array or object for a flushed batch.
    pub message: serde_json::Value,
    pub timestamp: Option<DateTime<Utc>>,
}

impl LogRecord {
    /// Build a record stamped with the current UTC time.
    pub fn new(severity: Severity, message: serde_json::Value) -> Self {
        Self {
            severity,
            message,
            timestamp: Some(Utc::now()),
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// ISO-8601 with millisecond precision and an explicit `+00:00` offset, the
/// form the index's `date_time` field format parses.
pub fn iso8601(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, false)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
