//! Query facet: filtered match-all searches over one log stream's documents.
//!
//! Independent of the write path. A [`SearchRequest`] carries pagination,
//! sort and up to three filters (severity equality, inclusive lower and upper
//! timestamp bounds) that are AND-ed together.
//!
//! Timestamp bounds and the default sort apply to the stream's timestamp
//! field: `timestamp` when payloads embed one, the index's automatic
//! `_timestamp` otherwise. [`Query`] sets it from the emitter configuration.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::collaborator::IndexClient;
use crate::error::{LogError, Result};
use crate::types::{iso8601, LogName};

/// Timestamp field carried in the payload.
pub const TIMESTAMP_FIELD: &str = "timestamp";
/// Timestamp field the index stamps when payloads carry none.
pub const AUTO_TIMESTAMP_FIELD: &str = "_timestamp";
pub const DEFAULT_SIZE: usize = 20;

// ---------------------------------------------------------------------------
// TimeBound
// ---------------------------------------------------------------------------

/// A timestamp filter bound: a datetime (normalised to ISO-8601) or a
/// string passed through as-is.
#[derive(Debug, Clone, PartialEq)]
pub enum TimeBound {
    At(DateTime<Utc>),
    Raw(String),
}

impl TimeBound {
    pub fn to_iso8601(&self) -> String {
        match self {
            TimeBound::At(ts) => iso8601(ts),
            TimeBound::Raw(s) => s.clone(),
        }
    }
}

impl From<DateTime<Utc>> for TimeBound {
    fn from(ts: DateTime<Utc>) -> Self {
        TimeBound::At(ts)
    }
}

impl From<&str> for TimeBound {
    fn from(s: &str) -> Self {
        TimeBound::Raw(s.to_string())
    }
}

impl From<String> for TimeBound {
    fn from(s: String) -> Self {
        TimeBound::Raw(s)
    }
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOp {
    Gte,
    Lte,
}

impl RangeOp {
    fn as_str(self) -> &'static str {
        match self {
            RangeOp::Gte => "gte",
            RangeOp::Lte => "lte",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Exact equality on a string field.
    Term { field: String, value: String },
    /// One inclusive bound on a date field.
    Range { field: String, op: RangeOp, value: String },
    And(Vec<Filter>),
}

impl Filter {
    /// The filter in the index's query DSL.
    pub fn to_json(&self) -> Value {
        match self {
            Filter::Term { field, value } => json!({ "term": { field.as_str(): value } }),
            Filter::Range { field, op, value } => {
                json!({ "range": { field.as_str(): { op.as_str(): value } } })
            }
            Filter::And(filters) => {
                json!({ "and": filters.iter().map(Filter::to_json).collect::<Vec<_>>() })
            }
        }
    }

    /// Evaluate against a document's field map. Dates are compared as
    /// instants when both sides parse as RFC 3339, otherwise as strings.
    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Filter::Term { field, value } => {
                doc.get(field).and_then(Value::as_str) == Some(value.as_str())
            }
            Filter::Range { field, op, value } => {
                let Some(actual) = doc.get(field).and_then(Value::as_str) else {
                    return false;
                };
                let ordering = match (parse_instant(actual), parse_instant(value)) {
                    (Some(a), Some(b)) => a.cmp(&b),
                    _ => actual.cmp(value.as_str()),
                };
                match op {
                    RangeOp::Gte => ordering.is_ge(),
                    RangeOp::Lte => ordering.is_le(),
                }
            }
            Filter::And(filters) => filters.iter().all(|f| f.matches(doc)),
        }
    }
}

fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

// ---------------------------------------------------------------------------
// SearchRequest
// ---------------------------------------------------------------------------

/// Builder for a filtered, paginated search.
///
/// ```rust
/// # use logriver_core::query::SearchRequest;
/// let request = SearchRequest::new()
///     .severity("ERROR")
///     .timestamp_from("2024-03-01T00:00:00+00:00")
///     .size(50);
/// assert!(request.filter().is_some());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    /// Sort field; `None` sorts by the timestamp field.
    pub sort: Option<String>,
    pub timestamp_field: String,
    pub start: usize,
    pub size: usize,
    pub severity: Option<String>,
    pub timestamp_from: Option<TimeBound>,
    pub timestamp_till: Option<TimeBound>,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            sort: None,
            timestamp_field: TIMESTAMP_FIELD.to_string(),
            start: 0,
            size: DEFAULT_SIZE,
            severity: None,
            timestamp_from: None,
            timestamp_till: None,
        }
    }
}

impl SearchRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sort(mut self, field: impl Into<String>) -> Self {
        self.sort = Some(field.into());
        self
    }

    /// Field the timestamp bounds and the default sort apply to.
    pub fn timestamp_field(mut self, field: impl Into<String>) -> Self {
        self.timestamp_field = field.into();
        self
    }

    pub fn sort_field(&self) -> &str {
        self.sort.as_deref().unwrap_or(&self.timestamp_field)
    }

    pub fn start(mut self, start: usize) -> Self {
        self.start = start;
        self
    }

    pub fn size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    /// Severities are stored upper-cased, so the filter value is too.
    pub fn severity(mut self, severity: &str) -> Self {
        self.severity = Some(severity.trim().to_uppercase());
        self
    }

    pub fn timestamp_from(mut self, bound: impl Into<TimeBound>) -> Self {
        self.timestamp_from = Some(bound.into());
        self
    }

    pub fn timestamp_till(mut self, bound: impl Into<TimeBound>) -> Self {
        self.timestamp_till = Some(bound.into());
        self
    }

    /// AND of every supplied restriction; `None` when nothing was supplied.
    pub fn filter(&self) -> Option<Filter> {
        let mut filters = Vec::new();

        if let Some(severity) = &self.severity {
            filters.push(Filter::Term {
                field: "severity".to_string(),
                value: severity.clone(),
            });
        }
        if let Some(from) = &self.timestamp_from {
            filters.push(Filter::Range {
                field: self.timestamp_field.clone(),
                op: RangeOp::Gte,
                value: from.to_iso8601(),
            });
        }
        if let Some(till) = &self.timestamp_till {
            filters.push(Filter::Range {
                field: self.timestamp_field.clone(),
                op: RangeOp::Lte,
                value: till.to_iso8601(),
            });
        }

        (!filters.is_empty()).then_some(Filter::And(filters))
    }

    /// Request body in the index's query DSL.
    pub fn to_json(&self) -> Value {
        let mut filtered = json!({ "query": { "match_all": {} } });
        if let Some(filter) = self.filter() {
            filtered["filter"] = filter.to_json();
        }
        json!({
            "query": { "filtered": filtered },
            "from": self.start,
            "size": self.size,
            "sort": [self.sort_field()],
        })
    }
}

// ---------------------------------------------------------------------------
// SearchResponse
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub id: String,
    /// The stored document with the log-name wrapper removed:
    /// `{"severity": .., "msg": .., "timestamp": ..}`.
    pub source: Value,
}

impl Hit {
    /// Build a hit from a stored `_source`, unwrapping the single-key
    /// `{"<log_name>": {...}}` wrapper the envelope puts around the payload.
    pub fn from_source(id: impl Into<String>, doc_type: &str, source: Value) -> Self {
        Self {
            id: id.into(),
            source: unwrap_document(doc_type, source),
        }
    }
}

/// Strip the `{"<doc_type>": {...}}` wrapper, if present.
pub fn unwrap_document(doc_type: &str, source: Value) -> Value {
    match source {
        Value::Object(mut map) if map.len() == 1 && map.contains_key(doc_type) => {
            map.remove(doc_type).unwrap_or(Value::Null)
        }
        other => other,
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Number of matching documents, before pagination.
    pub total: u64,
    pub hits: Vec<Hit>,
}

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

/// Search handle for one log stream.
#[derive(Clone)]
pub struct Query {
    index: Arc<dyn IndexClient>,
    index_name: String,
    log_name: LogName,
    timestamp_field: String,
}

impl Query {
    pub fn new(index: Arc<dyn IndexClient>, index_name: impl Into<String>, log_name: LogName) -> Self {
        Self {
            index,
            index_name: index_name.into(),
            log_name,
            timestamp_field: TIMESTAMP_FIELD.to_string(),
        }
    }

    /// Query against the index's automatic `_timestamp` instead of the
    /// payload's `timestamp`.
    pub fn with_auto_timestamp(mut self) -> Self {
        self.timestamp_field = AUTO_TIMESTAMP_FIELD.to_string();
        self
    }

    pub fn timestamp_field(&self) -> &str {
        &self.timestamp_field
    }

    /// Run `request` with its timestamp bounds and default sort pointed at
    /// this stream's timestamp field.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let request = request.clone().timestamp_field(self.timestamp_field.as_str());
        self.index
            .search(&self.index_name, self.log_name.as_str(), &request)
            .await
            .map_err(LogError::Query)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
