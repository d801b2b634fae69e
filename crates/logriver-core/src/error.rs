//! Error types for logriver-core.
//!
//! Collaborators report their own failures ([`TransportError`] for the broker,
//! [`IndexError`] for the search index); everything surfaced to callers of the
//! client is a [`LogError`].

use std::time::Duration;

/// Failure reported by a broker [`Transport`](crate::Transport).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("cannot connect to broker: {0}")]
    Connect(String),
    #[error("broker rejected the request: {0}")]
    Rejected(String),
    #[error("broker channel closed")]
    Closed,
}

/// Failure reported by an [`IndexClient`](crate::IndexClient).
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// The index already exists. Provisioning treats this as success.
    #[error("index {0:?} already exists")]
    AlreadyExists(String),
    #[error("index returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("index request failed: {0}")]
    Request(String),
    #[error("cannot decode index response: {0}")]
    Decode(String),
}

/// Why a single envelope could not be delivered.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),
}

/// Crate-level error.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// Index, exchange or queue setup failed at startup.
    #[error("provisioning failed at {step}: {source}")]
    Provisioning {
        step: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("delivery failed: {0}")]
    Delivery(#[from] DeliveryError),
    /// A deferred action named an unknown operation or carried bad arguments.
    #[error("cannot invoke {operation:?}: {reason}")]
    Invocation { operation: String, reason: String },
    #[error("value is not representable as JSON: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("severity must not be empty")]
    EmptySeverity,
    #[error("invalid log name {0:?}")]
    InvalidLogName(String),
    #[error("{found} buffer cannot take a {expected} append")]
    BufferKind {
        expected: &'static str,
        found: &'static str,
    },
    #[error("query failed: {0}")]
    Query(#[source] IndexError),
    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

impl LogError {
    pub(crate) fn provisioning(
        step: &'static str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        LogError::Provisioning {
            step,
            source: Box::new(source),
        }
    }

    pub(crate) fn invocation(operation: &str, reason: impl Into<String>) -> Self {
        LogError::Invocation {
            operation: operation.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = LogError> = std::result::Result<T, E>;
