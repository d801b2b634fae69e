//! Narrow interfaces to the two external systems: the message broker
//! ([`Transport`]) and the search index ([`IndexClient`]).
//!
//! Concrete implementations live in `logriver-backends`.

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;

use crate::config::{BrokerConfig, EmitterConfig};
use crate::error::{IndexError, TransportError};
use crate::query::{SearchRequest, SearchResponse};
use crate::types::LogName;

// ---------------------------------------------------------------------------
// Broker
// ---------------------------------------------------------------------------

/// Exchange kind. Only direct exchanges are used: one exchange per log stream,
/// one bound queue, empty routing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeKind {
    Direct,
}

impl std::fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExchangeKind::Direct => write!(f, "direct"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeSpec {
    pub name: String,
    pub kind: ExchangeKind,
    pub durable: bool,
    pub auto_delete: bool,
}

impl ExchangeSpec {
    pub fn for_log(log_name: &LogName, namespace: &str) -> Self {
        Self {
            name: log_name.routing_destination(namespace),
            kind: ExchangeKind::Direct,
            durable: true,
            auto_delete: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSpec {
    pub name: String,
    pub durable: bool,
    pub auto_delete: bool,
}

impl QueueSpec {
    pub fn for_log(log_name: &LogName, namespace: &str) -> Self {
        Self {
            name: log_name.routing_destination(namespace),
            durable: true,
            auto_delete: true,
        }
    }
}

/// Routing key used for every bind and publish.
pub const ROUTING_KEY: &str = "";

/// Message broker capabilities needed by the client.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn declare_exchange(&self, spec: &ExchangeSpec) -> Result<(), TransportError>;

    async fn declare_queue(&self, spec: &QueueSpec) -> Result<(), TransportError>;

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), TransportError>;

    /// Publish an opaque payload. Returns once the broker has accepted it.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: Bytes,
    ) -> Result<(), TransportError>;
}

// ---------------------------------------------------------------------------
// Search index
// ---------------------------------------------------------------------------

/// Registration document for the standing ingestion pipeline that drains a
/// log stream's queue into the index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiverSpec {
    pub name: String,
    pub index_name: String,
    pub index_type: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub vhost: String,
    pub exchange: String,
    pub exchange_type: ExchangeKind,
    pub exchange_durable: bool,
    pub routing_key: String,
    pub queue: String,
    pub queue_durable: bool,
    pub queue_auto_delete: bool,
}

impl RiverSpec {
    pub fn for_log(
        log_name: &LogName,
        index_name: &str,
        broker: &BrokerConfig,
        emitter: &EmitterConfig,
    ) -> Self {
        let exchange = ExchangeSpec::for_log(log_name, &emitter.namespace);
        let queue = QueueSpec::for_log(log_name, &emitter.namespace);
        Self {
            name: log_name.river_name(&emitter.namespace),
            index_name: index_name.to_string(),
            index_type: log_name.to_string(),
            host: broker.host.clone(),
            port: broker.port,
            user: broker.userid.clone(),
            password: broker.password.clone(),
            vhost: broker.virtual_host.clone(),
            exchange: exchange.name,
            exchange_type: exchange.kind,
            exchange_durable: exchange.durable,
            routing_key: ROUTING_KEY.to_string(),
            queue: queue.name,
            queue_durable: queue.durable,
            queue_auto_delete: queue.auto_delete,
        }
    }
}

/// Search index capabilities needed by the client.
#[async_trait]
pub trait IndexClient: Send + Sync {
    /// Create `index`. Fails with [`IndexError::AlreadyExists`] if it exists.
    async fn create_index(&self, index: &str) -> Result<(), IndexError>;

    async fn put_mapping(
        &self,
        index: &str,
        doc_type: &str,
        mapping: &serde_json::Value,
    ) -> Result<(), IndexError>;

    async fn create_river(&self, river: &RiverSpec) -> Result<(), IndexError>;

    async fn search(
        &self,
        index: &str,
        doc_type: &str,
        request: &SearchRequest,
    ) -> Result<SearchResponse, IndexError>;
}
