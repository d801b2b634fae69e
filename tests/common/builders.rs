//! Builders for memory-backed clients and pre-indexed histories.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use logriver::backends::{MemoryBroker, MemoryIndex, StoredDocument};
use logriver::{Config, Envelope, LogClient, LogName, LogRecord, Severity};

use super::fixtures::{instant, INDEX_NAME};

/// A client wired to a fresh in-process broker and index.
pub struct MemoryHarness {
    pub broker: Arc<MemoryBroker>,
    pub index: Arc<MemoryIndex>,
    pub client: LogClient,
}

impl MemoryHarness {
    /// Documents the river has relayed for the harness's log.
    pub fn documents(&self) -> Vec<StoredDocument> {
        self.index
            .documents(&self.client.config().index.index_name, self.client.log_name().as_str())
    }

    /// Only the `msg` field of each relayed document, in arrival order.
    pub fn messages(&self) -> Vec<Value> {
        self.documents().into_iter().map(|d| d.source["msg"].clone()).collect()
    }

    /// Index `record` directly, bypassing the broker, so its timestamp is
    /// exactly the one given.
    pub fn index_at(&self, severity: &str, at: DateTime<Utc>, message: Value) {
        let record = LogRecord::new(Severity::new(severity).unwrap(), message).at(at);
        let body = Envelope::encode(INDEX_NAME, self.client.log_name(), &record, true).unwrap();
        self.index.bulk(&body).unwrap();
    }

    /// Index every `(severity, minute offset, message)` entry.
    pub fn index_history(&self, history: Vec<(&str, i64, Value)>) {
        for (severity, minutes, message) in history {
            self.index_at(severity, instant(minutes), message);
        }
    }
}

/// Provision `log_name` against a fresh in-process broker and index with the
/// built-in configuration.
pub async fn memory_client(log_name: &str) -> MemoryHarness {
    memory_client_with(Config::defaults(), log_name).await
}

pub async fn memory_client_with(config: Config, log_name: &str) -> MemoryHarness {
    let index = MemoryIndex::new();
    let broker = MemoryBroker::new(index.clone());
    let client = LogClient::connect(config, log_name, broker.clone(), index.clone())
        .await
        .expect("memory provisioning never fails");
    MemoryHarness {
        broker,
        index,
        client,
    }
}

pub fn log_name(name: &str) -> LogName {
    LogName::new(name).unwrap()
}
