//! In-process broker and index.
//!
//! [`MemoryBroker`] keeps exchanges, queues and bindings in memory. When a
//! queue is consumed by a river registered on the [`MemoryIndex`], every
//! publish is relayed straight away: the bulk envelope is parsed and its
//! documents are stored, the same way a standing river would do it.
//!
//! Used by the CLI's `--memory` mode and by the integration harnesses.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};

use logriver_core::collaborator::{ExchangeSpec, IndexClient, QueueSpec, RiverSpec, Transport};
use logriver_core::query::{unwrap_document, Hit, SearchRequest, SearchResponse};
use logriver_core::types::iso8601;
use logriver_core::{IndexError, TransportError};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// MemoryIndex
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub index: String,
    pub doc_type: String,
    pub id: String,
    /// Unwrapped payload fields.
    pub source: Value,
}

#[derive(Default)]
struct IndexState {
    indices: Vec<String>,
    mappings: HashMap<(String, String), Value>,
    rivers: HashMap<String, RiverSpec>,
    documents: Vec<StoredDocument>,
}

#[derive(Default)]
pub struct MemoryIndex {
    state: Mutex<IndexState>,
    next_id: AtomicU64,
}

impl MemoryIndex {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Apply a bulk body of `action\nsource\n` pairs. Returns how many
    /// documents were stored.
    pub fn bulk(&self, body: &str) -> Result<usize, IndexError> {
        let lines: Vec<&str> = body.lines().filter(|l| !l.trim().is_empty()).collect();
        if lines.len() % 2 != 0 {
            return Err(IndexError::Decode("bulk body has an action without a source".into()));
        }

        let mut stored = 0;
        for pair in lines.chunks(2) {
            let action: Value =
                serde_json::from_str(pair[0]).map_err(|e| IndexError::Decode(e.to_string()))?;
            let source: Value =
                serde_json::from_str(pair[1]).map_err(|e| IndexError::Decode(e.to_string()))?;

            let target = &action["index"];
            let (Some(index), Some(doc_type)) = (target["_index"].as_str(), target["_type"].as_str())
            else {
                return Err(IndexError::Decode(format!("not an index action: {}", pair[0])));
            };

            self.store(index, doc_type, source);
            stored += 1;
        }
        Ok(stored)
    }

    fn store(&self, index: &str, doc_type: &str, source: Value) {
        let mut source = unwrap_document(doc_type, source);
        let mut state = lock(&self.state);

        let auto_timestamp = state
            .mappings
            .get(&(index.to_string(), doc_type.to_string()))
            .is_some_and(|m| m["_timestamp"]["enabled"] == Value::Bool(true));
        if auto_timestamp {
            if let Value::Object(fields) = &mut source {
                fields.insert("_timestamp".to_string(), Value::String(iso8601(&Utc::now())));
            }
        }

        if !state.indices.iter().any(|i| i == index) {
            state.indices.push(index.to_string());
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        state.documents.push(StoredDocument {
            index: index.to_string(),
            doc_type: doc_type.to_string(),
            id: id.to_string(),
            source,
        });
    }

    pub fn documents(&self, index: &str, doc_type: &str) -> Vec<StoredDocument> {
        lock(&self.state)
            .documents
            .iter()
            .filter(|d| d.index == index && d.doc_type == doc_type)
            .cloned()
            .collect()
    }

    pub fn mapping(&self, index: &str, doc_type: &str) -> Option<Value> {
        lock(&self.state)
            .mappings
            .get(&(index.to_string(), doc_type.to_string()))
            .cloned()
    }

    pub fn river_for_queue(&self, queue: &str) -> Option<RiverSpec> {
        lock(&self.state)
            .rivers
            .values()
            .find(|r| r.queue == queue)
            .cloned()
    }
}

fn sort_key<'a>(doc: &'a StoredDocument, field: &str) -> Option<&'a str> {
    doc.source.get(field).and_then(Value::as_str)
}

#[async_trait]
impl IndexClient for MemoryIndex {
    async fn create_index(&self, index: &str) -> Result<(), IndexError> {
        let mut state = lock(&self.state);
        if state.indices.iter().any(|i| i == index) {
            return Err(IndexError::AlreadyExists(index.to_string()));
        }
        state.indices.push(index.to_string());
        Ok(())
    }

    async fn put_mapping(&self, index: &str, doc_type: &str, mapping: &Value) -> Result<(), IndexError> {
        let mut state = lock(&self.state);
        if !state.indices.iter().any(|i| i == index) {
            return Err(IndexError::Http {
                status: 404,
                body: format!("no such index [{index}]"),
            });
        }
        state
            .mappings
            .insert((index.to_string(), doc_type.to_string()), mapping.clone());
        Ok(())
    }

    async fn create_river(&self, river: &RiverSpec) -> Result<(), IndexError> {
        lock(&self.state).rivers.insert(river.name.clone(), river.clone());
        Ok(())
    }

    async fn search(
        &self,
        index: &str,
        doc_type: &str,
        request: &SearchRequest,
    ) -> Result<SearchResponse, IndexError> {
        let filter = request.filter();
        let mut matched: Vec<StoredDocument> = self
            .documents(index, doc_type)
            .into_iter()
            .filter(|d| filter.as_ref().map_or(true, |f| f.matches(&d.source)))
            .collect();

        // Documents without the sort field go last, as the index does.
        let sort = request.sort_field();
        matched.sort_by(|a, b| match (sort_key(a, sort), sort_key(b, sort)) {
            (Some(x), Some(y)) => x.cmp(y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });

        let total = matched.len() as u64;
        let hits = matched
            .into_iter()
            .skip(request.start)
            .take(request.size)
            .map(|d| Hit {
                id: d.id,
                source: d.source,
            })
            .collect();
        Ok(SearchResponse { total, hits })
    }
}

// ---------------------------------------------------------------------------
// MemoryBroker
// ---------------------------------------------------------------------------

#[derive(Default)]
struct BrokerState {
    exchanges: HashMap<String, ExchangeSpec>,
    queues: HashMap<String, QueueSpec>,
    /// exchange → bound queues
    bindings: HashMap<String, Vec<String>>,
    /// Messages not consumed by a river.
    pending: HashMap<String, VecDeque<Bytes>>,
}

/// In-process broker for dry runs and tests.
///
/// Messages published to a queue that no river consumes stay in memory,
/// unbounded, for the broker's lifetime (see [`pending`](MemoryBroker::pending)).
/// Fine for a dry run; not meant for a long-lived process.
pub struct MemoryBroker {
    state: Mutex<BrokerState>,
    index: Arc<MemoryIndex>,
    fail_next: AtomicBool,
}

impl MemoryBroker {
    /// A broker whose rivers feed `index`.
    pub fn new(index: Arc<MemoryIndex>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(BrokerState::default()),
            index,
            fail_next: AtomicBool::new(false),
        })
    }

    /// Make the next publish fail with [`TransportError::Rejected`].
    pub fn fail_next_publish(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn exchange(&self, name: &str) -> Option<ExchangeSpec> {
        lock(&self.state).exchanges.get(name).cloned()
    }

    pub fn queue(&self, name: &str) -> Option<QueueSpec> {
        lock(&self.state).queues.get(name).cloned()
    }

    /// Messages sitting in `queue` because no river consumes it.
    pub fn pending(&self, queue: &str) -> Vec<Bytes> {
        lock(&self.state)
            .pending
            .get(queue)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Hand `queue`'s pending messages to its river, if one is registered.
    fn relay(&self, queue: &str) {
        let Some(river) = self.index.river_for_queue(queue) else {
            return;
        };
        let drained: Vec<Bytes> = lock(&self.state)
            .pending
            .get_mut(queue)
            .map(|q| q.drain(..).collect())
            .unwrap_or_default();

        for message in drained {
            let body = String::from_utf8_lossy(&message);
            match self.index.bulk(&body) {
                Ok(n) => debug!(river = %river.name, documents = n, "river relayed message"),
                // a river drops what it cannot index
                Err(e) => warn!(river = %river.name, error = %e, "river dropped message"),
            }
        }
    }
}

#[async_trait]
impl Transport for MemoryBroker {
    async fn declare_exchange(&self, spec: &ExchangeSpec) -> Result<(), TransportError> {
        let mut state = lock(&self.state);
        if let Some(existing) = state.exchanges.get(&spec.name) {
            if existing != spec {
                return Err(TransportError::Rejected(format!(
                    "exchange {} redeclared with different properties",
                    spec.name
                )));
            }
        }
        state.exchanges.insert(spec.name.clone(), spec.clone());
        Ok(())
    }

    async fn declare_queue(&self, spec: &QueueSpec) -> Result<(), TransportError> {
        let mut state = lock(&self.state);
        state.queues.insert(spec.name.clone(), spec.clone());
        state.pending.entry(spec.name.clone()).or_default();
        Ok(())
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        _routing_key: &str,
    ) -> Result<(), TransportError> {
        let mut state = lock(&self.state);
        if !state.queues.contains_key(queue) {
            return Err(TransportError::Rejected(format!("no queue {queue}")));
        }
        if !state.exchanges.contains_key(exchange) {
            return Err(TransportError::Rejected(format!("no exchange {exchange}")));
        }
        let bound = state.bindings.entry(exchange.to_string()).or_default();
        if !bound.iter().any(|q| q == queue) {
            bound.push(queue.to_string());
        }
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        _routing_key: &str,
        payload: Bytes,
    ) -> Result<(), TransportError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(TransportError::Rejected("injected publish failure".to_string()));
        }

        let queues = {
            let mut state = lock(&self.state);
            if !state.exchanges.contains_key(exchange) {
                return Err(TransportError::Rejected(format!("no exchange {exchange}")));
            }
            let queues = state.bindings.get(exchange).cloned().unwrap_or_default();
            for queue in &queues {
                state
                    .pending
                    .entry(queue.clone())
                    .or_default()
                    .push_back(payload.clone());
            }
            queues
        };

        for queue in &queues {
            self.relay(queue);
        }
        Ok(())
    }
}
