//! Test doubles shared by the unit tests in this crate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::collaborator::{ExchangeSpec, IndexClient, QueueSpec, RiverSpec, Transport};
use crate::config::Config;
use crate::emitter::Emitter;
use crate::error::{IndexError, TransportError};
use crate::query::{SearchRequest, SearchResponse};

#[derive(Debug, Clone)]
pub struct Published {
    pub exchange: String,
    pub routing_key: String,
    pub body: String,
}

/// Transport that records every publish. `fail_next` makes the next publish
/// fail once; `stall` makes every publish sleep before answering.
#[derive(Default)]
pub struct RecordingTransport {
    published: Mutex<Vec<Published>>,
    declared: Mutex<Vec<String>>,
    fail_next: AtomicBool,
    stall: Mutex<Option<Duration>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn stall(&self, delay: Duration) {
        *self.stall.lock().unwrap() = Some(delay);
    }

    pub fn published(&self) -> Vec<Published> {
        self.published.lock().unwrap().clone()
    }

    pub fn declared(&self) -> Vec<String> {
        self.declared.lock().unwrap().clone()
    }

    /// Second envelope line of every publish, decoded.
    pub fn payloads(&self) -> Vec<serde_json::Value> {
        self.published()
            .iter()
            .map(|p| serde_json::from_str(p.body.lines().nth(1).unwrap()).unwrap())
            .collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn declare_exchange(&self, spec: &ExchangeSpec) -> Result<(), TransportError> {
        self.declared.lock().unwrap().push(format!("exchange:{}", spec.name));
        Ok(())
    }

    async fn declare_queue(&self, spec: &QueueSpec) -> Result<(), TransportError> {
        self.declared.lock().unwrap().push(format!("queue:{}", spec.name));
        Ok(())
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        _routing_key: &str,
    ) -> Result<(), TransportError> {
        self.declared.lock().unwrap().push(format!("bind:{queue}->{exchange}"));
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: Bytes,
    ) -> Result<(), TransportError> {
        let stall = *self.stall.lock().unwrap();
        if let Some(delay) = stall {
            tokio::time::sleep(delay).await;
        }
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(TransportError::Rejected("injected failure".to_string()));
        }
        self.published.lock().unwrap().push(Published {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            body: String::from_utf8(payload.to_vec()).unwrap(),
        });
        Ok(())
    }
}

/// Emitter over `transport` with the default configuration.
pub fn emitter_with(transport: Arc<RecordingTransport>) -> Emitter {
    let cfg = Config::defaults();
    Emitter::new(transport, &cfg.index, &cfg.emitter)
}

/// Index client that records calls. `create_index` can be primed to fail.
#[derive(Default)]
pub struct RecordingIndex {
    calls: Mutex<Vec<String>>,
    rivers: Mutex<Vec<RiverSpec>>,
    searches: Mutex<Vec<SearchRequest>>,
    create_failure: Mutex<Option<IndexError>>,
}

impl RecordingIndex {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn index_exists(&self) {
        self.fail_create(IndexError::AlreadyExists("pylogger".to_string()));
    }

    pub fn fail_create(&self, err: IndexError) {
        *self.create_failure.lock().unwrap() = Some(err);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn rivers(&self) -> Vec<RiverSpec> {
        self.rivers.lock().unwrap().clone()
    }

    pub fn searches(&self) -> Vec<SearchRequest> {
        self.searches.lock().unwrap().clone()
    }
}

#[async_trait]
impl IndexClient for RecordingIndex {
    async fn create_index(&self, index: &str) -> Result<(), IndexError> {
        self.calls.lock().unwrap().push(format!("create_index:{index}"));
        let failure = self.create_failure.lock().unwrap().take();
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn put_mapping(
        &self,
        index: &str,
        doc_type: &str,
        _mapping: &serde_json::Value,
    ) -> Result<(), IndexError> {
        self.calls.lock().unwrap().push(format!("put_mapping:{index}/{doc_type}"));
        Ok(())
    }

    async fn create_river(&self, river: &RiverSpec) -> Result<(), IndexError> {
        self.calls.lock().unwrap().push(format!("create_river:{}", river.name));
        self.rivers.lock().unwrap().push(river.clone());
        Ok(())
    }

    async fn search(
        &self,
        index: &str,
        doc_type: &str,
        request: &SearchRequest,
    ) -> Result<SearchResponse, IndexError> {
        self.calls.lock().unwrap().push(format!("search:{index}/{doc_type}"));
        self.searches.lock().unwrap().push(request.clone());
        Ok(SearchResponse::default())
    }
}
