//! Batch accumulator: collects log values in memory and ships them as one
//! combined record on [`flush`](BatchLogger::flush).
//!
//! Two buffer variants are supported, selected at construction:
//!
//! - [`BatchKind::Sequence`]: an ordered list, flushed as a JSON array.
//! - [`BatchKind::Keyed`]: a key → value mapping with last-write-wins,
//!   flushed as a JSON object in insertion order.
//!
//! A `BatchLogger` is single-writer: methods take `&mut self`. Share one
//! across tasks through [`SharedBatchLogger`], whose mutex is held across the
//! whole read-emit-clear sequence of a flush.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::emitter::Emitter;
use crate::error::{LogError, Result};
use crate::types::{LogName, LogRecord, Severity};

/// A batch logger behind an async mutex.
pub type SharedBatchLogger = Arc<tokio::sync::Mutex<BatchLogger>>;

// ---------------------------------------------------------------------------
// BatchBuffer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchKind {
    Sequence,
    Keyed,
}

impl BatchKind {
    fn label(self) -> &'static str {
        match self {
            BatchKind::Sequence => "sequence",
            BatchKind::Keyed => "keyed",
        }
    }
}

impl std::fmt::Display for BatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Accumulated, not yet flushed values.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchBuffer {
    Sequence(Vec<Value>),
    Keyed(Map<String, Value>),
}

impl BatchBuffer {
    pub fn empty(kind: BatchKind) -> Self {
        match kind {
            BatchKind::Sequence => BatchBuffer::Sequence(Vec::new()),
            BatchKind::Keyed => BatchBuffer::Keyed(Map::new()),
        }
    }

    pub fn kind(&self) -> BatchKind {
        match self {
            BatchBuffer::Sequence(_) => BatchKind::Sequence,
            BatchBuffer::Keyed(_) => BatchKind::Keyed,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            BatchBuffer::Sequence(values) => values.len(),
            BatchBuffer::Keyed(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The buffer as the record message: an array or an object, never null.
    pub fn to_message(&self) -> Value {
        match self {
            BatchBuffer::Sequence(values) => Value::Array(values.clone()),
            BatchBuffer::Keyed(entries) => Value::Object(entries.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// BatchLogger
// ---------------------------------------------------------------------------

pub struct BatchLogger {
    log_name: LogName,
    emitter: Emitter,
    buffer: BatchBuffer,
}

impl BatchLogger {
    pub fn new(log_name: LogName, emitter: Emitter, kind: BatchKind) -> Self {
        Self {
            log_name,
            emitter,
            buffer: BatchBuffer::empty(kind),
        }
    }

    pub fn sequence(log_name: LogName, emitter: Emitter) -> Self {
        Self::new(log_name, emitter, BatchKind::Sequence)
    }

    pub fn keyed(log_name: LogName, emitter: Emitter) -> Self {
        Self::new(log_name, emitter, BatchKind::Keyed)
    }

    /// Wrap in a [`SharedBatchLogger`].
    pub fn shared(self) -> SharedBatchLogger {
        Arc::new(tokio::sync::Mutex::new(self))
    }

    pub fn kind(&self) -> BatchKind {
        self.buffer.kind()
    }

    pub fn log_name(&self) -> &LogName {
        &self.log_name
    }

    pub fn buffer(&self) -> &BatchBuffer {
        &self.buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Append `value` to a sequence buffer.
    ///
    /// The value is converted to JSON here, so an unrepresentable value fails
    /// with [`LogError::Serialization`] now rather than at flush time.
    pub fn append(&mut self, value: impl Serialize) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.append_value(value)
    }

    /// Set `key` in a keyed buffer, replacing any earlier value for it.
    pub fn append_keyed(&mut self, key: impl Into<String>, value: impl Serialize) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.append_keyed_value(key.into(), value)
    }

    pub(crate) fn append_value(&mut self, value: Value) -> Result<()> {
        match &mut self.buffer {
            BatchBuffer::Sequence(values) => {
                values.push(value);
                Ok(())
            }
            BatchBuffer::Keyed(_) => Err(LogError::BufferKind {
                expected: BatchKind::Sequence.label(),
                found: BatchKind::Keyed.label(),
            }),
        }
    }

    pub(crate) fn append_keyed_value(&mut self, key: String, value: Value) -> Result<()> {
        match &mut self.buffer {
            BatchBuffer::Keyed(entries) => {
                entries.insert(key, value);
                Ok(())
            }
            BatchBuffer::Sequence(_) => Err(LogError::BufferKind {
                expected: BatchKind::Keyed.label(),
                found: BatchKind::Sequence.label(),
            }),
        }
    }

    /// Emit the whole buffer as one record tagged `severity`, then reset the
    /// buffer to empty.
    ///
    /// An empty buffer still emits (`[]` or `{}`). If delivery fails the
    /// buffer is left exactly as it was, so the flush can be retried.
    pub async fn flush(&mut self, severity: &str) -> Result<()> {
        self.flush_with(Severity::new(severity)?).await
    }

    pub(crate) async fn flush_with(&mut self, severity: Severity) -> Result<()> {
        let record = LogRecord::new(severity, self.buffer.to_message());

        self.emitter.emit(&self.log_name, &record).await?;

        debug!(
            log = %self.log_name,
            kind = %self.kind(),
            entries = self.buffer.len(),
            "batch flushed"
        );
        self.buffer = BatchBuffer::empty(self.kind());
        Ok(())
    }

    /// [`append`](Self::append) then [`flush`](Self::flush). A blank
    /// severity is rejected before anything is appended. On delivery failure
    /// the appended value stays buffered along with the rest.
    pub async fn append_then_flush(&mut self, severity: &str, value: impl Serialize) -> Result<()> {
        let severity = Severity::new(severity)?;
        self.append(value)?;
        self.flush_with(severity).await
    }

    /// [`append_keyed`](Self::append_keyed) then [`flush`](Self::flush), with
    /// the same severity check up front.
    pub async fn append_keyed_then_flush(
        &mut self,
        severity: &str,
        key: impl Into<String>,
        value: impl Serialize,
    ) -> Result<()> {
        let severity = Severity::new(severity)?;
        self.append_keyed(key, value)?;
        self.flush_with(severity).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
