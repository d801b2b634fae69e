//! Deferred calls on a shared [`BatchLogger`].
//!
//! [`Deferred::defer`] returns a [`DeferredAction`] naming an operation and
//! its arguments instead of running it. Nothing happens until the caller
//! invokes the action; at that point the operation is looked up by name and
//! runs against the logger's state as it is *then*, not as it was when the
//! action was created.
//!
//! Registered operations and their JSON arguments:
//!
//! | name                | sequence buffer       | keyed buffer                 |
//! |---------------------|-----------------------|------------------------------|
//! | `append`            | `[value]`             | `[key, value]`               |
//! | `flush`             | `[severity]`          | `[severity]`                 |
//! | `append_then_flush` | `[severity, value]`   | `[severity, key, value]`     |
//!
//! Unknown names and malformed arguments are only reported when the action is
//! invoked, as [`LogError::Invocation`].

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::debug;

use crate::batch::{BatchKind, BatchLogger, SharedBatchLogger};
use crate::error::{LogError, Result};
use crate::types::Severity;

type Operation = for<'a> fn(&'a mut BatchLogger, Vec<Value>) -> BoxFuture<'a, Result<()>>;

pub const APPEND: &str = "append";
pub const FLUSH: &str = "flush";
pub const APPEND_THEN_FLUSH: &str = "append_then_flush";

// ---------------------------------------------------------------------------
// Deferred
// ---------------------------------------------------------------------------

/// Produces [`DeferredAction`]s bound to one shared batch logger.
#[derive(Clone)]
pub struct Deferred {
    target: SharedBatchLogger,
    operations: Arc<HashMap<&'static str, Operation>>,
}

impl Deferred {
    pub fn new(target: SharedBatchLogger) -> Self {
        let operations: HashMap<&'static str, Operation> = HashMap::from([
            (APPEND, op_append as Operation),
            (FLUSH, op_flush as Operation),
            (APPEND_THEN_FLUSH, op_append_then_flush as Operation),
        ]);
        Self {
            target,
            operations: Arc::new(operations),
        }
    }

    pub fn target(&self) -> &SharedBatchLogger {
        &self.target
    }

    /// Capture `operation(args...)` without running it.
    pub fn defer(&self, operation: &str, args: Vec<Value>) -> DeferredAction {
        DeferredAction {
            operation: operation.to_string(),
            args,
            target: Arc::clone(&self.target),
            operations: Arc::clone(&self.operations),
        }
    }

    pub fn append(&self, value: Value) -> DeferredAction {
        self.defer(APPEND, vec![value])
    }

    pub fn append_keyed(&self, key: &str, value: Value) -> DeferredAction {
        self.defer(APPEND, vec![Value::from(key), value])
    }

    pub fn flush(&self, severity: &str) -> DeferredAction {
        self.defer(FLUSH, vec![Value::from(severity)])
    }

    pub fn append_then_flush(&self, severity: &str, value: Value) -> DeferredAction {
        self.defer(APPEND_THEN_FLUSH, vec![Value::from(severity), value])
    }

    pub fn append_keyed_then_flush(&self, severity: &str, key: &str, value: Value) -> DeferredAction {
        self.defer(APPEND_THEN_FLUSH, vec![Value::from(severity), Value::from(key), value])
    }
}

// ---------------------------------------------------------------------------
// DeferredAction
// ---------------------------------------------------------------------------

/// A pending operation. Consumed by [`invoke`](DeferredAction::invoke), so it
/// runs at most once.
#[must_use = "a deferred action does nothing until invoked"]
pub struct DeferredAction {
    operation: String,
    args: Vec<Value>,
    target: SharedBatchLogger,
    operations: Arc<HashMap<&'static str, Operation>>,
}

impl DeferredAction {
    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Run the captured operation against the logger's current state.
    pub async fn invoke(self) -> Result<()> {
        let op = self
            .operations
            .get(self.operation.as_str())
            .copied()
            .ok_or_else(|| LogError::invocation(&self.operation, "unknown operation"))?;

        debug!(operation = %self.operation, args = self.args.len(), "invoking deferred action");
        let mut target = self.target.lock().await;
        op(&mut *target, self.args).await
    }

    /// The action as a plain zero-argument callable.
    pub fn into_fn(self) -> impl FnOnce() -> BoxFuture<'static, Result<()>> {
        move || -> BoxFuture<'static, Result<()>> { Box::pin(self.invoke()) }
    }
}

impl std::fmt::Debug for DeferredAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredAction")
            .field("operation", &self.operation)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Registered operations
// ---------------------------------------------------------------------------

fn op_append(target: &mut BatchLogger, args: Vec<Value>) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move { append_from_args(target, APPEND, args) })
}

fn op_flush(target: &mut BatchLogger, args: Vec<Value>) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        let [severity] = exact_args::<1>(FLUSH, args)?;
        let severity = severity_arg(FLUSH, &severity)?;
        target.flush(&severity).await
    })
}

fn op_append_then_flush(target: &mut BatchLogger, mut args: Vec<Value>) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        if args.is_empty() {
            return Err(LogError::invocation(APPEND_THEN_FLUSH, "missing severity"));
        }
        let severity = Severity::new(&severity_arg(APPEND_THEN_FLUSH, &args.remove(0))?)?;
        append_from_args(target, APPEND_THEN_FLUSH, args)?;
        target.flush_with(severity).await
    })
}

fn append_from_args(target: &mut BatchLogger, operation: &str, args: Vec<Value>) -> Result<()> {
    match target.kind() {
        BatchKind::Sequence => {
            let [value] = exact_args::<1>(operation, args)?;
            target.append_value(value)
        }
        BatchKind::Keyed => {
            let [key, value] = exact_args::<2>(operation, args)?;
            match key {
                Value::String(key) => target.append_keyed_value(key, value),
                other => Err(LogError::invocation(
                    operation,
                    format!("key must be a string, got {other}"),
                )),
            }
        }
    }
}

fn exact_args<const N: usize>(operation: &str, args: Vec<Value>) -> Result<[Value; N]> {
    let got = args.len();
    args.try_into()
        .map_err(|_| LogError::invocation(operation, format!("expected {N} argument(s), got {got}")))
}

fn severity_arg(operation: &str, value: &Value) -> Result<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| LogError::invocation(operation, format!("severity must be a string, got {value}")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
