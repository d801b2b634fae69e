//! Emitter: turns a [`LogRecord`] into the bulk-style wire envelope and
//! publishes it through the broker [`Transport`].
//!
//! ```text
//! {"index":{"_index":"<index>","_type":"<log>"}}
//! {"<log>":{"severity":"<SEVERITY>","msg":<message>,"timestamp":"<iso8601>"}}
//! <empty line>
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, warn};

use crate::collaborator::{Transport, ROUTING_KEY};
use crate::config::{EmitterConfig, IndexConfig};
use crate::error::{DeliveryError, Result};
use crate::types::{iso8601, LogName, LogRecord, Severity};

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct IndexAction<'a> {
    index: IndexTarget<'a>,
}

#[derive(Serialize)]
struct IndexTarget<'a> {
    #[serde(rename = "_index")]
    index: &'a str,
    #[serde(rename = "_type")]
    doc_type: &'a str,
}

#[derive(Serialize)]
struct Payload<'a> {
    severity: &'a str,
    msg: &'a serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
}

/// Encoder for the two-line envelope.
pub struct Envelope;

impl Envelope {
    /// Encode `record` for `log_name`. The result always ends with `\n`, which
    /// leaves the trailing empty line that terminates a bulk record.
    pub fn encode(
        index_name: &str,
        log_name: &LogName,
        record: &LogRecord,
        embed_timestamp: bool,
    ) -> Result<String> {
        let action = IndexAction {
            index: IndexTarget {
                index: index_name,
                doc_type: log_name.as_str(),
            },
        };
        let payload = Payload {
            severity: record.severity.as_str(),
            msg: &record.message,
            timestamp: record
                .timestamp
                .as_ref()
                .filter(|_| embed_timestamp)
                .map(iso8601),
        };
        let source = HashMap::from([(log_name.as_str(), payload)]);

        let mut out = serde_json::to_string(&action)?;
        out.push('\n');
        out.push_str(&serde_json::to_string(&source)?);
        out.push('\n');
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Emitter
// ---------------------------------------------------------------------------

/// Publishes one envelope per [`emit`](Emitter::emit) call. Cheap to clone;
/// clones share the transport.
#[derive(Clone)]
pub struct Emitter {
    transport: Arc<dyn Transport>,
    index_name: String,
    namespace: String,
    embed_timestamp: bool,
    delivery_timeout: Duration,
}

impl Emitter {
    pub fn new(transport: Arc<dyn Transport>, index: &IndexConfig, emitter: &EmitterConfig) -> Self {
        Self {
            transport,
            index_name: index.index_name.clone(),
            namespace: emitter.namespace.clone(),
            embed_timestamp: emitter.embed_timestamp,
            delivery_timeout: emitter.delivery_timeout(),
        }
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Encode `record` and publish it to `<namespace>.<log_name>`.
    ///
    /// Fails with [`DeliveryError::Transport`] if the broker refuses the
    /// message and [`DeliveryError::Timeout`] if it does not answer within the
    /// configured delivery timeout.
    pub async fn emit(&self, log_name: &LogName, record: &LogRecord) -> Result<()> {
        let body = Envelope::encode(&self.index_name, log_name, record, self.embed_timestamp)?;
        let exchange = log_name.routing_destination(&self.namespace);

        debug!(
            exchange = %exchange,
            severity = %record.severity,
            bytes = body.len(),
            "emitting envelope"
        );

        let publish = self
            .transport
            .publish(&exchange, ROUTING_KEY, Bytes::from(body));

        match tokio::time::timeout(self.delivery_timeout, publish).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                warn!(exchange = %exchange, error = %e, "delivery failed");
                Err(DeliveryError::Transport(e).into())
            }
            Err(_) => {
                warn!(exchange = %exchange, timeout = ?self.delivery_timeout, "delivery timed out");
                Err(DeliveryError::Timeout(self.delivery_timeout).into())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Logger
// ---------------------------------------------------------------------------

/// Unbuffered logger for one log stream: every call is one envelope.
#[derive(Clone)]
pub struct Logger {
    log_name: LogName,
    emitter: Emitter,
}

impl Logger {
    pub fn new(log_name: LogName, emitter: Emitter) -> Self {
        Self { log_name, emitter }
    }

    pub fn log_name(&self) -> &LogName {
        &self.log_name
    }

    pub async fn info(&self, msg: impl Serialize) -> Result<()> {
        self.send(Severity::info(), msg).await
    }

    pub async fn error(&self, msg: impl Serialize) -> Result<()> {
        self.send(Severity::error(), msg).await
    }

    /// Log `msg` under a caller-supplied severity (upper-cased on the wire).
    pub async fn log(&self, severity: &str, msg: impl Serialize) -> Result<()> {
        self.send(Severity::new(severity)?, msg).await
    }

    async fn send(&self, severity: Severity, msg: impl Serialize) -> Result<()> {
        let record = LogRecord::new(severity, serde_json::to_value(msg)?);
        self.emitter.emit(&self.log_name, &record).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LogError;
    use crate::testing::{emitter_with, RecordingTransport};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn fixed_record(message: serde_json::Value) -> LogRecord {
        LogRecord::new(Severity::info(), message)
            .at(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap())
    }

    #[test]
    fn envelope_has_action_payload_and_trailing_blank_line() {
        let name = LogName::new("applog").unwrap();
        let body = Envelope::encode("pylogger", &name, &fixed_record(json!(["a"])), true).unwrap();

        assert_eq!(
            body,
            concat!(
                r#"{"index":{"_index":"pylogger","_type":"applog"}}"#,
                "\n",
                r#"{"applog":{"severity":"INFO","msg":["a"],"timestamp":"2024-03-01T12:00:00.000+00:00"}}"#,
                "\n",
            )
        );
        let lines: Vec<&str> = body.split('\n').collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[2], "");
    }

    #[test]
    fn envelope_omits_timestamp_when_not_embedded() {
        let name = LogName::new("applog").unwrap();
        let body = Envelope::encode("pylogger", &name, &fixed_record(json!("hi")), false).unwrap();
        let line: serde_json::Value = serde_json::from_str(body.lines().nth(1).unwrap()).unwrap();
        assert_eq!(line, json!({"applog": {"severity": "INFO", "msg": "hi"}}));
    }

    #[tokio::test]
    async fn emit_publishes_once_to_namespaced_exchange() {
        let transport = RecordingTransport::new();
        let emitter = emitter_with(transport.clone());
        let name = LogName::new("applog").unwrap();

        emitter.emit(&name, &fixed_record(json!("x"))).await.unwrap();

        let published = transport.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].exchange, "pylog.applog");
        assert_eq!(published[0].routing_key, "");
    }

    #[tokio::test]
    async fn logger_upper_cases_custom_severity() {
        let transport = RecordingTransport::new();
        let logger = Logger::new(LogName::new("applog").unwrap(), emitter_with(transport.clone()));

        logger.log("warning", "disk at 91%").await.unwrap();
        logger.error(json!({"code": 7})).await.unwrap();

        let payloads = transport.payloads();
        assert_eq!(payloads[0]["applog"]["severity"], "WARNING");
        assert_eq!(payloads[0]["applog"]["msg"], "disk at 91%");
        assert_eq!(payloads[1]["applog"]["severity"], "ERROR");
        assert_eq!(payloads[1]["applog"]["msg"], json!({"code": 7}));
    }

    #[tokio::test]
    async fn transport_failure_is_delivery_error() {
        let transport = RecordingTransport::new();
        transport.fail_next();
        let emitter = emitter_with(transport.clone());

        let err = emitter
            .emit(&LogName::new("applog").unwrap(), &fixed_record(json!("x")))
            .await
            .unwrap_err();
        assert!(matches!(err, LogError::Delivery(DeliveryError::Transport(_))));
        assert!(transport.published().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_transport_times_out() {
        let transport = RecordingTransport::new();
        transport.stall(Duration::from_secs(60));
        let emitter = emitter_with(transport);

        let err = emitter
            .emit(&LogName::new("applog").unwrap(), &fixed_record(json!("x")))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LogError::Delivery(DeliveryError::Timeout(d)) if d == Duration::from_secs(5)
        ));
    }
}
