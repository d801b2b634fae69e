//! One-time setup of a log stream: index, mapping and river on the search
//! side; exchange, queue and binding on the broker side.
//!
//! Every step is idempotent from the caller's point of view. The only
//! collaborator failure that is tolerated is "index already exists".

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::collaborator::{ExchangeSpec, IndexClient, QueueSpec, RiverSpec, Transport, ROUTING_KEY};
use crate::config::Config;
use crate::error::{IndexError, LogError, Result};
use crate::types::LogName;

/// Field mapping for a log stream's documents.
///
/// With `embed_timestamp` the payload's own `timestamp` is mapped as a date;
/// otherwise the index's automatic `_timestamp` is switched on.
pub fn mapping(embed_timestamp: bool) -> Value {
    let string_field = json!({ "type": "string", "index": "not_analyzed", "store": "yes" });
    let mut properties = json!({
        "log_name": string_field.clone(),
        "severity": string_field,
    });

    if embed_timestamp {
        properties["timestamp"] = json!({
            "type": "date",
            "format": "date_time",
            "store": "yes",
        });
        json!({ "properties": properties })
    } else {
        json!({
            "_timestamp": { "enabled": true, "store": true },
            "properties": properties,
        })
    }
}

pub async fn provision(
    config: &Config,
    log_name: &LogName,
    transport: &dyn Transport,
    index: &dyn IndexClient,
) -> Result<()> {
    let index_name = config.index.index_name.as_str();
    let namespace = config.emitter.namespace.as_str();

    match index.create_index(index_name).await {
        Ok(()) => info!(index = index_name, "created index"),
        Err(IndexError::AlreadyExists(_)) => debug!(index = index_name, "index already exists"),
        Err(e) => return Err(LogError::provisioning("create index", e)),
    }

    index
        .put_mapping(index_name, log_name.as_str(), &mapping(config.emitter.embed_timestamp))
        .await
        .map_err(|e| LogError::provisioning("put mapping", e))?;

    let river = RiverSpec::for_log(log_name, index_name, &config.broker, &config.emitter);
    index
        .create_river(&river)
        .await
        .map_err(|e| LogError::provisioning("create river", e))?;
    info!(river = %river.name, "registered river");

    let exchange = ExchangeSpec::for_log(log_name, namespace);
    let queue = QueueSpec::for_log(log_name, namespace);
    transport
        .declare_exchange(&exchange)
        .await
        .map_err(|e| LogError::provisioning("declare exchange", e))?;
    transport
        .declare_queue(&queue)
        .await
        .map_err(|e| LogError::provisioning("declare queue", e))?;
    transport
        .bind_queue(&queue.name, &exchange.name, ROUTING_KEY)
        .await
        .map_err(|e| LogError::provisioning("bind queue", e))?;
    info!(exchange = %exchange.name, queue = %queue.name, "broker topology ready");

    Ok(())
}
