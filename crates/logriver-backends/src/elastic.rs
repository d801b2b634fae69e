//! Search index client over the index's HTTP API.
//!
//! | operation      | request                              |
//! |----------------|--------------------------------------|
//! | create index   | `PUT /{index}`                       |
//! | put mapping    | `PUT /{index}/_mapping/{type}`       |
//! | create river   | `PUT /_river/{name}/_meta`           |
//! | search         | `POST /{index}/{type}/_search`       |

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use logriver_core::collaborator::{IndexClient, RiverSpec};
use logriver_core::config::IndexConfig;
use logriver_core::query::{Hit, SearchRequest, SearchResponse};
use logriver_core::IndexError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Error names the index uses for "index already exists", across versions.
const ALREADY_EXISTS_MARKERS: [&str; 3] = [
    "IndexAlreadyExistsException",
    "index_already_exists_exception",
    "resource_already_exists_exception",
];

#[derive(Clone)]
pub struct ElasticClient {
    http: reqwest::Client,
    base_url: String,
}

impl ElasticClient {
    pub fn new(config: &IndexConfig) -> Result<Self, IndexError> {
        Self::with_base_url(config.base_url(), DEFAULT_TIMEOUT)
    }

    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Result<Self, IndexError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IndexError::Request(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn send_json(&self, request: reqwest::RequestBuilder, body: &Value) -> Result<Response, IndexError> {
        request
            .json(body)
            .send()
            .await
            .map_err(|e| IndexError::Request(e.to_string()))
    }
}

async fn expect_success(response: Response) -> Result<Response, IndexError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(IndexError::Http {
        status: status.as_u16(),
        body,
    })
}

/// River registration document for a RabbitMQ-fed river.
pub fn river_document(river: &RiverSpec) -> Value {
    json!({
        "type": "rabbitmq",
        "rabbitmq": {
            "host": river.host,
            "port": river.port,
            "user": river.user,
            "pass": river.password,
            "vhost": river.vhost,
            "exchange": river.exchange,
            "exchange_type": river.exchange_type,
            "exchange_durable": river.exchange_durable,
            "routing_key": river.routing_key,
            "queue": river.queue,
            "queue_durable": river.queue_durable,
            "queue_auto_delete": river.queue_auto_delete,
        },
        "index": {
            "index": river.index_name,
            "type": river.index_type,
        },
    })
}

// ---------------------------------------------------------------------------
// Search response decoding
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct RawResponse {
    hits: RawHits,
}

#[derive(Deserialize)]
struct RawHits {
    total: RawTotal,
    #[serde(default)]
    hits: Vec<RawHit>,
}

/// Older index versions report a bare count, newer ones `{"value": n}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawTotal {
    Count(u64),
    Object { value: u64 },
}

#[derive(Deserialize)]
struct RawHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_source", default)]
    source: Value,
}

fn decode_search(doc_type: &str, body: &str) -> Result<SearchResponse, IndexError> {
    let raw: RawResponse =
        serde_json::from_str(body).map_err(|e| IndexError::Decode(e.to_string()))?;
    let total = match raw.hits.total {
        RawTotal::Count(n) | RawTotal::Object { value: n } => n,
    };
    Ok(SearchResponse {
        total,
        hits: raw
            .hits
            .hits
            .into_iter()
            .map(|h| Hit::from_source(h.id, doc_type, h.source))
            .collect(),
    })
}

// ---------------------------------------------------------------------------
// IndexClient
// ---------------------------------------------------------------------------

#[async_trait]
impl IndexClient for ElasticClient {
    async fn create_index(&self, index: &str) -> Result<(), IndexError> {
        let response = self
            .http
            .put(self.url(index))
            .send()
            .await
            .map_err(|e| IndexError::Request(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!(index, "index created");
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::BAD_REQUEST
            && ALREADY_EXISTS_MARKERS.iter().any(|m| body.contains(m))
        {
            return Err(IndexError::AlreadyExists(index.to_string()));
        }
        Err(IndexError::Http {
            status: status.as_u16(),
            body,
        })
    }

    async fn put_mapping(&self, index: &str, doc_type: &str, mapping: &Value) -> Result<(), IndexError> {
        let url = self.url(&format!("{index}/_mapping/{doc_type}"));
        let body = json!({ doc_type: mapping });
        expect_success(self.send_json(self.http.put(url), &body).await?).await?;
        Ok(())
    }

    async fn create_river(&self, river: &RiverSpec) -> Result<(), IndexError> {
        let url = self.url(&format!("_river/{}/_meta", river.name));
        expect_success(self.send_json(self.http.put(url), &river_document(river)).await?).await?;
        Ok(())
    }

    async fn search(
        &self,
        index: &str,
        doc_type: &str,
        request: &SearchRequest,
    ) -> Result<SearchResponse, IndexError> {
        let url = self.url(&format!("{index}/{doc_type}/_search"));
        let response = expect_success(self.send_json(self.http.post(url), &request.to_json()).await?).await?;
        let body = response
            .text()
            .await
            .map_err(|e| IndexError::Request(e.to_string()))?;
        decode_search(doc_type, &body)
    }
}
