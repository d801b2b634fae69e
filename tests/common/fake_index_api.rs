//! Fake search-index HTTP API for integration tests.
//!
//! Spins up a minimal `axum` server on a random TCP port bound to 127.0.0.1.
//! Serves:
//! - `PUT /{index}`: create an index, `400 IndexAlreadyExistsException` on repeat
//! - `PUT /{index}/_mapping/{type}`: record a mapping, `404` for unknown indices
//! - `PUT /_river/{name}/_meta`: record a river registration
//! - `POST /{index}/{type}/_search`: record the query, answer with a canned body
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn demo() {
//! use common::fake_index_api::FakeIndexApi;
//!
//! let api = FakeIndexApi::start().await.unwrap();
//! api.respond_to_search(serde_json::json!({"hits": {"total": 0, "hits": []}})).await;
//!
//! // Point an ElasticClient at api.base_url()
//! let url = api.base_url();
//! # }
//! ```

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{post, put},
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

/// State shared between the router and test code.
#[derive(Default)]
struct ApiState {
    indices: Vec<String>,
    /// `(index, type)` → request body of the mapping call.
    mappings: HashMap<(String, String), Value>,
    /// river name → `_meta` document.
    rivers: HashMap<String, Value>,
    /// Query bodies received by `_search`, oldest first.
    searches: Vec<Value>,
    search_response: Option<Value>,
}

/// Handle to the running fake index server.
pub struct FakeIndexApi {
    addr: SocketAddr,
    state: Arc<Mutex<ApiState>>,
}

impl FakeIndexApi {
    /// Start the server on a random port. Returns once it is listening.
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state = Arc::new(Mutex::new(ApiState::default()));

        let app = Router::new()
            .route("/{index}", put(create_index))
            .route("/{index}/_mapping/{doc_type}", put(put_mapping))
            .route("/_river/{name}/_meta", put(create_river))
            .route("/{index}/{doc_type}/_search", post(search))
            .with_state(state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Ok(Self { addr, state })
    }

    /// Base URL for the API (e.g. `http://127.0.0.1:PORT`).
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Pretend `index` was created before the test started.
    pub async fn add_index(&self, index: &str) {
        self.state.lock().await.indices.push(index.to_string());
    }

    /// Body returned by every subsequent `_search`.
    pub async fn respond_to_search(&self, body: Value) {
        self.state.lock().await.search_response = Some(body);
    }

    pub async fn indices(&self) -> Vec<String> {
        self.state.lock().await.indices.clone()
    }

    pub async fn mapping(&self, index: &str, doc_type: &str) -> Option<Value> {
        self.state
            .lock()
            .await
            .mappings
            .get(&(index.to_string(), doc_type.to_string()))
            .cloned()
    }

    pub async fn river(&self, name: &str) -> Option<Value> {
        self.state.lock().await.rivers.get(name).cloned()
    }

    pub async fn searches(&self) -> Vec<Value> {
        self.state.lock().await.searches.clone()
    }
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

async fn create_index(
    Path(index): Path<String>,
    State(state): State<Arc<Mutex<ApiState>>>,
) -> impl IntoResponse {
    let mut state = state.lock().await;
    if state.indices.contains(&index) {
        let error = format!("IndexAlreadyExistsException[[{index}] already exists]");
        return (StatusCode::BAD_REQUEST, Json(json!({"error": error, "status": 400})));
    }
    state.indices.push(index);
    (StatusCode::OK, Json(json!({"ok": true, "acknowledged": true})))
}

async fn put_mapping(
    Path((index, doc_type)): Path<(String, String)>,
    State(state): State<Arc<Mutex<ApiState>>>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let mut state = state.lock().await;
    if !state.indices.contains(&index) {
        let error = format!("IndexMissingException[[{index}] missing]");
        return (StatusCode::NOT_FOUND, Json(json!({"error": error, "status": 404})));
    }
    state.mappings.insert((index, doc_type), body);
    (StatusCode::OK, Json(json!({"ok": true, "acknowledged": true})))
}

async fn create_river(
    Path(name): Path<String>,
    State(state): State<Arc<Mutex<ApiState>>>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let mut state = state.lock().await;
    state.rivers.insert(name.clone(), body);
    (
        StatusCode::CREATED,
        Json(json!({"ok": true, "_index": "_river", "_type": name, "_id": "_meta"})),
    )
}

async fn search(
    Path((_index, _doc_type)): Path<(String, String)>,
    State(state): State<Arc<Mutex<ApiState>>>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let mut state = state.lock().await;
    state.searches.push(body);
    let response = state
        .search_response
        .clone()
        .unwrap_or_else(|| json!({"hits": {"total": 0, "hits": []}}));
    (StatusCode::OK, Json(response))
}
