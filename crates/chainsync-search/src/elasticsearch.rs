//! Elasticsearch-compatible backend over HTTP, backed by `reqwest`.
//!
//! Speaks the plain REST API: `HEAD /{index}`, `PUT /{index}`,
//! `GET /{index}/_mapping`, `GET /{index}/_doc/{id}` and `POST /_bulk`
//! with an NDJSON body. No retries happen here; callers wrap calls in a
//! [`RetryPolicy`](chainsync_core::retry::RetryPolicy).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use chainsync_core::document::{BulkOp, DocumentKind};
use chainsync_core::error::SyncError;
use chainsync_core::schema::IndexSchema;

use crate::backend::{BulkItem, BulkResponse, CreateIndexOutcome, SearchBackend};

/// Connection settings for an Elasticsearch cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ElasticConfig {
    /// Base URL, e.g. `http://localhost:9200`.
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Use 6.x-style mapping types (`block`, `tx`, `contract`).
    pub legacy_types: bool,
    /// Hard HTTP timeout (milliseconds).
    pub request_timeout_ms: u64,
}

impl Default for ElasticConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".into(),
            username: None,
            password: None,
            legacy_types: false,
            request_timeout_ms: 30_000,
        }
    }
}

/// HTTP client for one Elasticsearch cluster.
pub struct ElasticsearchBackend {
    base: String,
    http: reqwest::Client,
    config: ElasticConfig,
}

impl ElasticsearchBackend {
    pub fn new(config: ElasticConfig) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| SyncError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            base: config.url.trim_end_matches('/').to_string(),
            http,
            config,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let req = self.http.request(method, format!("{}/{}", self.base, path));
        match &self.config.username {
            Some(user) => req.basic_auth(user, self.config.password.as_deref()),
            None => req,
        }
    }

    fn doc_path(&self, kind: DocumentKind, id: &str) -> String {
        if self.config.legacy_types {
            format!("{}/{}/{}", kind.index(), kind.type_name(), id)
        } else {
            format!("{}/_doc/{}", kind.index(), id)
        }
    }

    /// Serialize operations as a bulk NDJSON body (trailing newline included).
    pub fn ndjson(&self, ops: &[BulkOp]) -> String {
        let mut body = String::new();
        for op in ops {
            let kind = op.kind();
            let mut meta = json!({ "_index": kind.index(), "_id": op.id() });
            if self.config.legacy_types {
                meta["_type"] = json!(kind.type_name());
            }
            match op {
                BulkOp::Index { doc, .. } => {
                    body.push_str(&json!({ "index": meta }).to_string());
                    body.push('\n');
                    body.push_str(&doc.body.to_string());
                    body.push('\n');
                }
                BulkOp::Delete { .. } => {
                    body.push_str(&json!({ "delete": meta }).to_string());
                    body.push('\n');
                }
            }
        }
        body
    }
}

fn transport_error(e: reqwest::Error) -> SyncError {
    if e.is_decode() {
        SyncError::Decode(e.to_string())
    } else {
        SyncError::Transient(e.to_string())
    }
}

/// Map a non-success status to an error: throttling and 5xx are transient,
/// anything else is a permanent rejection.
async fn status_error(resp: reqwest::Response, index: &str) -> SyncError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    if status == 429 || status >= 500 {
        SyncError::Transient(format!("HTTP {status}: {body}"))
    } else {
        SyncError::Rejected {
            index: index.to_string(),
            id: "-".into(),
            reason: format!("HTTP {status}: {body}"),
        }
    }
}

#[derive(Deserialize)]
struct RawBulkResponse {
    #[serde(default)]
    took: u64,
    #[serde(default)]
    items: Vec<std::collections::HashMap<String, RawBulkItem>>,
}

#[derive(Deserialize)]
struct RawBulkItem {
    #[serde(rename = "_index", default)]
    index: String,
    #[serde(rename = "_id", default)]
    id: String,
    status: u16,
    #[serde(default)]
    error: Option<Value>,
}

/// Decode a `_bulk` response body into per-operation outcomes.
pub fn parse_bulk_response(body: &Value) -> Result<BulkResponse, SyncError> {
    let raw: RawBulkResponse = serde_json::from_value(body.clone())
        .map_err(|e| SyncError::Decode(format!("bulk response: {e}")))?;
    let mut items = Vec::with_capacity(raw.items.len());
    for entry in raw.items {
        let (action, item) = entry
            .into_iter()
            .next()
            .ok_or_else(|| SyncError::Decode("empty bulk item".into()))?;
        items.push(BulkItem {
            index: item.index,
            id: item.id,
            status: item.status,
            error: item.error.map(|e| match e.get("reason").and_then(Value::as_str) {
                Some(reason) => reason.to_string(),
                None => e.to_string(),
            }),
            is_delete: action == "delete",
        });
    }
    Ok(BulkResponse {
        took_ms: raw.took,
        items,
    })
}

/// Pull the `properties` object out of a `GET /{index}/_mapping` response,
/// with or without a mapping-type level.
pub fn extract_properties(body: &Value, index: &str) -> Option<Value> {
    let mappings = body.get(index)?.get("mappings")?;
    if let Some(props) = mappings.get("properties") {
        return Some(props.clone());
    }
    mappings
        .as_object()?
        .values()
        .find_map(|t| t.get("properties").cloned())
}

#[async_trait]
impl SearchBackend for ElasticsearchBackend {
    async fn index_exists(&self, index: &str) -> Result<bool, SyncError> {
        let resp = self
            .request(reqwest::Method::HEAD, index)
            .send()
            .await
            .map_err(transport_error)?;
        match resp.status().as_u16() {
            200 => Ok(true),
            404 => Ok(false),
            _ => Err(status_error(resp, index).await),
        }
    }

    async fn create_index(&self, schema: &IndexSchema) -> Result<CreateIndexOutcome, SyncError> {
        let index = schema.name();
        let resp = self
            .request(reqwest::Method::PUT, index)
            .json(&schema.create_body(self.config.legacy_types))
            .send()
            .await
            .map_err(transport_error)?;

        if resp.status().as_u16() == 400 {
            let body = resp.text().await.unwrap_or_default();
            if body.contains("resource_already_exists_exception") {
                return Ok(CreateIndexOutcome::AlreadyExists);
            }
            return Err(SyncError::Rejected {
                index: index.to_string(),
                id: "-".into(),
                reason: format!("HTTP 400: {body}"),
            });
        }
        if !resp.status().is_success() {
            return Err(status_error(resp, index).await);
        }

        let body: Value = resp.json().await.map_err(transport_error)?;
        if body.get("acknowledged").and_then(Value::as_bool) == Some(true) {
            Ok(CreateIndexOutcome::Acknowledged)
        } else {
            Ok(CreateIndexOutcome::NotAcknowledged)
        }
    }

    async fn get_mapping(&self, index: &str) -> Result<Option<Value>, SyncError> {
        let resp = self
            .request(reqwest::Method::GET, &format!("{index}/_mapping"))
            .send()
            .await
            .map_err(transport_error)?;
        if resp.status().as_u16() == 404 {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(status_error(resp, index).await);
        }
        let body: Value = resp.json().await.map_err(transport_error)?;
        Ok(extract_properties(&body, index))
    }

    async fn get_document(&self, kind: DocumentKind, id: &str) -> Result<Option<Value>, SyncError> {
        let resp = self
            .request(reqwest::Method::GET, &self.doc_path(kind, id))
            .send()
            .await
            .map_err(transport_error)?;
        if resp.status().as_u16() == 404 {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(status_error(resp, kind.index()).await);
        }
        let body: Value = resp.json().await.map_err(transport_error)?;
        if body.get("found").and_then(Value::as_bool) == Some(false) {
            return Ok(None);
        }
        Ok(body.get("_source").cloned())
    }

    async fn bulk(&self, ops: &[BulkOp]) -> Result<BulkResponse, SyncError> {
        if ops.is_empty() {
            return Ok(BulkResponse::default());
        }
        let resp = self
            .request(reqwest::Method::POST, "_bulk")
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(self.ndjson(ops))
            .send()
            .await
            .map_err(transport_error)?;
        if !resp.status().is_success() {
            return Err(status_error(resp, "_bulk").await);
        }
        let body: Value = resp.json().await.map_err(transport_error)?;
        parse_bulk_response(&body)
    }

    fn name(&self) -> &str {
        &self.base
    }
}
