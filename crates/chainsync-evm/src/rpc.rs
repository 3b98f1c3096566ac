//! JSON-RPC 2.0 wire types and an HTTP transport backed by `reqwest`.
//!
//! The transport performs exactly one attempt per call. Backoff and
//! per-call deadlines belong to the engine's retry policy.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use chainsync_core::error::SyncError;

/// A JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: Vec<Value>,
    pub id: u64,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            method: method.into(),
            params,
            id,
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// Error codes providers use to say "slow down": EIP-1474 limit exceeded,
/// QuickNode / Ankr request limits, and a bare HTTP-style 429.
const THROTTLE_CODES: [i64; 4] = [-32005, -32007, -32090, 429];

impl JsonRpcError {
    /// Rate-limit replies are worth retrying; everything else is the node's answer.
    pub fn is_throttled(&self) -> bool {
        if THROTTLE_CODES.contains(&self.code) {
            return true;
        }
        let message = self.message.to_ascii_lowercase();
        message.contains("rate limit") || message.contains("too many requests")
    }
}

impl JsonRpcResponse {
    /// The result value (`null` when absent), or the error object as
    /// [`SyncError::Transient`] when throttled and [`SyncError::Rpc`] otherwise.
    pub fn into_result(self) -> Result<Value, SyncError> {
        match self.error {
            Some(err) if err.is_throttled() => Err(SyncError::Transient(format!(
                "rate limited ({}): {}",
                err.code, err.message
            ))),
            Some(err) => Err(SyncError::Rpc {
                code: err.code,
                message: err.message,
            }),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Anything that can carry a JSON-RPC call to a node.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, SyncError>;

    fn url(&self) -> &str;
}

/// HTTP JSON-RPC client.
pub struct HttpRpcClient {
    url: String,
    http: reqwest::Client,
    request_timeout: Duration,
    next_id: AtomicU64,
}

impl HttpRpcClient {
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| SyncError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            url: url.into(),
            http,
            request_timeout,
            next_id: AtomicU64::new(1),
        })
    }

    fn classify(&self, method: &str, e: reqwest::Error) -> SyncError {
        if e.is_timeout() {
            SyncError::Timeout {
                operation: method.to_string(),
                ms: self.request_timeout.as_millis() as u64,
            }
        } else if e.is_decode() {
            SyncError::Decode(format!("{method}: {e}"))
        } else {
            SyncError::Transient(format!("{method}: {e}"))
        }
    }
}

#[async_trait]
impl RpcTransport for HttpRpcClient {
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, SyncError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let req = JsonRpcRequest::new(id, method, params);

        let resp = self
            .http
            .post(&self.url)
            .json(&req)
            .send()
            .await
            .map_err(|e| self.classify(method, e))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(if status == 429 || status >= 500 {
                SyncError::Transient(format!("{method}: HTTP {status}: {body}"))
            } else {
                SyncError::Rpc {
                    code: i64::from(status),
                    message: format!("{method}: HTTP {status}: {body}"),
                }
            });
        }

        resp.json::<JsonRpcResponse>()
            .await
            .map_err(|e| self.classify(method, e))?
            .into_result()
    }

    fn url(&self) -> &str {
        &self.url
    }
}
