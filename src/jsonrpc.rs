//! Minimal JSON-RPC 2.0 client over HTTP.
//!
//! Shared by the wallet provider endpoint and the contract transport. Both
//! map [`RpcFailure`] into their own error types.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};

/// HTTP timeout for a single JSON-RPC round-trip.
pub const RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// Code used when the failure happened below the JSON-RPC layer.
pub const TRANSPORT_ERROR_CODE: i64 = -32603;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcFailure {
    pub code: i64,
    pub message: String,
}

impl RpcFailure {
    fn transport(message: impl Into<String>) -> Self {
        Self {
            code: TRANSPORT_ERROR_CODE,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for RpcFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug)]
pub struct JsonRpcClient {
    client: Client,
    url: String,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(RPC_TIMEOUT)
                .build()
                .unwrap_or_else(|_| Client::new()),
            url: url.into(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Issue one call. A missing `result` decodes as `null`.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, RpcFailure> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        tracing::trace!(method, id, "json-rpc request");

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RpcFailure::transport(format!("request to {} failed: {e}", self.url)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RpcFailure::transport(format!(
                "{} returned HTTP {status}",
                self.url
            )));
        }

        let decoded: RpcResponse = response
            .json()
            .await
            .map_err(|e| RpcFailure::transport(format!("invalid JSON-RPC response: {e}")))?;

        if let Some(error) = decoded.error {
            return Err(RpcFailure {
                code: error.code,
                message: error.message,
            });
        }
        Ok(decoded.result.unwrap_or(Value::Null))
    }
}
