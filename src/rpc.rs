//! JSON-RPC over HTTP
//!
//! Thin client shared by the exchange and ledger implementations. Every
//! call is bounded by the client's request timeout; transport failures and
//! timeouts map to `FeedError::Network`, RPC-level errors keep the node's
//! message.

use reqwest::{
    header::{HeaderMap, HeaderValue, CONTENT_TYPE},
    Client,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::error::{FeedError, FeedResult};

/// Run `fut` with a deadline; expiry is reported as a network failure of
/// `what`.
pub async fn with_timeout<T, F>(limit: Duration, what: &str, fut: F) -> FeedResult<T>
where
    F: Future<Output = FeedResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(FeedError::Network(format!(
            "{} timed out after {}s",
            what,
            limit.as_secs_f64()
        ))),
    }
}

#[derive(Debug, Deserialize)]
struct RpcError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

/// JSON-RPC 2.0 client for one node
pub struct RpcClient {
    client: Client,
    url: String,
    timeout: Duration,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(url: &str, timeout: Duration) -> FeedResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| FeedError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
            timeout,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Call `method` with positional `params` and return the raw result.
    /// A `null` result is returned as `Value::Null`.
    pub async fn call(&self, method: &str, params: Value) -> FeedResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        tracing::debug!(url = %self.url, method, id, "rpc call");

        let what = format!("{} {}", self.url, method);
        with_timeout(self.timeout, &what, async {
            let response = self
                .client
                .post(&self.url)
                .json(&payload)
                .send()
                .await
                .map_err(|e| FeedError::Network(format!("{}: {}", what, e)))?;

            if !response.status().is_success() {
                return Err(FeedError::Network(format!(
                    "{} returned HTTP {}",
                    what,
                    response.status()
                )));
            }

            let body: RpcResponse = response
                .json()
                .await
                .map_err(|e| FeedError::Network(format!("{}: malformed response: {}", what, e)))?;

            if let Some(err) = body.error {
                return Err(FeedError::Network(format!(
                    "{} failed with code {}: {}",
                    what, err.code, err.message
                )));
            }

            Ok(body.result.unwrap_or(Value::Null))
        })
        .await
    }

    /// Call and deserialize the result into `T`
    pub async fn call_as<T: DeserializeOwned>(&self, method: &str, params: Value) -> FeedResult<T> {
        let raw = self.call(method, params).await?;
        serde_json::from_value(raw).map_err(|e| {
            FeedError::Network(format!(
                "{} {}: unexpected result shape: {}",
                self.url, method, e
            ))
        })
    }
}
