//! JSON-RPC origin.
//!
//! Speaks the two calls the mirror needs to a node over HTTP. Every request
//! carries a client-side timeout so a stalled node fails the fetch instead of
//! stalling the poll loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy_primitives::{Address, B256, Bytes, U64};
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracemirror_core::RawLogEntry;
use tracing::{debug, warn};

use super::{LogFilter, Origin};
use crate::error::OriginError;

/// Configuration for the JSON-RPC origin.
#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// Node endpoint, e.g. `http://localhost:8545`.
    pub url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8545".to_string(),
            timeout: Duration::from_secs(15),
        }
    }
}

/// HTTP JSON-RPC client for a chain node.
#[derive(Debug, Clone)]
pub struct RpcOrigin {
    inner: Arc<RpcOriginInner>,
}

#[derive(Debug)]
struct RpcOriginInner {
    endpoint: String,
    http_client: Client,
    /// Keeps track of unique request ids
    id: AtomicU64,
}

impl RpcOrigin {
    pub fn new(config: RpcConfig) -> Result<Self, OriginError> {
        let http_client = Client::builder()
            .use_rustls_tls()
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(RpcOriginInner {
                endpoint: config.url,
                http_client,
                id: AtomicU64::new(1),
            }),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    fn request_body(&self, method: &str, params: Value) -> Value {
        json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": self.inner.id.fetch_add(1, Ordering::Relaxed),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, OriginError> {
        let body = self.request_body(method, params);

        let response: RpcResponse<T> = self
            .inner
            .http_client
            .post(self.endpoint())
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .inspect_err(|err| warn!(method, %err, "failed to read origin response"))?;

        response.into_result(method)
    }
}

impl Origin for RpcOrigin {
    fn name(&self) -> &'static str {
        "json-rpc"
    }

    async fn block_number(&self) -> Result<u64, OriginError> {
        let head: U64 = self.call("eth_blockNumber", json!([])).await?;
        Ok(head.to::<u64>())
    }

    async fn logs(&self, filter: &LogFilter) -> Result<Vec<RawLogEntry>, OriginError> {
        let params = json!([{
            "fromBlock": format!("{:#x}", filter.from_block),
            "toBlock": format!("{:#x}", filter.to_block),
            "address": filter.addresses,
        }]);

        let logs: Vec<RpcLog> = self.call("eth_getLogs", params).await?;
        debug!(
            from = filter.from_block,
            to = filter.to_block,
            count = logs.len(),
            "fetched logs"
        );

        logs.into_iter().map(RawLogEntry::try_from).collect()
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

impl<T> RpcResponse<T> {
    fn into_result(self, method: &str) -> Result<T, OriginError> {
        if let Some(error) = self.error {
            return Err(OriginError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        self.result
            .ok_or_else(|| OriginError::Malformed(format!("{method} returned no result")))
    }
}

/// A log object as returned by `eth_getLogs`.
///
/// Pending logs omit their position fields, so those are optional here and
/// required when converting.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcLog {
    address: Address,
    topics: Vec<B256>,
    data: Bytes,
    block_number: Option<U64>,
    transaction_hash: Option<B256>,
    log_index: Option<U64>,
    #[serde(default)]
    removed: bool,
}

impl TryFrom<RpcLog> for RawLogEntry {
    type Error = OriginError;

    fn try_from(log: RpcLog) -> Result<Self, Self::Error> {
        let missing = |field: &str| OriginError::Malformed(format!("log without {field}"));

        Ok(RawLogEntry {
            address: log.address,
            topics: log.topics,
            data: log.data,
            tx_hash: log.transaction_hash.ok_or_else(|| missing("transactionHash"))?,
            block_number: log.block_number.ok_or_else(|| missing("blockNumber"))?.to::<u64>(),
            log_index: log.log_index.ok_or_else(|| missing("logIndex"))?.to::<u64>(),
            removed: log.removed,
        })
    }
}
