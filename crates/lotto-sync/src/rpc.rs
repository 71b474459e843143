//! JSON-RPC client for the upstream chain endpoint
//!
//! Thin wrapper over `eth_getLogs`, `eth_blockNumber`,
//! `eth_getBlockByNumber` and `eth_call`. The fetch layer talks to the
//! [`LogSource`] trait so tests can substitute a scripted source.

use crate::{is_range_too_large, Error, Result};
use async_trait::async_trait;
use lotto_core::RawLog;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A log query over an inclusive block range.
#[derive(Debug, Clone)]
pub struct LogFilter {
    /// First block, inclusive
    pub from_block: u64,
    /// Last block, inclusive
    pub to_block: u64,
    /// Emitting contract address
    pub address: String,
    /// Topic positions; `None` matches anything at that position,
    /// a list matches any of its entries
    pub topics: Vec<Option<Vec<String>>>,
}

impl LogFilter {
    /// Filter for one or more signature topics over a range.
    pub fn for_topics(address: &str, from_block: u64, to_block: u64, topic0: Vec<String>) -> Self {
        Self {
            from_block,
            to_block,
            address: address.to_string(),
            topics: vec![Some(topic0)],
        }
    }

    /// Narrow the filter to a specific second topic.
    pub fn with_topic1(mut self, topic1: String) -> Self {
        while self.topics.len() < 2 {
            self.topics.push(None);
        }
        self.topics[1] = Some(vec![topic1]);
        self
    }
}

/// Source of chain logs and block facts.
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Fetch logs matching a filter. Implementations surface
    /// provider range-limit rejections as [`Error::RangeTooLarge`].
    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<RawLog>>;

    /// Current chain head.
    async fn block_number(&self) -> Result<u64>;

    /// Unix timestamp of a block.
    async fn block_timestamp(&self, block: u64) -> Result<u64>;
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// Raw log as it appears on the wire, quantities still hex-encoded.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireLog {
    address: String,
    topics: Vec<String>,
    data: String,
    block_number: String,
    transaction_hash: String,
    log_index: String,
}

/// JSON-RPC client over HTTP.
pub struct RpcClient {
    http: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl RpcClient {
    /// Create a client for an endpoint URL.
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            url: url.into(),
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<R: DeserializeOwned>(&self, method: &str, params: Value) -> Result<R> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response: RpcResponse<R> = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        if let Some(err) = response.error {
            if is_range_too_large(&err.message) {
                return Err(Error::RangeTooLarge(err.message));
            }
            return Err(Error::Rpc {
                code: err.code,
                message: err.message,
            });
        }

        response
            .result
            .ok_or_else(|| Error::InvalidResponse(format!("{}: missing result", method)))
    }

    /// Execute a read-only contract call at the latest block, returning
    /// the hex-encoded return data.
    pub async fn eth_call(&self, to: &str, data: &str) -> Result<String> {
        self.call(
            "eth_call",
            json!([{ "to": to, "data": data }, "latest"]),
        )
        .await
    }
}

#[async_trait]
impl LogSource for RpcClient {
    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<RawLog>> {
        let topics: Vec<Value> = filter
            .topics
            .iter()
            .map(|slot| match slot {
                None => Value::Null,
                Some(list) if list.len() == 1 => json!(list[0]),
                Some(list) => json!(list),
            })
            .collect();

        let params = json!([{
            "fromBlock": hex_block(filter.from_block),
            "toBlock": hex_block(filter.to_block),
            "address": filter.address,
            "topics": topics,
        }]);

        let wire: Vec<WireLog> = self.call("eth_getLogs", params).await?;
        wire.into_iter().map(wire_to_raw).collect()
    }

    async fn block_number(&self) -> Result<u64> {
        let hex: String = self.call("eth_blockNumber", json!([])).await?;
        parse_hex_u64(&hex)
    }

    async fn block_timestamp(&self, block: u64) -> Result<u64> {
        let header: Value = self
            .call(
                "eth_getBlockByNumber",
                json!([hex_block(block), false]),
            )
            .await?;
        let ts = header
            .get("timestamp")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidResponse(format!("block {} has no timestamp", block)))?;
        parse_hex_u64(ts)
    }
}

fn hex_block(block: u64) -> String {
    format!("0x{:x}", block)
}

fn parse_hex_u64(hex: &str) -> Result<u64> {
    let trimmed = hex.strip_prefix("0x").unwrap_or(hex);
    u64::from_str_radix(trimmed, 16)
        .map_err(|e| Error::InvalidResponse(format!("bad hex quantity {:?}: {}", hex, e)))
}

fn wire_to_raw(log: WireLog) -> Result<RawLog> {
    Ok(RawLog {
        address: log.address,
        topics: log.topics,
        data: log.data,
        block_number: parse_hex_u64(&log.block_number)?,
        transaction_hash: log.transaction_hash,
        log_index: parse_hex_u64(&log.log_index)?,
    })
}

#[allow(dead_code)]
fn _assert_rpc_client_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<RpcClient>();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_block_formatting() {
        assert_eq!(hex_block(0), "0x0");
        assert_eq!(hex_block(255), "0xff");
        assert_eq!(hex_block(6_250_000), "0x5f5e10");
    }

    #[test]
    fn test_parse_hex_u64() {
        assert_eq!(parse_hex_u64("0x10").unwrap(), 16);
        assert_eq!(parse_hex_u64("0x0").unwrap(), 0);
        assert!(parse_hex_u64("0xzz").is_err());
    }

    #[test]
    fn test_wire_log_conversion() {
        let wire = WireLog {
            address: "0xabc".to_string(),
            topics: vec!["0xdef".to_string()],
            data: "0x".to_string(),
            block_number: "0x64".to_string(),
            transaction_hash: "0x123".to_string(),
            log_index: "0x2".to_string(),
        };
        let raw = wire_to_raw(wire).unwrap();
        assert_eq!(raw.block_number, 100);
        assert_eq!(raw.log_index, 2);
    }

    #[test]
    fn test_filter_with_topic1() {
        let filter = LogFilter::for_topics("0xaa", 1, 10, vec!["0xt0".to_string()])
            .with_topic1("0xt1".to_string());
        assert_eq!(filter.topics.len(), 2);
        assert_eq!(filter.topics[1].as_ref().unwrap()[0], "0xt1");
    }
}
