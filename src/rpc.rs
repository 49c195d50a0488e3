//! JSON-RPC client for Ethereum nodes
//!
//! Provides a typed interface to Ethereum JSON-RPC endpoints and the
//! [`ChainSource`] abstraction the scanner reads the chain through.

use crate::types::{parse_hex_u64, BlockHeader, Log};
use alloy_primitives::Address;
use anyhow::{Context, Result};
use serde_json::{json, Value};

/// Which head the scanner treats as safe to index up to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadTag {
    Latest,
    Finalized,
}

/// Read access to a chain, as needed by the scanner.
#[allow(async_fn_in_trait)]
pub trait ChainSource {
    /// Number of the newest block for `tag`.
    async fn head_block(&self, tag: HeadTag) -> Result<u64>;

    /// Header of a block by number.
    async fn block_header(&self, number: u64) -> Result<BlockHeader>;

    /// Logs emitted by any of `addresses` in `from..=to`.
    async fn logs(&self, addresses: &[Address], from: u64, to: u64) -> Result<Vec<Log>>;
}

/// JSON-RPC client for Ethereum nodes.
pub struct RpcClient {
    client: reqwest::Client,
    url: String,
}

impl RpcClient {
    /// Create a new RPC client.
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }

    /// Make a JSON-RPC call.
    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params
        });

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .context("Failed to send RPC request")?;

        let json: Value = response
            .json()
            .await
            .context("Failed to parse RPC response")?;

        // Check for RPC error
        if let Some(error) = json.get("error") {
            anyhow::bail!("RPC error: {}", error);
        }

        // Extract result
        json.get("result")
            .cloned()
            .context("RPC response missing 'result' field")
    }

    /// Get the header of a block by number or tag ("latest", "finalized", "0x10").
    ///
    /// Returns `None` when the node does not know the block or tag.
    async fn get_header(&self, block: &str) -> Result<Option<BlockHeader>> {
        let params = json!([block, false]);
        let result = self.call("eth_getBlockByNumber", params).await?;
        if result.is_null() {
            return Ok(None);
        }
        let header = serde_json::from_value(result).context("Failed to deserialize block header")?;
        Ok(Some(header))
    }

    /// Get the current block number for "latest".
    pub async fn get_block_number(&self) -> Result<u64> {
        let result = self.call("eth_blockNumber", json!([])).await?;
        let number_str = result
            .as_str()
            .context("Block number response is not a string")?;
        parse_hex_u64(number_str).context("Failed to parse block number")
    }

    /// Get the current finalized block number.
    ///
    /// Tries "finalized" first, then falls back to "latest" if finalized is not available
    /// (e.g., on local test nodes like Anvil).
    pub async fn get_finalized_block_number(&self) -> Result<u64> {
        match finalized_number(self.get_header("finalized").await) {
            Some(number) => Ok(number),
            None => self.get_block_number().await,
        }
    }

    /// Get logs for a set of contract addresses over a block range.
    pub async fn get_logs(&self, addresses: &[Address], from: u64, to: u64) -> Result<Vec<Log>> {
        let result = self.call("eth_getLogs", logs_params(addresses, from, to)).await?;
        serde_json::from_value(result).context("Failed to deserialize logs")
    }
}

/// Number of the "finalized" header, or `None` when the caller should fall
/// back to "latest".
fn finalized_number(finalized: Result<Option<BlockHeader>>) -> Option<u64> {
    match finalized {
        Ok(Some(header)) => Some(header.number),
        Ok(None) => {
            tracing::debug!("'finalized' block tag not available, falling back to 'latest'");
            None
        }
        Err(e) => {
            tracing::debug!("'finalized' block tag failed ({:#}), falling back to 'latest'", e);
            None
        }
    }
}

/// `eth_getLogs` params for a set of contracts over an inclusive block range.
fn logs_params(addresses: &[Address], from: u64, to: u64) -> Value {
    let addresses: Vec<String> = addresses.iter().map(|a| format!("0x{:x}", a)).collect();
    json!([{
        "fromBlock": format!("0x{:x}", from),
        "toBlock": format!("0x{:x}", to),
        "address": addresses,
    }])
}

impl ChainSource for RpcClient {
    async fn head_block(&self, tag: HeadTag) -> Result<u64> {
        match tag {
            HeadTag::Latest => self.get_block_number().await,
            HeadTag::Finalized => self.get_finalized_block_number().await,
        }
    }

    async fn block_header(&self, number: u64) -> Result<BlockHeader> {
        self.get_header(&format!("0x{:x}", number))
            .await?
            .with_context(|| format!("Block {} not found", number))
    }

    async fn logs(&self, addresses: &[Address], from: u64, to: u64) -> Result<Vec<Log>> {
        if addresses.is_empty() {
            return Ok(Vec::new());
        }
        self.get_logs(addresses, from, to).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, B256};

    fn header(number: u64) -> BlockHeader {
        BlockHeader {
            number,
            hash: B256::repeat_byte(1),
            parent_hash: B256::ZERO,
        }
    }

    #[test]
    fn test_finalized_header_is_used() {
        assert_eq!(finalized_number(Ok(Some(header(90)))), Some(90));
    }

    #[test]
    fn test_missing_finalized_falls_back() {
        // Anvil and other dev nodes return null for the tag
        assert_eq!(finalized_number(Ok(None)), None);
        // Older nodes reject the tag outright
        let rejected = Err(anyhow::anyhow!("RPC error: invalid block tag"));
        assert_eq!(finalized_number(rejected), None);
    }

    #[test]
    fn test_logs_params() {
        // Addresses and block numbers go over the wire as lowercase 0x-prefixed hex
        let addr = address!("0742d35Cc6634C0532925a3b844Bc9e7595f0bEb");
        let params = logs_params(&[addr], 436, 1000);
        assert_eq!(
            params,
            json!([{
                "fromBlock": "0x1b4",
                "toBlock": "0x3e8",
                "address": ["0x0742d35cc6634c0532925a3b844bc9e7595f0beb"],
            }])
        );
    }
}
