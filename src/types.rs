//! Ethereum JSON-RPC types
//!
//! Type definitions for block headers and logs
//! returned from Ethereum JSON-RPC endpoints.

use alloy_primitives::{Address, B256};
use serde::{Deserialize, Deserializer};

/// Block header fields needed for range scanning and reorg detection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BlockHeader {
    /// Block number (hex string in JSON, parsed to u64)
    #[serde(rename = "number", deserialize_with = "deserialize_hex_u64")]
    pub number: u64,

    /// Block hash (hex string in JSON)
    #[serde(rename = "hash", deserialize_with = "deserialize_hex_b256")]
    pub hash: B256,

    /// Parent block hash (hex string in JSON)
    #[serde(rename = "parentHash", deserialize_with = "deserialize_hex_b256")]
    pub parent_hash: B256,
}

/// Log entry emitted by a contract, as returned by `eth_getLogs`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Log {
    /// Address of the contract that emitted the log
    #[serde(rename = "address", deserialize_with = "deserialize_hex_address")]
    pub address: Address,

    /// Indexed topics (topic0 = event signature, topics[1..] = indexed params)
    #[serde(rename = "topics", default, deserialize_with = "deserialize_hex_b256_vec")]
    pub topics: Vec<B256>,

    /// Non-indexed event data (hex string)
    #[serde(rename = "data", deserialize_with = "deserialize_hex_bytes")]
    pub data: Vec<u8>,

    /// Block the log was included in
    #[serde(rename = "blockNumber", deserialize_with = "deserialize_hex_u64")]
    pub block_number: u64,

    /// Hash of the including block
    #[serde(rename = "blockHash", deserialize_with = "deserialize_hex_b256")]
    pub block_hash: B256,

    /// Hash of the emitting transaction
    #[serde(rename = "transactionHash", deserialize_with = "deserialize_hex_b256")]
    pub transaction_hash: B256,

    /// Position of the log within its block
    #[serde(rename = "logIndex", deserialize_with = "deserialize_hex_u64")]
    pub log_index: u64,

    /// True when the log was dropped by a reorg (only set on subscriptions
    /// and some filter responses)
    #[serde(rename = "removed", default)]
    pub removed: bool,
}

impl Log {
    /// Event signature hash, if the log has topics at all.
    pub fn topic0(&self) -> Option<B256> {
        self.topics.first().copied()
    }

    /// Sort key placing logs in on-chain order.
    pub fn position(&self) -> (u64, u64) {
        (self.block_number, self.log_index)
    }
}

// Hex deserialization helpers

/// Pad an odd-length hex string with a leading zero.
/// This handles cases where RPC returns hex strings without leading zeros.
pub(crate) fn pad_hex_string(s: &str) -> String {
    if s.len() % 2 == 1 {
        format!("0{}", s)
    } else {
        s.to_string()
    }
}

/// Parse a `0x`-prefixed hex quantity into u64.
pub(crate) fn parse_hex_u64(s: &str) -> Result<u64, std::num::ParseIntError> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(s, 16)
}

fn parse_b256(s: &str) -> Result<B256, String> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(pad_hex_string(s)).map_err(|e| e.to_string())?;
    if bytes.len() != 32 {
        return Err(format!("Expected 32 bytes for hash, got {}", bytes.len()));
    }
    Ok(B256::from_slice(&bytes))
}

/// Deserialize a hex string to u64.
fn deserialize_hex_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_hex_u64(&s).map_err(serde::de::Error::custom)
}

/// Deserialize a hex string to B256.
fn deserialize_hex_b256<'de, D>(deserializer: D) -> Result<B256, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_b256(&s).map_err(serde::de::Error::custom)
}

/// Deserialize a list of hex strings to B256 topics.
fn deserialize_hex_b256_vec<'de, D>(deserializer: D) -> Result<Vec<B256>, D::Error>
where
    D: Deserializer<'de>,
{
    let items = Vec::<String>::deserialize(deserializer)?;
    items
        .iter()
        .map(|s| parse_b256(s).map_err(serde::de::Error::custom))
        .collect()
}

/// Deserialize a hex string to Address.
fn deserialize_hex_address<'de, D>(deserializer: D) -> Result<Address, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    let s = s.strip_prefix("0x").unwrap_or(&s);
    let bytes = hex::decode(pad_hex_string(s)).map_err(serde::de::Error::custom)?;
    if bytes.len() != 20 {
        return Err(serde::de::Error::custom(format!(
            "Expected 20 bytes for address, got {}",
            bytes.len()
        )));
    }
    Ok(Address::from_slice(&bytes))
}

/// Deserialize a hex string to bytes.
fn deserialize_hex_bytes<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    let s = s.strip_prefix("0x").unwrap_or(&s);
    if s.is_empty() {
        Ok(Vec::new())
    } else {
        hex::decode(pad_hex_string(s)).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;
    use serde_json::json;

    #[test]
    fn test_deserialize_log() {
        let raw = json!({
            "address": "0x75db1eee7b03a0c9bcad50cb381b068c209c81ef",
            "topics": [
                "0xdec2bacdd2f05b59de34da9b523dff8be42e5e38e818c82fdb0bae774387a724",
                "0x00000000000000000000000070997970c51812dc3a010c7d01b50e0d17dc79c8"
            ],
            "data": "0x",
            "blockNumber": "0x1b4",
            "blockHash": "0xaa00000000000000000000000000000000000000000000000000000000000001",
            "transactionHash": "0xbb00000000000000000000000000000000000000000000000000000000000002",
            "logIndex": "0x3"
        });
        let log: Log = serde_json::from_value(raw).unwrap();
        assert_eq!(log.address, address!("75DB1EEE7b03A0C9BcAD50Cb381B068c209c81ef"));
        assert_eq!(log.topics.len(), 2);
        assert!(log.data.is_empty());
        assert_eq!(log.position(), (436, 3));
        assert!(!log.removed);
    }

    #[test]
    fn test_deserialize_header() {
        let raw = json!({
            "number": "0x10",
            "hash": "0x0000000000000000000000000000000000000000000000000000000000000010",
            "parentHash": "0x000000000000000000000000000000000000000000000000000000000000000f",
            "miner": "0x0000000000000000000000000000000000000000"
        });
        let header: BlockHeader = serde_json::from_value(raw).unwrap();
        assert_eq!(header.number, 16);
    }

    #[test]
    fn test_odd_length_quantity() {
        assert_eq!(parse_hex_u64("0xa").unwrap(), 10);
        assert_eq!(pad_hex_string("abc"), "0abc");
    }
}
