//! Key encoding and decoding utilities
//!
//! All keys use a single-byte prefix followed by binary data.
//! This ensures deterministic, lexicographically ordered keys in RocksDB,
//! so prefix scans return delegates grouped by governance and block-keyed
//! entries in ascending block order.

use alloy_primitives::Address;

/// Encode a delegate key.
///
/// Format: byte 'D' (0x44) + governance (20 bytes) + delegate (20 bytes)
/// Total length: 41 bytes
pub fn encode_delegate_key(governance: Address, delegate: Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(41);
    key.push(b'D');
    key.extend_from_slice(governance.as_slice());
    key.extend_from_slice(delegate.as_slice());
    key
}

/// Prefix shared by every delegate of one governance.
pub fn encode_delegate_prefix(governance: Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(21);
    key.push(b'D');
    key.extend_from_slice(governance.as_slice());
    key
}

/// Encode a governance key.
///
/// Format: byte 'G' (0x47) + governance id (20 bytes)
/// Total length: 21 bytes
pub fn encode_governance_key(governance: Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(21);
    key.push(b'G');
    key.extend_from_slice(governance.as_slice());
    key
}

/// Encode a tracked instance key.
///
/// Format: byte 'T' (0x54) + contract address (20 bytes)
/// Total length: 21 bytes
pub fn encode_instance_key(address: Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(21);
    key.push(b'T');
    key.extend_from_slice(address.as_slice());
    key
}

/// Encode a per-contract checkpoint key.
///
/// Format: byte 'K' (0x4B) + contract address (20 bytes)
/// Total length: 21 bytes
pub fn encode_checkpoint_key(address: Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(21);
    key.push(b'K');
    key.extend_from_slice(address.as_slice());
    key
}

/// Decode the contract address out of a checkpoint key.
pub fn decode_checkpoint_key(key: &[u8]) -> Option<Address> {
    if key.len() != 21 || key[0] != b'K' {
        return None;
    }
    Some(Address::from_slice(&key[1..]))
}

/// Encode a block hash key.
///
/// Format: byte 'B' (0x42) + block_number (8 bytes, big-endian)
/// Total length: 9 bytes
pub fn encode_block_hash_key(block: u64) -> Vec<u8> {
    encode_block_keyed(b'B', block)
}

/// Encode an undo journal key.
///
/// Format: byte 'J' (0x4A) + block_number (8 bytes, big-endian)
/// Total length: 9 bytes
pub fn encode_journal_key(block: u64) -> Vec<u8> {
    encode_block_keyed(b'J', block)
}

fn encode_block_keyed(prefix: u8, block: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(9);
    key.push(prefix);
    key.extend_from_slice(&block.to_be_bytes());
    key
}

/// Decode the block number out of a block hash or journal key.
pub fn decode_block_number_key(key: &[u8]) -> Option<u64> {
    if key.len() != 9 {
        return None;
    }
    let bytes: [u8; 8] = key[1..9].try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

/// Encode a meta key.
///
/// Format: byte 'M' (0x4D) + meta_id (1 byte)
/// Total length: 2 bytes
///
/// Meta IDs:
/// - 0x01: head_block
/// - 0x02: config fingerprint
pub fn encode_meta_key(meta_id: u8) -> Vec<u8> {
    vec![b'M', meta_id]
}

pub const META_HEAD: u8 = 0x01;
pub const META_CONFIG_FINGERPRINT: u8 = 0x02;

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    #[test]
    fn test_delegate_key_encoding() {
        let gov = address!("0000000000000000000000000000000000000001");
        let delegate = address!("0742d35Cc6634C0532925a3b844Bc9e7595f0bEb");
        let key = encode_delegate_key(gov, delegate);
        assert_eq!(key.len(), 41);
        assert_eq!(key[0], b'D');
        assert_eq!(&key[1..21], gov.as_slice());
        assert_eq!(&key[21..], delegate.as_slice());
        assert!(key.starts_with(&encode_delegate_prefix(gov)));
    }

    #[test]
    fn test_delegate_prefix_separates_governances() {
        let gov_a = address!("0000000000000000000000000000000000000001");
        let gov_b = address!("0000000000000000000000000000000000000002");
        let delegate = address!("0742d35Cc6634C0532925a3b844Bc9e7595f0bEb");
        let key = encode_delegate_key(gov_b, delegate);
        assert!(!key.starts_with(&encode_delegate_prefix(gov_a)));
    }

    #[test]
    fn test_checkpoint_key_roundtrip() {
        let addr = address!("dAC17F958D2ee523a2206206994597C13D831ec7");
        let key = encode_checkpoint_key(addr);
        assert_eq!(key.len(), 21);
        assert_eq!(decode_checkpoint_key(&key), Some(addr));
        assert_eq!(decode_checkpoint_key(&encode_instance_key(addr)), None);
    }

    #[test]
    fn test_block_keys_sort_by_number() {
        let low = encode_journal_key(255);
        let high = encode_journal_key(256);
        assert!(low < high);
        assert_eq!(decode_block_number_key(&high), Some(256));
        assert_eq!(encode_block_hash_key(7)[0], b'B');
    }

    #[test]
    fn test_meta_key_encoding() {
        let key = encode_meta_key(META_HEAD);
        assert_eq!(key.len(), 2);
        assert_eq!(key[0], b'M');
        assert_eq!(key[1], 0x01);
    }
}
