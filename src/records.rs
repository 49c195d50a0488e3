//! Record types for the governance ledger
//!
//! These structs represent the data stored in the ledger store.
//! They use postcard for binary serialization, which is compact and deterministic.

use crate::units::{format_signed_units, format_units, DECIMALS};
use alloy_primitives::{Address, I256, U256};
use serde::{Deserialize, Serialize};

/// Voting power held by one delegate within one governance contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegateRecord {
    /// Governance (token contract) this delegate belongs to
    pub governance: Address,
    /// Delegate address
    pub delegate: Address,
    /// Number of token holders currently delegating to this delegate.
    /// Signed: the decrement on re-delegation is not clamped.
    pub token_holders_represented_amount: i64,
    /// Delegated votes in the token's smallest unit
    pub delegated_votes_raw: U256,
    /// Delegated votes scaled by [`DECIMALS`]
    pub delegated_votes: String,
}

impl DelegateRecord {
    /// Zero-state delegate, used when a handler references an unseen key.
    pub fn new(governance: Address, delegate: Address) -> Self {
        Self {
            governance,
            delegate,
            token_holders_represented_amount: 0,
            delegated_votes_raw: U256::ZERO,
            delegated_votes: format_units(U256::ZERO, DECIMALS),
        }
    }

    /// Replace the raw balance and refresh the formatted one.
    pub fn set_votes(&mut self, raw: U256) {
        self.delegated_votes_raw = raw;
        self.delegated_votes = format_units(raw, DECIMALS);
    }

    /// Composite id: `<governance>/<delegate>`.
    pub fn id(&self) -> String {
        format!("0x{:x}/0x{:x}", self.governance, self.delegate)
    }
}

/// Aggregate state of one governance token contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceRecord {
    /// Governance id (the token contract address)
    pub id: Address,
    /// Delegates currently holding non-zero voting power
    pub current_delegates: i64,
    /// Sum of all delegated votes in the smallest unit.
    /// Signed: a source tracked from mid-history sees balances drop that
    /// were never added, which can take the sum below zero.
    #[serde(with = "decimal_string")]
    pub delegated_votes_raw: I256,
    /// Sum of all delegated votes scaled by [`DECIMALS`]
    pub delegated_votes: String,
}

impl GovernanceRecord {
    /// Zero-state governance.
    pub fn new(id: Address) -> Self {
        Self {
            id,
            current_delegates: 0,
            delegated_votes_raw: I256::ZERO,
            delegated_votes: format_signed_units(I256::ZERO, DECIMALS),
        }
    }

    /// Replace the raw aggregate and refresh the formatted one.
    pub fn set_votes(&mut self, raw: I256) {
        self.delegated_votes_raw = raw;
        self.delegated_votes = format_signed_units(raw, DECIMALS);
    }
}

/// Signed 256-bit integers as decimal strings.
///
/// The stock `I256` deserializer needs a self-describing format, which
/// postcard is not.
mod decimal_string {
    use alloy_primitives::I256;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &I256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<I256, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// A contract the scanner fetches logs for, bound to a template.
///
/// Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedInstance {
    /// Template name (selects the event bindings)
    pub template: String,
    /// Contract address
    pub address: Address,
    /// First block whose logs belong to this instance
    pub start_block: u64,
}

/// Undo information for one block.
///
/// Holds, for every key a block touched, the value it had before the block
/// was applied (`None` when the key did not exist).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockJournal {
    pub entries: Vec<JournalEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub column: crate::store::Column,
    pub key: Vec<u8>,
    pub prior: Option<Vec<u8>>,
}

impl BlockJournal {
    /// Merge entries of a later commit for the same block.
    ///
    /// Keys already journaled keep their earliest prior value.
    pub fn merge(&mut self, later: BlockJournal) {
        for entry in later.entries {
            let known = self
                .entries
                .iter()
                .any(|e| e.column == entry.column && e.key == entry.key);
            if !known {
                self.entries.push(entry);
            }
        }
    }
}
