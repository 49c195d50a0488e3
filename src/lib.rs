//! Quorum - ERC20Votes delegation indexer
//!
//! Scans governance token contracts for delegation events and maintains
//! per-delegate and per-governance voting power in a persistent RocksDB
//! ledger, with resumable checkpoints and reorg rollback.

pub mod keys;
pub mod records;
pub mod store;
pub mod units;
pub mod cli;
pub mod query;

// Indexer modules
pub mod abi;
pub mod checkpoint;
pub mod config;
pub mod dispatch;
pub mod events;
pub mod handlers;
pub mod rpc;
pub mod scanner;
pub mod templates;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export the main types for convenience
pub use records::{DelegateRecord, GovernanceRecord, TrackedInstance};
pub use store::{LedgerStore, LedgerView, MemoryLedgerStore, RocksLedgerStore};
