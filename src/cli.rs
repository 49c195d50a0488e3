//! CLI implementation for quorumctl
//!
//! Read-only queries over the governance ledger. The database is opened in
//! read-only mode so the CLI can run next to a live indexer. All commands
//! output pretty JSON.

use crate::query::{DelegateFilter, DelegateOrder, QueryService};
use crate::store::{KvRead, RocksLedgerStore};
use crate::types::pad_hex_string;
use crate::units::parse_raw_amount;
use alloy_primitives::Address;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;

/// Governance ledger query tool
#[derive(Parser)]
#[command(name = "quorumctl")]
#[command(about = "Query indexed governance delegation state")]
pub struct Cli {
    /// Path to the RocksDB database directory
    #[arg(short, long, default_value = "./quorum_db")]
    db_path: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Get a governance aggregate
    Governance {
        /// Governance token address (hex, with or without 0x prefix)
        id: String,
    },
    /// List governances
    Governances {
        /// Maximum number of results
        #[arg(long, default_value_t = 100)]
        first: usize,
        /// Results to skip
        #[arg(long, default_value_t = 0)]
        skip: usize,
    },
    /// Get one delegate of a governance
    Delegate {
        /// Governance token address (hex, with or without 0x prefix)
        governance: String,
        /// Delegate address (hex, with or without 0x prefix)
        delegate: String,
    },
    /// List delegates
    Delegates {
        /// Only delegates of this governance
        #[arg(long)]
        governance: Option<String>,
        /// Minimum delegated votes in the smallest unit (decimal)
        #[arg(long)]
        min_votes_raw: Option<String>,
        /// Sort order
        #[arg(long, value_enum, default_value_t = DelegateOrder::Id)]
        order: DelegateOrder,
        /// Maximum number of results
        #[arg(long, default_value_t = 100)]
        first: usize,
        /// Results to skip
        #[arg(long, default_value_t = 0)]
        skip: usize,
    },
    /// Show scan progress
    Status,
}

/// Parse a hex string into a 20-byte address.
fn parse_address(s: &str) -> Result<Address> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let s = pad_hex_string(s);
    let bytes = hex::decode(&s).with_context(|| format!("Invalid hex address: {}", s))?;
    if bytes.len() != 20 {
        anyhow::bail!("Address must be 20 bytes (40 hex chars), got {} bytes", bytes.len());
    }
    Ok(Address::from_slice(&bytes))
}

/// Run one command against a ledger and build its JSON output.
pub fn execute<S: KvRead + ?Sized>(store: &S, command: Commands) -> Result<Value> {
    let query = QueryService::new(store);
    let result = match command {
        Commands::Governance { id } => {
            let id = parse_address(&id)?;
            json!({ "governance": query.governance(id)? })
        }
        Commands::Governances { first, skip } => {
            json!({ "governances": query.governances(first, skip)? })
        }
        Commands::Delegate {
            governance,
            delegate,
        } => {
            let governance = parse_address(&governance)?;
            let delegate = parse_address(&delegate)?;
            json!({ "delegate": query.delegate(governance, delegate)? })
        }
        Commands::Delegates {
            governance,
            min_votes_raw,
            order,
            first,
            skip,
        } => {
            let filter = DelegateFilter {
                governance: governance.as_deref().map(parse_address).transpose()?,
                min_votes_raw: min_votes_raw.as_deref().map(parse_raw_amount).transpose()?,
                order,
                first,
                skip,
            };
            json!({ "delegates": query.delegates(&filter)? })
        }
        Commands::Status => json!(query.status()?),
    };
    Ok(result)
}

/// Run the CLI command and print JSON output.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let store = RocksLedgerStore::open_read_only(&cli.db_path)
        .with_context(|| format!("Failed to open database at {:?}", cli.db_path))?;

    let result = execute(&store, cli.command)?;

    // Pretty print JSON
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
