//! quorumctl - governance ledger query tool
//!
//! Reads delegates, governances and scan progress from the RocksDB ledger
//! written by the indexer.

use quorum::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
