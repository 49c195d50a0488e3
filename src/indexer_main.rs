//! Governance delegation indexer binary
//!
//! Tracks ERC20Votes delegation for the configured contracts and every
//! governance token the configured factories deploy.

use anyhow::{Context, Result};
use clap::Parser;
use quorum::checkpoint::reconcile_config;
use quorum::config::{load_config, Environment};
use quorum::dispatch::Dispatcher;
use quorum::rpc::RpcClient;
use quorum::scanner::{ScanOptions, Scanner};
use quorum::store::RocksLedgerStore;
use quorum::templates::TemplateRegistry;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Governance delegation indexer
#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Index ERC20Votes delegation into a local ledger")]
struct Args {
    /// Path to the JSON config file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Path to RocksDB database directory
    #[arg(short, long, default_value = "./quorum_db")]
    db_path: PathBuf,

    /// RPC endpoint URL, overrides the config file
    #[arg(short, long, env = "NETWORK_NODE_URL")]
    rpc_url: Option<String>,

    /// Deployment environment; production waits before opening the ledger
    #[arg(short, long, env = "APP_ENV", value_enum, default_value_t = Environment::Local)]
    environment: Environment,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = load_config(&args.config)?;
    if let Some(url) = args.rpc_url {
        config.network_node_url = url;
    }

    info!("Starting governance indexer");
    info!("RPC URL: {}", config.network_node_url);
    info!("Config: {:?}", args.config);
    info!("Database: {:?}", args.db_path);

    let store = RocksLedgerStore::open_after(&args.db_path, args.environment.startup_delay())
        .await
        .with_context(|| format!("Failed to open database at {:?}", args.db_path))?;

    if reconcile_config(&store, config.fingerprint()?)? {
        info!("Ledger was reset for the new config");
    }

    let registry = TemplateRegistry::from_config(&config)?;
    let seeded = registry
        .seed_sources(&store, &config)
        .context("Failed to seed sources")?;
    info!("Tracking {} new sources", seeded);

    let rpc = RpcClient::new(config.network_node_url.clone());
    let scanner = Scanner::new(
        Arc::new(store),
        rpc,
        Dispatcher::new(registry),
        ScanOptions::from_config(&config),
    );

    // Handle Ctrl+C gracefully
    tokio::select! {
        result = scanner.run() => {
            result.context("Scanner error")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    info!("Indexer stopped");
    Ok(())
}
