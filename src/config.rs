//! Indexer configuration loading
//!
//! Handles loading the indexer configuration from a JSON file: network
//! endpoint, scanning parameters, static sources and templates.
//!
//! # Example file format:
//! ```json
//! {
//!   "network_node_url": "http://127.0.0.1:8545",
//!   "sources": [
//!     { "contract": "0x4B4F1C0e6E2bB3d8C36Fb5e1dA2B3F1d7a4E5c01", "start": 100, "template": "GeneralPurposeFactory" }
//!   ],
//!   "templates": {
//!     "GeneralPurposeFactory": {
//!       "events": [
//!         { "signature": "ContractDeployed(address,address)", "handler": "handleContractDeployed" }
//!       ]
//!     }
//!   }
//! }
//! ```

use crate::events::HandlerKind;
use crate::handlers::GENERIC_ERC20_VOTES_TEMPLATE;
use alloy_primitives::{keccak256, Address, B256};
use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Delay before the ledger is opened in production, so a replaced
/// deployment has released it before the new one starts. Best effort only.
pub const PRODUCTION_INDEXER_DELAY: Duration = Duration::from_secs(60);

/// Deployment environment the indexer runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn startup_delay(self) -> Duration {
        match self {
            Environment::Local => Duration::ZERO,
            Environment::Production => PRODUCTION_INDEXER_DELAY,
        }
    }
}

/// Template name of the deployment factory in the bundled config.
pub const FACTORY_TEMPLATE: &str = "GeneralPurposeFactory";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// JSON-RPC endpoint
    pub network_node_url: String,
    /// Index up to the node's "finalized" block instead of "latest"
    pub use_finalized: bool,
    /// Blocks kept between the head tag and the indexed range
    pub confirmations: u64,
    /// Maximum blocks per `eth_getLogs` request
    pub batch_size: u64,
    /// Sleep between polls once caught up
    pub poll_interval_secs: u64,
    /// How many blocks of undo journal to retain for reorg recovery
    pub reorg_window: u64,
    /// Statically tracked contracts
    pub sources: Vec<SourceConfig>,
    /// Templates by name
    pub templates: BTreeMap<String, TemplateConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub contract: Address,
    pub start: u64,
    pub template: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateConfig {
    pub events: Vec<EventConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventConfig {
    /// Canonical event signature, e.g. `DelegateChanged(address,address,address)`.
    /// Must be the event `handler` consumes.
    pub signature: String,
    pub handler: HandlerKind,
}

impl EventConfig {
    pub fn bound_to(handler: HandlerKind) -> Self {
        Self {
            signature: handler.signature().to_string(),
            handler,
        }
    }
}

impl Default for IndexerConfig {
    fn default() -> Self {
        let mut templates = BTreeMap::new();
        templates.insert(
            FACTORY_TEMPLATE.to_string(),
            TemplateConfig {
                events: vec![EventConfig::bound_to(HandlerKind::ContractDeployed)],
            },
        );
        templates.insert(
            GENERIC_ERC20_VOTES_TEMPLATE.to_string(),
            TemplateConfig {
                events: vec![
                    EventConfig::bound_to(HandlerKind::DelegateChanged),
                    EventConfig::bound_to(HandlerKind::DelegateVotesChanged),
                ],
            },
        );

        Self {
            network_node_url: "http://127.0.0.1:8545".to_string(),
            use_finalized: false,
            confirmations: 12,
            batch_size: 1000,
            poll_interval_secs: 12,
            reorg_window: 128,
            sources: Vec::new(),
            templates,
        }
    }
}

impl IndexerConfig {
    /// Check invariants serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            anyhow::bail!("batch_size must be at least 1");
        }
        for source in &self.sources {
            if !self.templates.contains_key(&source.template) {
                anyhow::bail!(
                    "Source 0x{:x} uses unknown template {}",
                    source.contract,
                    source.template
                );
            }
        }
        let deploys = self
            .templates
            .values()
            .flat_map(|t| t.events.iter())
            .any(|e| e.handler == HandlerKind::ContractDeployed);
        if deploys && !self.templates.contains_key(GENERIC_ERC20_VOTES_TEMPLATE) {
            anyhow::bail!(
                "handleContractDeployed requires a {} template",
                GENERIC_ERC20_VOTES_TEMPLATE
            );
        }
        Ok(())
    }

    /// Hash of everything that determines indexed state.
    ///
    /// Scanning parameters are left out: changing them never invalidates
    /// what has been indexed so far.
    pub fn fingerprint(&self) -> Result<B256> {
        let canonical = serde_json::to_vec(&(&self.sources, &self.templates))
            .context("Failed to serialize config for fingerprint")?;
        Ok(keccak256(canonical))
    }
}

/// Load and validate a config file.
pub fn load_config(path: &Path) -> Result<IndexerConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    let config: IndexerConfig = serde_json::from_str(&contents)
        .with_context(|| format!("Invalid config file: {:?}", path))?;
    config.validate()?;
    Ok(config)
}
