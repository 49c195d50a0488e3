//! Template registry
//!
//! A template is a named set of event bindings (topic0 -> handler).
//! Tracked contract instances point at a template by name; static sources
//! are seeded from the config at startup and further instances are
//! registered at runtime when a handler emits a [`TemplateCommand`].

use crate::config::IndexerConfig;
use crate::events::HandlerKind;
use crate::records::TrackedInstance;
use crate::store::{KvRead, LedgerStore, LedgerView, PendingBlock};
use alloy_primitives::{Address, B256};
use anyhow::{Context, Result};
use std::collections::HashMap;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct Template {
    pub name: String,
    bindings: HashMap<B256, HandlerKind>,
}

impl Template {
    /// Build a template; binding the same event twice is rejected.
    pub fn new(name: impl Into<String>, handlers: Vec<HandlerKind>) -> Result<Self> {
        let name = name.into();
        let mut bindings = HashMap::new();
        for handler in handlers {
            if bindings.insert(handler.topic0(), handler).is_some() {
                anyhow::bail!("Template {} binds {} twice", name, handler.signature());
            }
        }
        Ok(Self { name, bindings })
    }

    /// Handler for a log's topic0, if this template handles it.
    pub fn binding(&self, topic0: B256) -> Option<HandlerKind> {
        self.bindings.get(&topic0).copied()
    }
}

/// Request emitted by a handler, applied when its block is committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateCommand {
    Register {
        template: String,
        address: Address,
        start_block: u64,
    },
}

pub struct TemplateRegistry {
    templates: HashMap<String, Template>,
}

impl TemplateRegistry {
    pub fn new(templates: Vec<Template>) -> Self {
        Self {
            templates: templates.into_iter().map(|t| (t.name.clone(), t)).collect(),
        }
    }

    /// Build every template declared in the config.
    pub fn from_config(config: &IndexerConfig) -> Result<Self> {
        let mut templates = Vec::with_capacity(config.templates.len());
        for (name, template) in &config.templates {
            let mut handlers = Vec::with_capacity(template.events.len());
            for event in &template.events {
                if event.signature != event.handler.signature() {
                    anyhow::bail!(
                        "Template {}: {:?} consumes {}, not {}",
                        name,
                        event.handler,
                        event.handler.signature(),
                        event.signature
                    );
                }
                handlers.push(event.handler);
            }
            templates.push(Template::new(name.clone(), handlers)?);
        }
        Ok(Self::new(templates))
    }

    pub fn template(&self, name: &str) -> Option<&Template> {
        self.templates.get(name)
    }

    /// Write every configured source that is not tracked yet.
    ///
    /// Returns the number of newly tracked sources.
    pub fn seed_sources<S: LedgerStore + ?Sized>(
        &self,
        store: &S,
        config: &IndexerConfig,
    ) -> Result<usize> {
        let mut pending = PendingBlock::new(store);
        let mut seeded = 0;
        for source in &config.sources {
            if self.template(&source.template).is_none() {
                anyhow::bail!(
                    "Source 0x{:x} uses unknown template {}",
                    source.contract,
                    source.template
                );
            }
            if pending.get_instance(source.contract)?.is_some() {
                continue;
            }
            pending.save_instance(&TrackedInstance {
                template: source.template.clone(),
                address: source.contract,
                start_block: source.start,
            })?;
            info!(
                "Tracking source 0x{:x} ({}) from block {}",
                source.contract, source.template, source.start
            );
            seeded += 1;
        }
        let (ops, _) = pending.into_parts();
        store.write(ops).context("Failed to seed sources")?;
        Ok(seeded)
    }

    /// Apply handler commands to a block being committed.
    ///
    /// Returns the instances that were actually added; an address that is
    /// already tracked is left untouched.
    pub fn apply<S: KvRead + ?Sized>(
        &self,
        ledger: &mut PendingBlock<'_, S>,
        commands: Vec<TemplateCommand>,
    ) -> Result<Vec<TrackedInstance>> {
        let mut added = Vec::new();
        for command in commands {
            match command {
                TemplateCommand::Register {
                    template,
                    address,
                    start_block,
                } => {
                    if self.template(&template).is_none() {
                        anyhow::bail!("Cannot register 0x{:x}: unknown template {}", address, template);
                    }
                    if let Some(existing) = ledger.get_instance(address)? {
                        warn!(
                            "0x{:x} is already tracked as {} from block {}, ignoring",
                            address, existing.template, existing.start_block
                        );
                        continue;
                    }
                    let instance = TrackedInstance {
                        template,
                        address,
                        start_block,
                    };
                    ledger.save_instance(&instance)?;
                    info!(
                        "Registered 0x{:x} as {} from block {}",
                        address, instance.template, start_block
                    );
                    added.push(instance);
                }
            }
        }
        Ok(added)
    }
}
