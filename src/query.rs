//! Read-only query surface
//!
//! Projects ledger records into the JSON shapes clients consume. Raw vote
//! amounts are rendered as decimal strings so no precision is lost.

use crate::records::{DelegateRecord, GovernanceRecord};
use crate::store::{KvRead, LedgerView};
use alloy_primitives::{Address, U256};
use anyhow::Result;
use serde::Serialize;
use std::cmp::Reverse;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GovernanceView {
    pub id: String,
    pub current_delegates: i64,
    pub delegated_votes_raw: String,
    pub delegated_votes: String,
}

impl From<&GovernanceRecord> for GovernanceView {
    fn from(record: &GovernanceRecord) -> Self {
        Self {
            id: format!("0x{:x}", record.id),
            current_delegates: record.current_delegates,
            delegated_votes_raw: record.delegated_votes_raw.to_string(),
            delegated_votes: record.delegated_votes.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegateView {
    pub id: String,
    pub governance: String,
    pub delegate: String,
    pub token_holders_represented_amount: i64,
    pub delegated_votes_raw: String,
    pub delegated_votes: String,
}

impl From<&DelegateRecord> for DelegateView {
    fn from(record: &DelegateRecord) -> Self {
        Self {
            id: record.id(),
            governance: format!("0x{:x}", record.governance),
            delegate: format!("0x{:x}", record.delegate),
            token_holders_represented_amount: record.token_holders_represented_amount,
            delegated_votes_raw: record.delegated_votes_raw.to_string(),
            delegated_votes: record.delegated_votes.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceStatus {
    pub address: String,
    pub template: String,
    pub start_block: u64,
    /// Last fully processed block, none before the first scan
    pub checkpoint: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    pub head: Option<u64>,
    pub instances: Vec<InstanceStatus>,
}

/// Sort order for delegate listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum DelegateOrder {
    /// Governance then delegate address
    #[default]
    Id,
    /// Raw delegated votes, highest first
    Votes,
    /// Represented token holders, highest first
    Holders,
}

#[derive(Debug, Clone)]
pub struct DelegateFilter {
    pub governance: Option<Address>,
    pub min_votes_raw: Option<U256>,
    pub order: DelegateOrder,
    pub first: usize,
    pub skip: usize,
}

impl Default for DelegateFilter {
    fn default() -> Self {
        Self {
            governance: None,
            min_votes_raw: None,
            order: DelegateOrder::Id,
            first: 100,
            skip: 0,
        }
    }
}

pub struct QueryService<'s, S: ?Sized> {
    store: &'s S,
}

impl<'s, S: KvRead + ?Sized> QueryService<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    pub fn governance(&self, id: Address) -> Result<Option<GovernanceView>> {
        Ok(self.store.get_governance(id)?.as_ref().map(GovernanceView::from))
    }

    /// Governances in address order.
    pub fn governances(&self, first: usize, skip: usize) -> Result<Vec<GovernanceView>> {
        Ok(self
            .store
            .list_governances()?
            .iter()
            .skip(skip)
            .take(first)
            .map(GovernanceView::from)
            .collect())
    }

    pub fn delegate(&self, governance: Address, delegate: Address) -> Result<Option<DelegateView>> {
        Ok(self
            .store
            .get_delegate(governance, delegate)?
            .as_ref()
            .map(DelegateView::from))
    }

    pub fn delegates(&self, filter: &DelegateFilter) -> Result<Vec<DelegateView>> {
        let mut records = self.store.list_delegates(filter.governance)?;
        if let Some(min) = filter.min_votes_raw {
            records.retain(|d| d.delegated_votes_raw >= min);
        }
        // Stable sorts keep id order among ties
        match filter.order {
            DelegateOrder::Id => {}
            DelegateOrder::Votes => records.sort_by_key(|d| Reverse(d.delegated_votes_raw)),
            DelegateOrder::Holders => {
                records.sort_by_key(|d| Reverse(d.token_holders_represented_amount))
            }
        }
        Ok(records
            .iter()
            .skip(filter.skip)
            .take(filter.first)
            .map(DelegateView::from)
            .collect())
    }

    /// Scan progress: global head and every tracked instance's checkpoint.
    pub fn status(&self) -> Result<StatusView> {
        let mut instances = Vec::new();
        for instance in self.store.list_instances()? {
            instances.push(InstanceStatus {
                address: format!("0x{:x}", instance.address),
                checkpoint: self.store.get_checkpoint(instance.address)?,
                template: instance.template,
                start_block: instance.start_block,
            });
        }
        Ok(StatusView {
            head: self.store.get_head()?,
            instances,
        })
    }
}
