//! Typed governance events
//!
//! Every event the indexer reacts to is a variant of [`GovernanceEvent`].
//! A raw log is decoded according to the handler it is bound to in the
//! config, so dispatch is an exhaustive `match` instead of a lookup by event
//! name.

use crate::abi::{self, decode_event};
use crate::types::Log;
use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::SolEvent;
use serde::{Deserialize, Serialize};

/// Handler a template binds an event to.
///
/// Serialized with the handler names used in config files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandlerKind {
    #[serde(rename = "handleDelegateChanged")]
    DelegateChanged,
    #[serde(rename = "handleDelegateVotesChanged")]
    DelegateVotesChanged,
    #[serde(rename = "handleContractDeployed")]
    ContractDeployed,
}

impl HandlerKind {
    /// Canonical signature of the event this handler consumes.
    pub fn signature(self) -> &'static str {
        match self {
            HandlerKind::DelegateChanged => abi::DelegateChanged::SIGNATURE,
            HandlerKind::DelegateVotesChanged => abi::DelegateVotesChanged::SIGNATURE,
            HandlerKind::ContractDeployed => abi::ContractDeployed::SIGNATURE,
        }
    }

    pub fn topic0(self) -> B256 {
        match self {
            HandlerKind::DelegateChanged => abi::DelegateChanged::SIGNATURE_HASH,
            HandlerKind::DelegateVotesChanged => abi::DelegateVotesChanged::SIGNATURE_HASH,
            HandlerKind::ContractDeployed => abi::ContractDeployed::SIGNATURE_HASH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GovernanceEvent {
    /// A token holder moved their delegation.
    DelegateChanged {
        from_delegate: Address,
        to_delegate: Address,
    },
    /// A delegate's voting power changed.
    DelegateVotesChanged {
        delegate: Address,
        previous_balance: U256,
        new_balance: U256,
    },
    /// The factory deployed a new contract.
    ContractDeployed {
        implementation: Address,
        contract_address: Address,
    },
}

impl GovernanceEvent {
    /// Decode the event `kind` expects from a raw log.
    ///
    /// An error means the payload does not match the bound event (wrong
    /// topic0, missing topics, short data); callers skip such logs.
    pub fn decode(kind: HandlerKind, log: &Log) -> Result<Self, alloy_sol_types::Error> {
        let event = match kind {
            HandlerKind::DelegateChanged => {
                let event: abi::DelegateChanged = decode_event(log)?;
                GovernanceEvent::DelegateChanged {
                    from_delegate: event.fromDelegate,
                    to_delegate: event.toDelegate,
                }
            }
            HandlerKind::DelegateVotesChanged => {
                let event: abi::DelegateVotesChanged = decode_event(log)?;
                GovernanceEvent::DelegateVotesChanged {
                    delegate: event.delegate,
                    previous_balance: event.previousBalance,
                    new_balance: event.newBalance,
                }
            }
            HandlerKind::ContractDeployed => {
                let event: abi::ContractDeployed = decode_event(log)?;
                GovernanceEvent::ContractDeployed {
                    implementation: event.implementation,
                    contract_address: event.contractAddress,
                }
            }
        };
        Ok(event)
    }
}
