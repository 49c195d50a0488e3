//! Contract event ABI
//!
//! Solidity declarations of the events the indexer consumes. The `sol!`
//! macro generates one struct per event with its canonical signature,
//! topic0 hash and log decoder.

use crate::types::Log;
use alloy_sol_types::{sol, SolEvent};

sol! {
    /// Emitted by an ERC20Votes token when a holder changes delegate.
    #[derive(Debug, PartialEq, Eq)]
    event DelegateChanged(
        address indexed delegator,
        address indexed fromDelegate,
        address indexed toDelegate
    );

    /// Emitted by an ERC20Votes token when a delegate's voting power moves.
    #[derive(Debug, PartialEq, Eq)]
    event DelegateVotesChanged(
        address indexed delegate,
        uint256 previousBalance,
        uint256 newBalance
    );

    /// Emitted by the deployment factory for every contract it creates.
    #[derive(Debug, PartialEq, Eq)]
    event ContractDeployed(address implementation, address contractAddress);
}

/// Decode a raw log as event `E`.
///
/// Fails when topic0 is not `E`'s signature hash, when indexed topics are
/// missing or when the data section is too short.
pub fn decode_event<E: SolEvent>(log: &Log) -> Result<E, alloy_sol_types::Error> {
    E::decode_raw_log(log.topics.iter().copied(), &log.data)
}
