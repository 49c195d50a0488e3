//! Log builders shared by the unit tests.

use crate::abi;
use crate::types::Log;
use alloy_primitives::{Address, B256, I256, U256};
use alloy_sol_types::SolEvent;

/// Deterministic fake block hash.
pub fn block_hash(block: u64, fork: u8) -> B256 {
    let mut bytes = [0u8; 32];
    bytes[0] = fork;
    bytes[24..].copy_from_slice(&block.to_be_bytes());
    B256::from(bytes)
}

pub fn log_at(address: Address, topics: Vec<B256>, data: Vec<u8>, block: u64, index: u64) -> Log {
    Log {
        address,
        topics,
        data,
        block_number: block,
        block_hash: block_hash(block, 0),
        transaction_hash: B256::ZERO,
        log_index: index,
        removed: false,
    }
}

/// Encode a generated event into a log emitted by `address`.
pub fn event_log<E: SolEvent>(address: Address, event: &E, block: u64, index: u64) -> Log {
    let data = event.encode_log_data();
    log_at(address, data.topics().to_vec(), data.data.to_vec(), block, index)
}

pub fn delegate_changed_log(
    token: Address,
    delegator: Address,
    from: Address,
    to: Address,
    block: u64,
    index: u64,
) -> Log {
    let event = abi::DelegateChanged {
        delegator,
        fromDelegate: from,
        toDelegate: to,
    };
    event_log(token, &event, block, index)
}

pub fn votes_changed_log(
    token: Address,
    delegate: Address,
    previous: U256,
    new: U256,
    block: u64,
    index: u64,
) -> Log {
    let event = abi::DelegateVotesChanged {
        delegate,
        previousBalance: previous,
        newBalance: new,
    };
    event_log(token, &event, block, index)
}

pub fn contract_deployed_log(
    factory: Address,
    implementation: Address,
    contract: Address,
    block: u64,
    index: u64,
) -> Log {
    let event = abi::ContractDeployed {
        implementation,
        contractAddress: contract,
    };
    event_log(factory, &event, block, index)
}

/// Token amount with 18 decimals.
pub fn tokens(amount: u64) -> U256 {
    U256::from(amount) * U256::from(1_000_000_000_000_000_000u64)
}

/// [`tokens`] as a signed aggregate.
pub fn signed_tokens(amount: u64) -> I256 {
    I256::try_from(tokens(amount)).unwrap()
}
