//! Governance delegation accounting
//!
//! The three handlers that turn ERC20Votes events into Delegate and
//! Governance records. They run strictly in on-chain order within a single
//! writer, which is what keeps `current_delegates` and the aggregate vote
//! total consistent with the per-delegate records.

use crate::records::DelegateRecord;
use crate::store::{KvRead, LedgerView, PendingBlock};
use crate::templates::TemplateCommand;
use alloy_primitives::{address, Address, I256, U256};
use anyhow::Result;
use tracing::{debug, info, warn};

/// ERC20Votes implementation behind every factory-deployed governance
/// token. Same address on all networks.
pub const GENERIC_ERC20_VOTES_IMPLEMENTATION: Address =
    address!("75DB1EEE7b03A0C9BcAD50Cb381B068c209c81ef");

/// Template new governance tokens are tracked with.
pub const GENERIC_ERC20_VOTES_TEMPLATE: &str = "GenericERC20Votes";

/// Everything a handler may touch while processing one log.
pub struct HandlerContext<'p, 's, S: ?Sized> {
    /// Staged ledger writes of the current block
    pub ledger: &'p mut PendingBlock<'s, S>,
    /// Governance id: the contract that emitted the log
    pub governance: Address,
    /// Block the log was included in
    pub block_number: u64,
    /// Registrations to apply when the block is committed
    pub commands: &'p mut Vec<TemplateCommand>,
}

/// Move one represented token holder from `from_delegate` to `to_delegate`.
///
/// The decrement is not clamped: in a correctly ordered stream it cannot go
/// below zero, and a negative count surfaces replay or ordering bugs.
pub fn handle_delegate_changed<S: KvRead + ?Sized>(
    ctx: &mut HandlerContext<'_, '_, S>,
    from_delegate: Address,
    to_delegate: Address,
) -> Result<()> {
    let mut previous = ctx.ledger.delegate_or_default(ctx.governance, from_delegate)?;
    previous.token_holders_represented_amount -= 1;
    ctx.ledger.save_delegate(&previous)?;

    let mut next: DelegateRecord = ctx.ledger.delegate_or_default(ctx.governance, to_delegate)?;
    next.token_holders_represented_amount += 1;
    ctx.ledger.save_delegate(&next)?;

    debug!(
        "Block {}: delegation 0x{:x} -> 0x{:x} on 0x{:x}",
        ctx.block_number, from_delegate, to_delegate, ctx.governance
    );
    Ok(())
}

/// Replace a delegate's voting power and fold the difference into the
/// governance aggregate.
pub fn handle_delegate_votes_changed<S: KvRead + ?Sized>(
    ctx: &mut HandlerContext<'_, '_, S>,
    delegate: Address,
    previous_balance: U256,
    new_balance: U256,
) -> Result<()> {
    let mut governance = ctx.ledger.governance_or_default(ctx.governance)?;
    let mut record = ctx.ledger.delegate_or_default(ctx.governance, delegate)?;

    record.set_votes(new_balance);
    ctx.ledger.save_delegate(&record)?;

    // Evaluated independently, not as if/else
    if previous_balance == U256::ZERO && new_balance > U256::ZERO {
        governance.current_delegates += 1;
    }
    if new_balance == U256::ZERO {
        governance.current_delegates -= 1;
    }

    let before = governance.delegated_votes_raw;
    let change = signed(new_balance).saturating_sub(signed(previous_balance));
    let total = before.saturating_add(change);
    if total.is_negative() && !before.is_negative() {
        warn!(
            "Delegated votes of 0x{:x} went negative at block {} ({}); \
             tracking probably started after earlier delegations",
            ctx.governance, ctx.block_number, total
        );
    }
    governance.set_votes(total);
    ctx.ledger.save_governance(&governance)?;

    debug!(
        "Block {}: 0x{:x} votes {} -> {} on 0x{:x} (total {})",
        ctx.block_number, delegate, previous_balance, new_balance, ctx.governance, total
    );
    Ok(())
}

/// Token balances never reach 2^255; saturate rather than fail if one does.
fn signed(value: U256) -> I256 {
    I256::try_from(value).unwrap_or(I256::MAX)
}

/// Start tracking a factory deployment if it uses the known ERC20Votes
/// implementation.
pub fn handle_contract_deployed<S: KvRead + ?Sized>(
    ctx: &mut HandlerContext<'_, '_, S>,
    implementation: Address,
    contract_address: Address,
) -> Result<()> {
    if implementation == GENERIC_ERC20_VOTES_IMPLEMENTATION {
        ctx.commands.push(TemplateCommand::Register {
            template: GENERIC_ERC20_VOTES_TEMPLATE.to_string(),
            address: contract_address,
            start_block: ctx.block_number,
        });
    } else {
        info!(
            "Unknown implementation: 0x{:x} (deployment 0x{:x} at block {})",
            implementation, contract_address, ctx.block_number
        );
    }
    Ok(())
}
