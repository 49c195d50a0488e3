//! Handler dispatch
//!
//! Routes each log of a tracked instance to the handler its template binds
//! the event to. Decoding problems and events without a binding are skipped
//! so one malformed log cannot stall the scan; anything a handler reports is
//! fatal for the block.

use crate::events::GovernanceEvent;
use crate::handlers::{
    handle_contract_deployed, handle_delegate_changed, handle_delegate_votes_changed,
    HandlerContext,
};
use crate::records::TrackedInstance;
use crate::store::{KvRead, PendingBlock};
use crate::templates::{TemplateCommand, TemplateRegistry};
use crate::types::Log;
use anyhow::{Context, Result};
use tracing::{debug, warn};

/// Outcome of dispatching one log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    Handled,
    Skipped,
}

pub struct Dispatcher {
    registry: TemplateRegistry,
}

impl Dispatcher {
    pub fn new(registry: TemplateRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    /// Dispatch one log emitted by `instance`.
    pub fn dispatch<S: KvRead + ?Sized>(
        &self,
        ledger: &mut PendingBlock<'_, S>,
        instance: &TrackedInstance,
        log: &Log,
        commands: &mut Vec<TemplateCommand>,
    ) -> Result<Dispatched> {
        let Some(template) = self.registry.template(&instance.template) else {
            warn!(
                "0x{:x} is tracked with unknown template {}, skipping log",
                instance.address, instance.template
            );
            return Ok(Dispatched::Skipped);
        };
        let Some(handler) = log.topic0().and_then(|t| template.binding(t)) else {
            debug!(
                "No {} handler for topic {:?} at block {} log {}",
                template.name,
                log.topic0(),
                log.block_number,
                log.log_index
            );
            return Ok(Dispatched::Skipped);
        };

        let event = match GovernanceEvent::decode(handler, log) {
            Ok(event) => event,
            Err(e) => {
                warn!(
                    "Skipping undecodable {} at block {} log {}: {}",
                    handler.signature(),
                    log.block_number,
                    log.log_index,
                    e
                );
                return Ok(Dispatched::Skipped);
            }
        };

        let mut ctx = HandlerContext {
            ledger,
            governance: instance.address,
            block_number: log.block_number,
            commands,
        };
        match event {
            GovernanceEvent::DelegateChanged {
                from_delegate,
                to_delegate,
            } => handle_delegate_changed(&mut ctx, from_delegate, to_delegate),
            GovernanceEvent::DelegateVotesChanged {
                delegate,
                previous_balance,
                new_balance,
            } => handle_delegate_votes_changed(&mut ctx, delegate, previous_balance, new_balance),
            GovernanceEvent::ContractDeployed {
                implementation,
                contract_address,
            } => handle_contract_deployed(&mut ctx, implementation, contract_address),
        }
        .with_context(|| {
            format!(
                "{:?} handler failed at block {} log {}",
                handler, log.block_number, log.log_index
            )
        })?;

        Ok(Dispatched::Handled)
    }

    /// Dispatch the logs of one block in order.
    ///
    /// `logs` must already be sorted by log index; out-of-order input is an
    /// error because the aggregate counters depend on it.
    pub fn dispatch_block<S: KvRead + ?Sized>(
        &self,
        ledger: &mut PendingBlock<'_, S>,
        logs: &[(&TrackedInstance, &Log)],
    ) -> Result<Vec<TemplateCommand>> {
        let mut commands = Vec::new();
        let mut last: Option<(u64, u64)> = None;
        let mut handled = 0usize;
        for (instance, log) in logs {
            if let Some(prev) = last {
                if log.position() <= prev {
                    anyhow::bail!(
                        "Logs out of order: {:?} after {:?}",
                        log.position(),
                        prev
                    );
                }
            }
            last = Some(log.position());
            if self.dispatch(ledger, instance, log, &mut commands)? == Dispatched::Handled {
                handled += 1;
            }
        }
        debug!("Dispatched {} of {} logs", handled, logs.len());
        Ok(commands)
    }
}
