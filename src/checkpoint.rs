//! Checkpoint and resume bookkeeping
//!
//! Progress is tracked per contract (last fully processed block) plus a
//! global head. Each committed block carries an undo journal holding the
//! previous value of every key it touched, so orphaned blocks can be rolled
//! back after a reorg. Journals older than the reorg window are pruned.

use crate::keys::{
    encode_block_hash_key, encode_journal_key, encode_meta_key, META_CONFIG_FINGERPRINT,
};
use crate::records::TrackedInstance;
use crate::store::{reset_ledger, Column, LedgerStore, LedgerView, PendingBlock, WriteSet};
use alloy_primitives::B256;
use anyhow::{Context, Result};
use tracing::{debug, warn};

pub struct CheckpointManager<'s, S: ?Sized> {
    store: &'s S,
    reorg_window: u64,
}

impl<'s, S: LedgerStore + ?Sized> CheckpointManager<'s, S> {
    pub fn new(store: &'s S, reorg_window: u64) -> Self {
        Self {
            store,
            reorg_window,
        }
    }

    /// First block still to be fetched for `instance`.
    pub fn next_block(&self, instance: &TrackedInstance) -> Result<u64> {
        Ok(match self.store.get_checkpoint(instance.address)? {
            Some(checkpoint) => checkpoint.saturating_add(1),
            None => instance.start_block,
        })
    }

    /// Commit a block's staged writes together with its undo journal.
    ///
    /// All or nothing: when the write fails neither entities nor
    /// checkpoints of the block are stored.
    pub fn seal(&self, pending: PendingBlock<'_, S>, block: u64) -> Result<()> {
        let (mut ops, journal) = pending.into_parts();
        let mut merged = self.store.get_journal(block)?.unwrap_or_default();
        merged.merge(journal);
        ops.put_record(Column::Journal, encode_journal_key(block), &merged)?;

        let count = ops.len();
        self.store
            .write(ops)
            .with_context(|| format!("Failed to commit block {}", block))?;
        debug!("Sealed block {} ({} writes)", block, count);
        Ok(())
    }

    /// Undo every block after `ancestor`, newest first.
    ///
    /// Returns the number of blocks rolled back.
    pub fn rollback_to(&self, ancestor: u64) -> Result<usize> {
        let mut blocks: Vec<u64> = self
            .store
            .journaled_blocks()?
            .into_iter()
            .filter(|b| *b > ancestor)
            .collect();
        blocks.reverse();

        let mut ops = WriteSet::new();
        for block in &blocks {
            let journal = self
                .store
                .get_journal(*block)?
                .with_context(|| format!("Journal for block {} disappeared", block))?;
            for entry in journal.entries.into_iter().rev() {
                match entry.prior {
                    Some(value) => ops.put(entry.column, entry.key, value),
                    None => ops.delete(entry.column, entry.key),
                }
            }
            ops.delete(Column::Journal, encode_journal_key(*block));
        }
        self.store
            .write(ops)
            .with_context(|| format!("Failed to roll back to block {}", ancestor))?;

        if !blocks.is_empty() {
            warn!("Rolled back {} blocks to ancestor {}", blocks.len(), ancestor);
        }
        Ok(blocks.len())
    }

    /// Drop journals and block hashes that fell out of the reorg window.
    pub fn prune(&self, head: u64) -> Result<()> {
        let cutoff = head.saturating_sub(self.reorg_window);
        let mut ops = WriteSet::new();
        for block in self.store.journaled_blocks()? {
            if block >= cutoff {
                break;
            }
            ops.delete(Column::Journal, encode_journal_key(block));
        }
        for (block, _) in self.store.list_block_hashes()? {
            if block >= cutoff {
                break;
            }
            ops.delete(Column::BlockHashes, encode_block_hash_key(block));
        }
        if ops.is_empty() {
            return Ok(());
        }
        debug!("Pruning {} journal entries below block {}", ops.len(), cutoff);
        self.store.write(ops).context("Failed to prune journals")
    }
}

/// Wipe the ledger when it was built from a different configuration.
///
/// Returns true when existing state was discarded. A ledger without a
/// recorded fingerprint is adopted as is.
pub fn reconcile_config<S: LedgerStore + ?Sized>(store: &S, fingerprint: B256) -> Result<bool> {
    let stored = store.get_config_fingerprint()?;
    if stored == Some(fingerprint) {
        return Ok(false);
    }
    let reset = stored.is_some();
    if let Some(previous) = stored {
        warn!(
            "Config changed (0x{:x} -> 0x{:x}), resetting ledger",
            previous, fingerprint
        );
        reset_ledger(store)?;
    }
    let mut ops = WriteSet::new();
    ops.put(
        Column::Meta,
        encode_meta_key(META_CONFIG_FINGERPRINT),
        fingerprint.to_vec(),
    );
    store.write(ops).context("Failed to store config fingerprint")?;
    Ok(reset)
}
