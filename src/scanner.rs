//! Chain scanner
//!
//! Polls the chain for logs of every tracked instance, hands each block's
//! logs to the dispatcher in on-chain order and commits the block together
//! with its checkpoints. A block that registers new instances ends the
//! range early so the new contracts are fetched from their start block on
//! the next tick.

use crate::checkpoint::CheckpointManager;
use crate::config::IndexerConfig;
use crate::dispatch::Dispatcher;
use crate::records::TrackedInstance;
use crate::rpc::{ChainSource, HeadTag};
use crate::store::{LedgerStore, LedgerView, PendingBlock};
use crate::types::Log;
use alloy_primitives::{Address, B256};
use anyhow::{Context, Result};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Conditions [`Scanner::run`] does not retry: the ledger cannot make
/// progress without an operator.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("reorg is deeper than the {recorded} recorded blocks; the ledger must be rebuilt")]
    ReorgTooDeep { recorded: usize },
}

/// Scanning parameters.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub head_tag: HeadTag,
    pub confirmations: u64,
    pub batch_size: u64,
    pub reorg_window: u64,
    pub poll_interval: Duration,
}

impl ScanOptions {
    pub fn from_config(config: &IndexerConfig) -> Self {
        Self {
            head_tag: if config.use_finalized {
                HeadTag::Finalized
            } else {
                HeadTag::Latest
            },
            confirmations: config.confirmations,
            batch_size: config.batch_size.max(1),
            reorg_window: config.reorg_window,
            poll_interval: Duration::from_secs(config.poll_interval_secs),
        }
    }
}

/// Result of a single poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Every instance is caught up with the safe head.
    Idle { safe_head: u64 },
    /// Blocks `from..=to` were committed.
    Scanned {
        from: u64,
        to: u64,
        logs: usize,
        registered: usize,
    },
}

pub struct Scanner<S, C> {
    store: Arc<S>,
    chain: C,
    dispatcher: Dispatcher,
    options: ScanOptions,
}

impl<S: LedgerStore, C: ChainSource> Scanner<S, C> {
    pub fn new(store: Arc<S>, chain: C, dispatcher: Dispatcher, options: ScanOptions) -> Self {
        Self {
            store,
            chain,
            dispatcher,
            options,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    fn checkpoints(&self) -> CheckpointManager<'_, S> {
        CheckpointManager::new(&*self.store, self.options.reorg_window)
    }

    /// Scan the next range of blocks.
    ///
    /// On error nothing past the last committed block is stored, so the
    /// same range is retried on the next call.
    pub async fn tick(&self) -> Result<TickOutcome> {
        self.check_reorg().await.context("Reorg check failed")?;

        let store = &*self.store;
        let checkpoints = self.checkpoints();
        let latest = self
            .chain
            .head_block(self.options.head_tag)
            .await
            .context("Failed to get head block")?;
        let safe_head = latest.saturating_sub(self.options.confirmations);

        let instances = store
            .list_instances()
            .context("Failed to list tracked instances")?;
        let mut next = HashMap::with_capacity(instances.len());
        for instance in &instances {
            next.insert(instance.address, checkpoints.next_block(instance)?);
        }
        let Some(from) = next.values().copied().min() else {
            return Ok(TickOutcome::Idle { safe_head });
        };
        if from > safe_head {
            return Ok(TickOutcome::Idle { safe_head });
        }
        let to = from
            .saturating_add(self.options.batch_size.saturating_sub(1))
            .min(safe_head);

        let scanned: HashMap<Address, &TrackedInstance> = instances
            .iter()
            .filter(|i| next[&i.address] <= to)
            .map(|i| (i.address, i))
            .collect();
        let mut addresses: Vec<Address> = scanned.keys().copied().collect();
        addresses.sort();

        info!(
            "Scanning blocks {} to {} for {} contracts",
            from,
            to,
            addresses.len()
        );
        let mut logs = self
            .chain
            .logs(&addresses, from, to)
            .await
            .with_context(|| format!("Failed to fetch logs for blocks {} to {}", from, to))?;

        let fetched = logs.len();
        logs.retain(|log| {
            !log.removed
                && log.block_number <= to
                && scanned.contains_key(&log.address)
                && log.block_number >= next[&log.address]
        });
        logs.sort_by_key(Log::position);
        logs.dedup_by_key(|log| log.position());
        if logs.len() != fetched {
            debug!("Dropped {} logs outside tracked ranges", fetched - logs.len());
        }

        let mut end = to;
        let mut processed = 0;
        let mut registered = 0;
        for block_logs in logs.chunk_by(|a, b| a.block_number == b.block_number) {
            let block = block_logs[0].block_number;
            let hash = block_logs[0].block_hash;
            if block_logs.iter().any(|log| log.block_hash != hash) {
                anyhow::bail!("Logs of block {} disagree on the block hash", block);
            }

            let batch: Vec<(&TrackedInstance, &Log)> = block_logs
                .iter()
                .map(|log| (scanned[&log.address], log))
                .collect();
            let mut pending = PendingBlock::new(store);
            let commands = self
                .dispatcher
                .dispatch_block(&mut pending, &batch)
                .with_context(|| format!("Failed to process block {}", block))?;
            let added = self.dispatcher.registry().apply(&mut pending, commands)?;

            let emitters: BTreeSet<Address> = block_logs.iter().map(|log| log.address).collect();
            for address in emitters {
                pending.set_checkpoint(address, block)?;
            }
            pending.set_block_hash(block, hash)?;
            checkpoints.seal(pending, block)?;
            processed += block_logs.len();
            debug!("Committed block {} ({} logs)", block, block_logs.len());

            if !added.is_empty() {
                registered = added.len();
                end = block;
                info!(
                    "Registered {} contracts at block {}, ending range early",
                    registered, block
                );
                break;
            }
        }

        self.commit_range_end(end, &scanned, &next).await?;
        checkpoints.prune(end)?;

        info!(
            "Indexed blocks {} to {}: {} logs, {} new contracts",
            from, end, processed, registered
        );
        Ok(TickOutcome::Scanned {
            from,
            to: end,
            logs: processed,
            registered,
        })
    }

    /// Move every scanned instance's checkpoint to `end` and record the
    /// block hash the range was scanned against.
    async fn commit_range_end(
        &self,
        end: u64,
        scanned: &HashMap<Address, &TrackedInstance>,
        next: &HashMap<Address, u64>,
    ) -> Result<()> {
        let store = &*self.store;
        let header = self
            .chain
            .block_header(end)
            .await
            .with_context(|| format!("Failed to get header of block {}", end))?;
        if let Some(stored) = store.get_block_hash(end)? {
            if stored != header.hash {
                anyhow::bail!(
                    "Block {} changed while scanning (0x{:x} != 0x{:x})",
                    end,
                    stored,
                    header.hash
                );
            }
        }

        let mut pending = PendingBlock::new(store);
        for address in scanned.keys() {
            if next[address] <= end {
                pending.set_checkpoint(*address, end)?;
            }
        }
        if store.get_head()?.map_or(true, |head| head < end) {
            pending.set_head(end)?;
        }
        pending.set_block_hash(end, header.hash)?;
        self.checkpoints().seal(pending, end)
    }

    /// Compare the newest recorded block hash with the chain and roll back
    /// to the common ancestor when they differ.
    async fn check_reorg(&self) -> Result<()> {
        let hashes = self.store.list_block_hashes()?;
        let Some(&(tip, tip_hash)) = hashes.last() else {
            return Ok(());
        };
        let canonical = self
            .chain
            .block_header(tip)
            .await
            .with_context(|| format!("Failed to get header of block {}", tip))?;
        if canonical.hash == tip_hash {
            return Ok(());
        }

        warn!(
            "Reorg detected at block {}: stored 0x{:x}, chain 0x{:x}",
            tip, tip_hash, canonical.hash
        );
        let ancestor = self.find_common_ancestor(&hashes[..hashes.len() - 1]).await?;
        let undone = self.checkpoints().rollback_to(ancestor)?;
        info!(
            "Resuming from common ancestor {} after undoing {} blocks",
            ancestor, undone
        );
        Ok(())
    }

    async fn find_common_ancestor(&self, candidates: &[(u64, B256)]) -> Result<u64> {
        for (block, hash) in candidates.iter().rev() {
            let header = self
                .chain
                .block_header(*block)
                .await
                .with_context(|| format!("Failed to get header of block {}", block))?;
            if header.hash == *hash {
                return Ok(*block);
            }
        }
        Err(ScanError::ReorgTooDeep {
            recorded: candidates.len() + 1,
        }
        .into())
    }

    /// Run the scanner loop.
    ///
    /// Scans back to back while behind and sleeps for the poll interval once
    /// caught up. A failed tick leaves the ledger at its last committed block
    /// and is retried after the poll interval; only a [`ScanError`] ends the
    /// loop.
    pub async fn run(&self) -> Result<()> {
        info!("Starting scanner loop...");

        loop {
            match self.tick().await {
                Ok(TickOutcome::Scanned { .. }) => continue,
                Ok(TickOutcome::Idle { safe_head }) => {
                    debug!("Up to date. Safe head: {}", safe_head);
                }
                Err(e) if e.downcast_ref::<ScanError>().is_some() => return Err(e),
                Err(e) => {
                    warn!(
                        "Tick failed, retrying in {:?}: {:#}",
                        self.options.poll_interval, e
                    );
                }
            }
            tokio::time::sleep(self.options.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SourceConfig, FACTORY_TEMPLATE};
    use crate::handlers::{GENERIC_ERC20_VOTES_IMPLEMENTATION, GENERIC_ERC20_VOTES_TEMPLATE};
    use crate::store::MemoryLedgerStore;
    use crate::templates::TemplateRegistry;
    use crate::testing::{
        block_hash, contract_deployed_log, delegate_changed_log, signed_tokens, tokens,
        votes_changed_log,
    };
    use crate::types::BlockHeader;
    use alloy_primitives::{address, U256};
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    const TOKEN: Address = address!("00000000000000000000000000000000000000a1");
    const LATE_TOKEN: Address = address!("00000000000000000000000000000000000000a2");
    const FACTORY: Address = address!("00000000000000000000000000000000000000f1");
    const ALICE: Address = address!("0000000000000000000000000000000000000001");
    const BOB: Address = address!("0000000000000000000000000000000000000002");

    /// In-memory chain: a head, per-block forks and a log list.
    #[derive(Default)]
    struct MockChain {
        head: Mutex<u64>,
        forks: Mutex<BTreeMap<u64, u8>>,
        logs: Mutex<Vec<Log>>,
        /// Number of upcoming `logs` calls that fail
        failing_log_calls: Mutex<u32>,
    }

    impl MockChain {
        fn set_head(&self, head: u64) {
            *self.head.lock().unwrap() = head;
        }

        fn push(&self, log: Log) {
            self.logs.lock().unwrap().push(log);
        }

        /// Replace everything from `block` on with a new fork.
        fn reorg(&self, block: u64, fork: u8, logs: Vec<Log>) {
            let head = *self.head.lock().unwrap();
            let mut forks = self.forks.lock().unwrap();
            for number in block..=head + 64 {
                forks.insert(number, fork);
            }
            let mut current = self.logs.lock().unwrap();
            current.retain(|log| log.block_number < block);
            for mut log in logs {
                log.block_hash = block_hash(log.block_number, fork);
                current.push(log);
            }
        }

        fn fail_next_log_calls(&self, count: u32) {
            *self.failing_log_calls.lock().unwrap() = count;
        }

        fn hash(&self, number: u64) -> B256 {
            let fork = self.forks.lock().unwrap().get(&number).copied().unwrap_or(0);
            block_hash(number, fork)
        }
    }

    impl ChainSource for MockChain {
        async fn head_block(&self, _tag: HeadTag) -> Result<u64> {
            Ok(*self.head.lock().unwrap())
        }

        async fn block_header(&self, number: u64) -> Result<BlockHeader> {
            if number > *self.head.lock().unwrap() {
                anyhow::bail!("Block {} not found", number);
            }
            Ok(BlockHeader {
                number,
                hash: self.hash(number),
                parent_hash: self.hash(number.saturating_sub(1)),
            })
        }

        async fn logs(&self, addresses: &[Address], from: u64, to: u64) -> Result<Vec<Log>> {
            {
                let mut failing = self.failing_log_calls.lock().unwrap();
                if *failing > 0 {
                    *failing -= 1;
                    anyhow::bail!("connection reset by peer");
                }
            }
            // Unordered on purpose
            let mut logs: Vec<Log> = self
                .logs
                .lock()
                .unwrap()
                .iter()
                .filter(|log| addresses.contains(&log.address))
                .filter(|log| log.block_number >= from && log.block_number <= to)
                .cloned()
                .collect();
            logs.reverse();
            Ok(logs)
        }
    }

    fn options() -> ScanOptions {
        ScanOptions {
            head_tag: HeadTag::Latest,
            confirmations: 0,
            batch_size: 100,
            reorg_window: 64,
            poll_interval: Duration::from_millis(1),
        }
    }

    fn scanner(sources: Vec<SourceConfig>, options: ScanOptions) -> Scanner<MemoryLedgerStore, MockChain> {
        let mut config = IndexerConfig::default();
        config.sources = sources;
        let registry = TemplateRegistry::from_config(&config).unwrap();
        let store = Arc::new(MemoryLedgerStore::new());
        registry.seed_sources(&*store, &config).unwrap();
        Scanner::new(store, MockChain::default(), Dispatcher::new(registry), options)
    }

    fn source(contract: Address, start: u64, template: &str) -> SourceConfig {
        SourceConfig {
            contract,
            start,
            template: template.to_string(),
        }
    }

    #[tokio::test]
    async fn test_scan_applies_logs_in_chain_order() {
        let scanner = scanner(vec![source(TOKEN, 1, GENERIC_ERC20_VOTES_TEMPLATE)], options());
        let chain = &scanner.chain;
        chain.set_head(20);
        chain.push(delegate_changed_log(TOKEN, ALICE, Address::ZERO, ALICE, 5, 0));
        chain.push(votes_changed_log(TOKEN, ALICE, U256::ZERO, tokens(3), 5, 1));
        chain.push(votes_changed_log(TOKEN, ALICE, tokens(3), tokens(1), 9, 0));
        chain.push(votes_changed_log(TOKEN, BOB, U256::ZERO, tokens(2), 9, 4));
        chain.push(votes_changed_log(TOKEN, ALICE, tokens(1), U256::ZERO, 12, 2));

        let outcome = scanner.tick().await.unwrap();
        assert_eq!(
            outcome,
            TickOutcome::Scanned {
                from: 1,
                to: 20,
                logs: 5,
                registered: 0
            }
        );

        let store = scanner.store();
        let governance = store.get_governance(TOKEN).unwrap().unwrap();
        assert_eq!(governance.current_delegates, 1);
        assert_eq!(governance.delegated_votes_raw, signed_tokens(2));
        assert_eq!(governance.delegated_votes, "2.0");
        let alice = store.get_delegate(TOKEN, ALICE).unwrap().unwrap();
        assert_eq!(alice.token_holders_represented_amount, 1);
        assert_eq!(alice.delegated_votes_raw, U256::ZERO);
        assert_eq!(store.get_checkpoint(TOKEN).unwrap(), Some(20));
        assert_eq!(store.get_head().unwrap(), Some(20));

        assert_eq!(
            scanner.tick().await.unwrap(),
            TickOutcome::Idle { safe_head: 20 }
        );
    }

    #[tokio::test]
    async fn test_batches_respect_confirmations_and_size() {
        let mut opts = options();
        opts.batch_size = 10;
        opts.confirmations = 5;
        let scanner = scanner(vec![source(TOKEN, 3, GENERIC_ERC20_VOTES_TEMPLATE)], opts);
        scanner.chain.set_head(30);
        scanner
            .chain
            .push(votes_changed_log(TOKEN, ALICE, U256::ZERO, tokens(1), 26, 0));

        let first = scanner.tick().await.unwrap();
        assert!(matches!(first, TickOutcome::Scanned { from: 3, to: 12, .. }));
        let second = scanner.tick().await.unwrap();
        assert!(matches!(second, TickOutcome::Scanned { from: 13, to: 22, .. }));
        let third = scanner.tick().await.unwrap();
        assert!(matches!(third, TickOutcome::Scanned { from: 23, to: 25, logs: 0, .. }));
        assert_eq!(scanner.tick().await.unwrap(), TickOutcome::Idle { safe_head: 25 });

        // Log at 26 only becomes safe once the head moves
        scanner.chain.set_head(31);
        let fourth = scanner.tick().await.unwrap();
        assert!(matches!(fourth, TickOutcome::Scanned { from: 26, to: 26, logs: 1, .. }));
    }

    #[tokio::test]
    async fn test_logs_before_instance_start_are_ignored() {
        let scanner = scanner(
            vec![
                source(TOKEN, 1, GENERIC_ERC20_VOTES_TEMPLATE),
                source(LATE_TOKEN, 8, GENERIC_ERC20_VOTES_TEMPLATE),
            ],
            options(),
        );
        scanner.chain.set_head(10);
        scanner
            .chain
            .push(votes_changed_log(LATE_TOKEN, ALICE, U256::ZERO, tokens(4), 5, 0));
        scanner
            .chain
            .push(votes_changed_log(LATE_TOKEN, BOB, U256::ZERO, tokens(1), 9, 0));

        scanner.tick().await.unwrap();
        let governance = scanner.store().get_governance(LATE_TOKEN).unwrap().unwrap();
        assert_eq!(governance.delegated_votes_raw, signed_tokens(1));
        assert!(scanner.store().get_delegate(LATE_TOKEN, ALICE).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_factory_deployment_is_tracked_from_its_block() {
        let scanner = scanner(vec![source(FACTORY, 1, FACTORY_TEMPLATE)], options());
        let chain = &scanner.chain;
        chain.set_head(20);
        chain.push(contract_deployed_log(FACTORY, ALICE, LATE_TOKEN, 4, 0));
        chain.push(contract_deployed_log(FACTORY, GENERIC_ERC20_VOTES_IMPLEMENTATION, TOKEN, 10, 1));
        chain.push(votes_changed_log(TOKEN, ALICE, U256::ZERO, tokens(5), 10, 2));
        chain.push(votes_changed_log(TOKEN, BOB, U256::ZERO, tokens(1), 15, 0));

        let first = scanner.tick().await.unwrap();
        assert_eq!(
            first,
            TickOutcome::Scanned {
                from: 1,
                to: 10,
                logs: 2,
                registered: 1
            }
        );
        let store = scanner.store();
        let instance = store.get_instance(TOKEN).unwrap().unwrap();
        assert_eq!(instance.template, GENERIC_ERC20_VOTES_TEMPLATE);
        assert_eq!(instance.start_block, 10);
        assert!(store.get_instance(LATE_TOKEN).unwrap().is_none());
        assert_eq!(store.get_checkpoint(FACTORY).unwrap(), Some(10));
        assert!(store.get_governance(TOKEN).unwrap().is_none());

        let second = scanner.tick().await.unwrap();
        assert!(matches!(second, TickOutcome::Scanned { from: 10, to: 20, logs: 2, .. }));
        let governance = store.get_governance(TOKEN).unwrap().unwrap();
        assert_eq!(governance.delegated_votes_raw, signed_tokens(6));
        assert_eq!(governance.current_delegates, 2);
        assert_eq!(store.get_checkpoint(TOKEN).unwrap(), Some(20));
        assert_eq!(store.get_checkpoint(FACTORY).unwrap(), Some(20));
    }

    #[tokio::test]
    async fn test_failed_commit_does_not_advance() {
        let scanner = scanner(vec![source(TOKEN, 1, GENERIC_ERC20_VOTES_TEMPLATE)], options());
        scanner.chain.set_head(10);
        scanner
            .chain
            .push(votes_changed_log(TOKEN, ALICE, U256::ZERO, tokens(2), 6, 0));

        scanner.store().set_fail_writes(true);
        assert!(scanner.tick().await.is_err());
        scanner.store().set_fail_writes(false);
        assert_eq!(scanner.store().get_checkpoint(TOKEN).unwrap(), None);
        assert!(scanner.store().get_governance(TOKEN).unwrap().is_none());

        scanner.tick().await.unwrap();
        scanner.tick().await.unwrap();
        let governance = scanner.store().get_governance(TOKEN).unwrap().unwrap();
        assert_eq!(governance.delegated_votes_raw, signed_tokens(2));
        assert_eq!(governance.current_delegates, 1);
    }

    #[tokio::test]
    async fn test_source_tracked_from_mid_history_keeps_indexing() {
        // Alice got her votes before block 10, so the total dips below zero
        let scanner = scanner(vec![source(TOKEN, 10, GENERIC_ERC20_VOTES_TEMPLATE)], options());
        let chain = &scanner.chain;
        chain.set_head(20);
        chain.push(votes_changed_log(TOKEN, ALICE, tokens(5), tokens(4), 4, 0));
        chain.push(votes_changed_log(TOKEN, ALICE, tokens(5), U256::ZERO, 12, 0));
        chain.push(votes_changed_log(TOKEN, BOB, U256::ZERO, tokens(7), 15, 1));

        let outcome = scanner.tick().await.unwrap();
        assert!(matches!(outcome, TickOutcome::Scanned { from: 10, to: 20, logs: 2, .. }));

        let store = scanner.store();
        let governance = store.get_governance(TOKEN).unwrap().unwrap();
        assert_eq!(governance.delegated_votes_raw, signed_tokens(2));
        assert_eq!(governance.current_delegates, 0);
        assert_eq!(store.get_checkpoint(TOKEN).unwrap(), Some(20));
        assert_eq!(store.get_head().unwrap(), Some(20));
    }

    #[tokio::test]
    async fn test_run_retries_after_failed_fetch() {
        let scanner = scanner(vec![source(TOKEN, 1, GENERIC_ERC20_VOTES_TEMPLATE)], options());
        scanner.chain.set_head(10);
        scanner
            .chain
            .push(votes_changed_log(TOKEN, ALICE, U256::ZERO, tokens(2), 6, 0));
        scanner.chain.fail_next_log_calls(1);

        // run() only returns on fatal errors; give it time to retry
        let result = tokio::time::timeout(Duration::from_millis(300), scanner.run()).await;
        assert!(result.is_err(), "run stopped: {:?}", result);

        assert_eq!(*scanner.chain.failing_log_calls.lock().unwrap(), 0);
        let store = scanner.store();
        assert_eq!(store.get_checkpoint(TOKEN).unwrap(), Some(10));
        let governance = store.get_governance(TOKEN).unwrap().unwrap();
        assert_eq!(governance.delegated_votes_raw, signed_tokens(2));
    }

    #[tokio::test]
    async fn test_run_stops_on_reorg_beyond_history() {
        let scanner = scanner(vec![source(TOKEN, 1, GENERIC_ERC20_VOTES_TEMPLATE)], options());
        scanner.chain.set_head(10);
        scanner.tick().await.unwrap();
        scanner.chain.reorg(1, 1, Vec::new());

        let result = tokio::time::timeout(Duration::from_secs(5), scanner.run())
            .await
            .expect("run should give up");
        let err = result.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ScanError>(),
            Some(ScanError::ReorgTooDeep { .. })
        ));
    }

    #[tokio::test]
    async fn test_reorg_rolls_back_orphaned_blocks() {
        let scanner = scanner(vec![source(TOKEN, 1, GENERIC_ERC20_VOTES_TEMPLATE)], options());
        let chain = &scanner.chain;
        chain.set_head(10);
        chain.push(votes_changed_log(TOKEN, ALICE, U256::ZERO, tokens(5), 5, 0));
        chain.push(votes_changed_log(TOKEN, ALICE, tokens(5), tokens(8), 12, 0));
        scanner.tick().await.unwrap();
        chain.set_head(15);
        scanner.tick().await.unwrap();
        assert_eq!(
            scanner.store().get_governance(TOKEN).unwrap().unwrap().delegated_votes_raw,
            signed_tokens(8)
        );

        // Block 12 is orphaned; the new fork carries a different change at 13
        chain.reorg(
            11,
            1,
            vec![votes_changed_log(TOKEN, ALICE, tokens(5), tokens(6), 13, 0)],
        );
        chain.set_head(16);

        let outcome = scanner.tick().await.unwrap();
        assert!(matches!(outcome, TickOutcome::Scanned { from: 11, to: 16, logs: 1, .. }));

        let store = scanner.store();
        let governance = store.get_governance(TOKEN).unwrap().unwrap();
        assert_eq!(governance.delegated_votes_raw, signed_tokens(6));
        assert_eq!(governance.current_delegates, 1);
        assert_eq!(
            store.get_delegate(TOKEN, ALICE).unwrap().unwrap().delegated_votes_raw,
            tokens(6)
        );
        assert_eq!(store.get_block_hash(12).unwrap(), None);
        assert_eq!(store.get_block_hash(16).unwrap(), Some(block_hash(16, 1)));
    }

    #[tokio::test]
    async fn test_reorg_beyond_history_is_fatal() {
        let scanner = scanner(vec![source(TOKEN, 1, GENERIC_ERC20_VOTES_TEMPLATE)], options());
        scanner.chain.set_head(10);
        scanner.tick().await.unwrap();

        scanner.chain.reorg(1, 1, Vec::new());
        let err = scanner.tick().await.unwrap_err();
        assert!(err.downcast_ref::<ScanError>().is_some());
        assert_eq!(scanner.store().get_head().unwrap(), Some(10));
    }

    #[tokio::test]
    async fn test_resume_does_not_reprocess() {
        let scanner = scanner(vec![source(TOKEN, 1, GENERIC_ERC20_VOTES_TEMPLATE)], options());
        scanner.chain.set_head(10);
        scanner
            .chain
            .push(votes_changed_log(TOKEN, ALICE, U256::ZERO, tokens(2), 4, 0));
        scanner.tick().await.unwrap();

        // A fresh scanner over the same ledger picks up after the checkpoint
        let store = Arc::clone(scanner.store());
        let registry = TemplateRegistry::from_config(&IndexerConfig::default()).unwrap();
        let resumed = Scanner::new(store, scanner.chain, Dispatcher::new(registry), options());
        resumed.chain.set_head(12);
        resumed
            .chain
            .push(votes_changed_log(TOKEN, BOB, U256::ZERO, tokens(1), 11, 0));

        let outcome = resumed.tick().await.unwrap();
        assert!(matches!(outcome, TickOutcome::Scanned { from: 11, to: 12, logs: 1, .. }));
        let governance = resumed.store().get_governance(TOKEN).unwrap().unwrap();
        assert_eq!(governance.delegated_votes_raw, signed_tokens(3));
        assert_eq!(governance.current_delegates, 2);
    }
}
