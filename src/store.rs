//! Ledger store traits and backends
//!
//! Provides durable keyed storage for governance entities and indexing
//! progress. Uses RocksDB with column families for efficient organization;
//! an in-memory backend implements the same traits for tests.
//!
//! Handlers never write to the store directly. They mutate a [`PendingBlock`]
//! overlay which is committed, together with checkpoints and its undo
//! journal, as one atomic [`WriteSet`].

use crate::keys::{
    decode_block_number_key, decode_checkpoint_key, encode_block_hash_key, encode_checkpoint_key,
    encode_delegate_key, encode_delegate_prefix, encode_governance_key, encode_instance_key,
    encode_journal_key, encode_meta_key, META_CONFIG_FINGERPRINT, META_HEAD,
};
use crate::records::{BlockJournal, DelegateRecord, GovernanceRecord, JournalEntry, TrackedInstance};
use alloy_primitives::{Address, B256};
use anyhow::{Context, Result};
use rocksdb::{ColumnFamilyDescriptor, Options, WriteBatch, DB};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use std::time::Duration;
use tracing::info;

/// Column families of the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Column {
    Delegates,
    Governances,
    Instances,
    Checkpoints,
    BlockHashes,
    Journal,
    Meta,
}

impl Column {
    pub const ALL: [Column; 7] = [
        Column::Delegates,
        Column::Governances,
        Column::Instances,
        Column::Checkpoints,
        Column::BlockHashes,
        Column::Journal,
        Column::Meta,
    ];

    /// RocksDB column family name.
    pub fn name(self) -> &'static str {
        match self {
            Column::Delegates => "delegates",
            Column::Governances => "governances",
            Column::Instances => "instances",
            Column::Checkpoints => "checkpoints",
            Column::BlockHashes => "block_hashes",
            Column::Journal => "journal",
            Column::Meta => "meta",
        }
    }
}

/// Raw read access to the ledger.
pub trait KvRead {
    /// Get the value stored under `key`.
    fn get_raw(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Get every entry whose key starts with `prefix`, in key order.
    fn scan_prefix(&self, column: Column, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;
}

/// A ledger backend that can apply write sets atomically.
///
/// Reads must reflect every write set that `write` returned `Ok` for.
pub trait LedgerStore: KvRead + Send + Sync {
    /// Apply all operations or none of them.
    fn write(&self, ops: WriteSet) -> Result<()>;
}

/// A single put (`Some`) or delete (`None`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOp {
    pub column: Column,
    pub key: Vec<u8>,
    pub value: Option<Vec<u8>>,
}

/// Ordered list of operations committed as one batch.
#[derive(Debug, Clone, Default)]
pub struct WriteSet {
    ops: Vec<WriteOp>,
}

impl WriteSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, column: Column, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push(WriteOp {
            column,
            key,
            value: Some(value),
        });
    }

    pub fn delete(&mut self, column: Column, key: Vec<u8>) {
        self.ops.push(WriteOp {
            column,
            key,
            value: None,
        });
    }

    /// Serialize `record` with postcard and queue a put.
    pub fn put_record<T: Serialize>(&mut self, column: Column, key: Vec<u8>, record: &T) -> Result<()> {
        let value = postcard::to_allocvec(record)
            .with_context(|| format!("Failed to serialize {} record", column.name()))?;
        self.put(column, key, value);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }
}

fn decode_record<T: DeserializeOwned>(column: Column, bytes: &[u8]) -> Result<T> {
    postcard::from_bytes(bytes)
        .with_context(|| format!("Failed to deserialize {} record", column.name()))
}

fn decode_u64(bytes: &[u8]) -> Result<u64> {
    let bytes: [u8; 8] = bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("Block number must be 8 bytes (u64), got {}", bytes.len()))?;
    Ok(u64::from_be_bytes(bytes))
}

fn decode_b256(bytes: &[u8]) -> Result<B256> {
    if bytes.len() != 32 {
        anyhow::bail!("Hash must be 32 bytes, got {}", bytes.len());
    }
    Ok(B256::from_slice(bytes))
}

/// Typed reads over any raw reader (backends and pending blocks alike).
pub trait LedgerView: KvRead {
    fn get_record<T: DeserializeOwned>(&self, column: Column, key: &[u8]) -> Result<Option<T>> {
        match self.get_raw(column, key)? {
            Some(bytes) => Ok(Some(decode_record(column, &bytes)?)),
            None => Ok(None),
        }
    }

    fn list_records<T: DeserializeOwned>(&self, column: Column, prefix: &[u8]) -> Result<Vec<T>> {
        self.scan_prefix(column, prefix)?
            .iter()
            .map(|(_, value)| decode_record(column, value))
            .collect()
    }

    /// Get a delegate record.
    fn get_delegate(&self, governance: Address, delegate: Address) -> Result<Option<DelegateRecord>> {
        self.get_record(Column::Delegates, &encode_delegate_key(governance, delegate))
    }

    /// Get a delegate record, or its zero state when it was never saved.
    fn delegate_or_default(&self, governance: Address, delegate: Address) -> Result<DelegateRecord> {
        Ok(self
            .get_delegate(governance, delegate)?
            .unwrap_or_else(|| DelegateRecord::new(governance, delegate)))
    }

    /// List delegates of one governance, or of all of them.
    fn list_delegates(&self, governance: Option<Address>) -> Result<Vec<DelegateRecord>> {
        let prefix = match governance {
            Some(gov) => encode_delegate_prefix(gov),
            None => vec![b'D'],
        };
        self.list_records(Column::Delegates, &prefix)
    }

    /// Get a governance record.
    fn get_governance(&self, id: Address) -> Result<Option<GovernanceRecord>> {
        self.get_record(Column::Governances, &encode_governance_key(id))
    }

    /// Get a governance record, or its zero state when it was never saved.
    fn governance_or_default(&self, id: Address) -> Result<GovernanceRecord> {
        Ok(self
            .get_governance(id)?
            .unwrap_or_else(|| GovernanceRecord::new(id)))
    }

    fn list_governances(&self) -> Result<Vec<GovernanceRecord>> {
        self.list_records(Column::Governances, &[b'G'])
    }

    fn get_instance(&self, address: Address) -> Result<Option<TrackedInstance>> {
        self.get_record(Column::Instances, &encode_instance_key(address))
    }

    fn list_instances(&self) -> Result<Vec<TrackedInstance>> {
        self.list_records(Column::Instances, &[b'T'])
    }

    /// Last block fully processed for a contract.
    fn get_checkpoint(&self, address: Address) -> Result<Option<u64>> {
        match self.get_raw(Column::Checkpoints, &encode_checkpoint_key(address))? {
            Some(bytes) => Ok(Some(decode_u64(&bytes).context("Failed to decode checkpoint")?)),
            None => Ok(None),
        }
    }

    fn list_checkpoints(&self) -> Result<Vec<(Address, u64)>> {
        let mut out = Vec::new();
        for (key, value) in self.scan_prefix(Column::Checkpoints, &[b'K'])? {
            let address = decode_checkpoint_key(&key).context("Failed to decode checkpoint key")?;
            out.push((address, decode_u64(&value)?));
        }
        Ok(out)
    }

    /// Highest block the scanner has completed.
    fn get_head(&self) -> Result<Option<u64>> {
        match self.get_raw(Column::Meta, &encode_meta_key(META_HEAD))? {
            Some(bytes) => Ok(Some(decode_u64(&bytes).context("Failed to decode head block")?)),
            None => Ok(None),
        }
    }

    fn get_block_hash(&self, block: u64) -> Result<Option<B256>> {
        match self.get_raw(Column::BlockHashes, &encode_block_hash_key(block))? {
            Some(bytes) => Ok(Some(decode_b256(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Every recorded block hash, ascending by block number.
    fn list_block_hashes(&self) -> Result<Vec<(u64, B256)>> {
        let mut out = Vec::new();
        for (key, value) in self.scan_prefix(Column::BlockHashes, &[b'B'])? {
            let block = decode_block_number_key(&key).context("Failed to decode block hash key")?;
            out.push((block, decode_b256(&value)?));
        }
        Ok(out)
    }

    fn get_journal(&self, block: u64) -> Result<Option<BlockJournal>> {
        self.get_record(Column::Journal, &encode_journal_key(block))
    }

    /// Blocks that still carry an undo journal, ascending.
    fn journaled_blocks(&self) -> Result<Vec<u64>> {
        self.scan_prefix(Column::Journal, &[b'J'])?
            .iter()
            .map(|(key, _)| decode_block_number_key(key).context("Failed to decode journal key"))
            .collect()
    }

    fn get_config_fingerprint(&self) -> Result<Option<B256>> {
        match self.get_raw(Column::Meta, &encode_meta_key(META_CONFIG_FINGERPRINT))? {
            Some(bytes) => Ok(Some(decode_b256(&bytes)?)),
            None => Ok(None),
        }
    }
}

impl<T: KvRead + ?Sized> LedgerView for T {}

/// Staged writes for one block on top of a store.
///
/// Reads see the staged writes first (read-your-writes), then the store.
/// The first time a key is touched its committed value is remembered so
/// the block can be undone after a reorg.
pub struct PendingBlock<'s, S: ?Sized> {
    store: &'s S,
    writes: BTreeMap<(Column, Vec<u8>), Option<Vec<u8>>>,
    priors: BTreeMap<(Column, Vec<u8>), Option<Vec<u8>>>,
}

impl<'s, S: KvRead + ?Sized> PendingBlock<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self {
            store,
            writes: BTreeMap::new(),
            priors: BTreeMap::new(),
        }
    }

    fn stage(&mut self, column: Column, key: Vec<u8>, value: Option<Vec<u8>>) -> Result<()> {
        let slot = (column, key);
        if !self.priors.contains_key(&slot) {
            let prior = self.store.get_raw(column, &slot.1)?;
            self.priors.insert(slot.clone(), prior);
        }
        self.writes.insert(slot, value);
        Ok(())
    }

    pub fn put_raw(&mut self, column: Column, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.stage(column, key, Some(value))
    }

    pub fn delete_raw(&mut self, column: Column, key: Vec<u8>) -> Result<()> {
        self.stage(column, key, None)
    }

    fn put_record<T: Serialize>(&mut self, column: Column, key: Vec<u8>, record: &T) -> Result<()> {
        let value = postcard::to_allocvec(record)
            .with_context(|| format!("Failed to serialize {} record", column.name()))?;
        self.put_raw(column, key, value)
    }

    /// Save (upsert) a delegate.
    pub fn save_delegate(&mut self, record: &DelegateRecord) -> Result<()> {
        let key = encode_delegate_key(record.governance, record.delegate);
        self.put_record(Column::Delegates, key, record)
    }

    /// Save (upsert) a governance aggregate.
    pub fn save_governance(&mut self, record: &GovernanceRecord) -> Result<()> {
        self.put_record(Column::Governances, encode_governance_key(record.id), record)
    }

    pub fn save_instance(&mut self, instance: &TrackedInstance) -> Result<()> {
        self.put_record(Column::Instances, encode_instance_key(instance.address), instance)
    }

    pub fn set_checkpoint(&mut self, address: Address, block: u64) -> Result<()> {
        self.put_raw(
            Column::Checkpoints,
            encode_checkpoint_key(address),
            block.to_be_bytes().to_vec(),
        )
    }

    pub fn set_head(&mut self, block: u64) -> Result<()> {
        self.put_raw(Column::Meta, encode_meta_key(META_HEAD), block.to_be_bytes().to_vec())
    }

    pub fn set_block_hash(&mut self, block: u64, hash: B256) -> Result<()> {
        self.put_raw(Column::BlockHashes, encode_block_hash_key(block), hash.to_vec())
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Split into the writes to apply and the journal that undoes them.
    pub fn into_parts(self) -> (WriteSet, BlockJournal) {
        let mut ops = WriteSet::new();
        for ((column, key), value) in self.writes {
            match value {
                Some(value) => ops.put(column, key, value),
                None => ops.delete(column, key),
            }
        }
        let entries = self
            .priors
            .into_iter()
            .map(|((column, key), prior)| JournalEntry { column, key, prior })
            .collect();
        (ops, BlockJournal { entries })
    }
}

impl<'s, S: KvRead + ?Sized> KvRead for PendingBlock<'s, S> {
    fn get_raw(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.writes.get(&(column, key.to_vec())) {
            Some(staged) => Ok(staged.clone()),
            None => self.store.get_raw(column, key),
        }
    }

    fn scan_prefix(&self, column: Column, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> =
            self.store.scan_prefix(column, prefix)?.into_iter().collect();
        for ((col, key), value) in &self.writes {
            if *col != column || !key.starts_with(prefix) {
                continue;
            }
            match value {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        Ok(merged.into_iter().collect())
    }
}

/// Delete every entry of every column.
pub fn reset_ledger<S: LedgerStore + ?Sized>(store: &S) -> Result<()> {
    let mut ops = WriteSet::new();
    for column in Column::ALL {
        for (key, _) in store.scan_prefix(column, &[])? {
            ops.delete(column, key);
        }
    }
    store.write(ops).context("Failed to reset ledger")
}

/// RocksDB-backed implementation of LedgerStore.
///
/// Uses one column family per [`Column`]:
/// - delegates: delegate records keyed by (governance, delegate)
/// - governances: governance aggregates
/// - instances: tracked contract instances
/// - checkpoints: last processed block per contract
/// - block_hashes: hashes of committed blocks (reorg detection)
/// - journal: per-block undo journals
/// - meta: metadata (head block, config fingerprint)
pub struct RocksLedgerStore {
    db: DB,
}

impl RocksLedgerStore {
    /// Open or create a RocksDB database at the given path.
    ///
    /// Creates all required column families if they don't exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let column_families = Column::ALL
            .iter()
            .map(|c| ColumnFamilyDescriptor::new(c.name(), Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, column_families)
            .context("Failed to open RocksDB database")?;

        Ok(Self { db })
    }

    /// Wait `delay`, then [`open`](Self::open).
    ///
    /// A deployment being replaced keeps the writer's lock until it exits;
    /// waiting before the open lets it release the lock first.
    pub async fn open_after<P: AsRef<Path>>(path: P, delay: Duration) -> Result<Self> {
        if !delay.is_zero() {
            info!("Waiting {}s before opening the ledger", delay.as_secs());
            tokio::time::sleep(delay).await;
        }
        Self::open(path)
    }

    /// Open an existing database without taking the writer's lock.
    ///
    /// Sees the state committed at open time; used by the query CLI while
    /// the indexer keeps running.
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self> {
        let opts = Options::default();
        let names = Column::ALL.iter().map(|c| c.name());
        let db = DB::open_cf_for_read_only(&opts, path, names, false)
            .context("Failed to open RocksDB database read-only")?;
        Ok(Self { db })
    }

    /// Get a column family handle.
    fn get_cf(&self, column: Column) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(column.name())
            .with_context(|| format!("Column family '{}' not found", column.name()))
    }
}

impl KvRead for RocksLedgerStore {
    fn get_raw(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf = self.get_cf(column)?;
        self.db
            .get_cf(cf, key)
            .with_context(|| format!("Failed to read from {}", column.name()))
    }

    fn scan_prefix(&self, column: Column, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let cf = self.get_cf(column)?;
        let iter = self.db.iterator_cf(
            cf,
            rocksdb::IteratorMode::From(prefix, rocksdb::Direction::Forward),
        );

        let mut out = Vec::new();
        for item in iter {
            let (key, value) = item.context("Failed to read iterator")?;
            if !key.starts_with(prefix) {
                break;
            }
            out.push((key.to_vec(), value.to_vec()));
        }
        Ok(out)
    }
}

impl LedgerStore for RocksLedgerStore {
    fn write(&self, ops: WriteSet) -> Result<()> {
        let mut batch = WriteBatch::default();
        for op in ops.ops {
            let cf = self.get_cf(op.column)?;
            match op.value {
                Some(value) => batch.put_cf(cf, &op.key, &value),
                None => batch.delete_cf(cf, &op.key),
            }
        }
        self.db.write(batch).context("Failed to write batch")
    }
}

/// In-memory ledger, mainly for tests.
///
/// `set_fail_writes(true)` makes every subsequent write fail without
/// applying anything.
#[derive(Default)]
pub struct MemoryLedgerStore {
    data: RwLock<BTreeMap<(Column, Vec<u8>), Vec<u8>>>,
    fail_writes: AtomicBool,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl KvRead for MemoryLedgerStore {
    fn get_raw(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let data = self
            .data
            .read()
            .map_err(|_| anyhow::anyhow!("Ledger lock poisoned"))?;
        Ok(data.get(&(column, key.to_vec())).cloned())
    }

    fn scan_prefix(&self, column: Column, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let data = self
            .data
            .read()
            .map_err(|_| anyhow::anyhow!("Ledger lock poisoned"))?;
        Ok(data
            .range((column, prefix.to_vec())..)
            .take_while(|((col, key), _)| *col == column && key.starts_with(prefix))
            .map(|((_, key), value)| (key.clone(), value.clone()))
            .collect())
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn write(&self, ops: WriteSet) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("Injected write failure");
        }
        let mut data = self
            .data
            .write()
            .map_err(|_| anyhow::anyhow!("Ledger lock poisoned"))?;
        for op in ops.ops {
            match op.value {
                Some(value) => {
                    data.insert((op.column, op.key), value);
                }
                None => {
                    data.remove(&(op.column, op.key));
                }
            }
        }
        Ok(())
    }
}
