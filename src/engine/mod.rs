//! # LSM Storage Engine
//!
//! The composition layer: write path, read path, background flush and
//! compaction, statistics, and lifecycle.
//!
//! ## Write path
//!
//! `put`/`delete` invalidate the block cache for the key, write into
//! the active MemTable under the engine's write lock, and — once the
//! MemTable reaches its size threshold — nudge the flush worker over a
//! non-blocking signal channel. The flush worker atomically swaps the
//! active MemTable into the immutable slot, writes it out as a level-0
//! SSTable, and publishes the new table.
//!
//! ## Read path
//!
//! `get` consults, in order: block cache → active MemTable → immutable
//! MemTable → on-disk levels from L0 outward, newest table first
//! within each level. The first layer with information about the key
//! wins; a tombstone reports the key as absent without looking
//! further. Disk hits populate the cache.
//!
//! ## Level publication
//!
//! The level structure is an `Arc` snapshot. Flush and compaction
//! build a whole new vector and swap it in under the write lock;
//! readers clone the `Arc` and keep using their snapshot for as long
//! as they need — superseded table files are unlinked only after the
//! replacement is visible, and shared ownership keeps open handles
//! valid until the last reader drops them.
//!
//! ## Background workers
//!
//! Two threads, started when auto-compaction is enabled: the flush
//! worker (1 s safety tick) and the compaction worker (10 s safety
//! tick). Each blocks on its signal channel, its ticker, and the
//! shared stop channel via `crossbeam::select!`. Worker errors are
//! logged and retried on the next tick — they never take the engine
//! down.
//!
//! ## Failure semantics
//!
//! Foreground operations return errors to the caller. A table that
//! fails a read during `get` is treated as a miss for that table and
//! the search continues. Corrupt tables found at open time make
//! `open` fail; malformed file names are skipped with a warning.

pub mod utils;

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{Receiver, Sender, bounded, tick};
use crossbeam::select;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::cache::{BlockCache, CacheStats, DEFAULT_CACHE_CAPACITY};
use crate::compaction::{
    CompactionError, CompactionStrategy, Compactor, LeveledOptions, LeveledStrategy,
};
use crate::memtable::{Memtable, MemtableGet};
use crate::sstable::{
    SsTableError, SstWriter, Table, TableGet, open_table, parse_table_file_name, table_file_name,
};
use utils::{Entry, MergeIterator, TableIdAllocator, now_ns};

// ------------------------------------------------------------------------------------------------
// Constants
// ------------------------------------------------------------------------------------------------

/// Default MemTable size threshold: 4 MiB.
pub const DEFAULT_MEM_TABLE_SIZE: usize = 4 * 1024 * 1024;

/// Safety-net interval of the flush worker.
const FLUSH_TICK: Duration = Duration::from_secs(1);

/// Safety-net interval of the compaction worker.
const COMPACTION_TICK: Duration = Duration::from_secs(10);

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine was closed; no further operations are permitted.
    #[error("engine is closed")]
    Closed,

    /// Keys must be non-empty byte sequences.
    #[error("empty key")]
    EmptyKey,

    /// Error originating from the SSTable subsystem.
    #[error("SSTable error: {0}")]
    SsTable(#[from] SsTableError),

    /// Error originating from the compaction subsystem.
    #[error("compaction error: {0}")]
    Compaction(#[from] CompactionError),

    /// Underlying filesystem I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Internal invariant violation.
    #[error("internal error: {0}")]
    Internal(String),
}

// ------------------------------------------------------------------------------------------------
// Configuration
// ------------------------------------------------------------------------------------------------

/// Configuration for an [`Engine`] instance. Passed to [`Engine::open`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Byte threshold at which the active MemTable is considered full
    /// and handed to the flush worker.
    pub mem_table_size: usize,

    /// Capacity of the block cache, in entries.
    pub cache_capacity: usize,

    /// Leveled compaction parameters.
    pub compaction: LeveledOptions,

    /// When `false`, the engine serves reads and writes but never
    /// starts the background workers. Flushes then only happen through
    /// [`Engine::sync`] and compactions through [`Engine::compact`] —
    /// the mode deterministic tests run in.
    pub enable_auto_compaction: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mem_table_size: DEFAULT_MEM_TABLE_SIZE,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            compaction: LeveledOptions::default(),
            enable_auto_compaction: true,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Statistics
// ------------------------------------------------------------------------------------------------

/// Point-in-time snapshot of engine statistics from [`Engine::stats`].
///
/// `bytes_written` counts bytes persisted to table files by flushes
/// and compactions; `bytes_read` counts entry bytes served from table
/// files on point lookups.
#[derive(Debug, Clone)]
pub struct EngineStats {
    /// Number of `put` and `delete` calls.
    pub writes: u64,
    /// Number of `get` calls.
    pub reads: u64,
    /// Number of MemTable flushes completed.
    pub flushes: u64,
    /// Number of compactions completed.
    pub compactions: u64,
    /// Bytes written into SSTable files.
    pub bytes_written: u64,
    /// Entry bytes read from SSTable files.
    pub bytes_read: u64,
    /// Current accounted size of the active MemTable.
    pub memtable_size_bytes: usize,
    /// Total number of SSTables across all levels.
    pub sstable_count: usize,
    /// Number of SSTables at level 0.
    pub level0_count: usize,
}

/// Lock-free counters for the high-frequency paths.
struct Counters {
    writes: AtomicU64,
    reads: AtomicU64,
    flushes: AtomicU64,
    compactions: AtomicU64,
    bytes_written: AtomicU64,
    bytes_read: AtomicU64,
}

impl Counters {
    fn new() -> Self {
        Self {
            writes: AtomicU64::new(0),
            reads: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
            compactions: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            bytes_read: AtomicU64::new(0),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Engine state
// ------------------------------------------------------------------------------------------------

type Levels = Arc<Vec<Vec<Arc<dyn Table>>>>;

struct EngineInner {
    /// MemTable accepting writes.
    active: Arc<Memtable>,

    /// Snapshot being flushed; occupied only while a flush is in
    /// progress (or pending retry after a failed one).
    immutable: Option<Arc<Memtable>>,

    /// Copy-on-write level snapshot. Index 0 is level 0.
    levels: Levels,
}

struct EngineShared {
    config: EngineConfig,
    data_dir: PathBuf,
    inner: RwLock<EngineInner>,
    cache: BlockCache,
    counters: Counters,
    ids: TableIdAllocator,
    strategy: LeveledStrategy,
    compactor: Compactor,
    closed: AtomicBool,

    /// Nudges the flush worker; capacity 1, coalesced.
    flush_signal: Sender<()>,

    /// Nudges the compaction worker; capacity 1, coalesced.
    compact_signal: Sender<()>,

    /// Serializes the whole flush procedure across the worker, `sync`,
    /// and `close`.
    flush_lock: Mutex<()>,

    /// Serializes compaction rounds across the worker and foreground
    /// [`Engine::compact`] calls.
    compact_lock: Mutex<()>,

    /// Dropping the sender wakes and stops both workers.
    stop_signal: Mutex<Option<Sender<()>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

enum FlushOutcome {
    /// An L0 table was published.
    Flushed,

    /// There was nothing to write.
    Nothing,
}

/// The main LSM storage engine handle.
///
/// Thread-safe — can be cloned and shared across threads; all clones
/// operate on the same underlying state. Call [`Engine::close`] before
/// dropping the last handle to stop the background workers and run a
/// final flush.
#[derive(Clone)]
pub struct Engine {
    shared: Arc<EngineShared>,
}

impl Engine {
    /// Opens (or creates) an engine rooted at the given directory.
    ///
    /// Existing `*.sst` files are enumerated, parsed as
    /// `L<level>-<id>.sst`, opened, and bucketed into their levels.
    /// Files with malformed names are skipped with a warning; a file
    /// that fails to open (bad magic, checksum mismatch, I/O) makes
    /// the whole open fail.
    pub fn open(path: impl AsRef<Path>, config: EngineConfig) -> Result<Self, EngineError> {
        let data_dir = path.as_ref().to_path_buf();
        fs::create_dir_all(&data_dir)?;

        let max_levels = config.compaction.max_levels.max(1);
        let (levels, max_id) = scan_tables(&data_dir, max_levels)?;
        let table_count: usize = levels.iter().map(Vec::len).sum();

        // Ids must outrun both the wall clock (legacy flush naming)
        // and everything already on disk.
        let id_seed = (now_ns().max(0) as u64).max(max_id.saturating_add(1));

        let (flush_tx, flush_rx) = bounded(1);
        let (compact_tx, compact_rx) = bounded(1);

        let shared = Arc::new(EngineShared {
            inner: RwLock::new(EngineInner {
                active: Arc::new(Memtable::new(config.mem_table_size)),
                immutable: None,
                levels: Arc::new(levels),
            }),
            cache: BlockCache::new(config.cache_capacity),
            counters: Counters::new(),
            ids: TableIdAllocator::new(id_seed),
            strategy: LeveledStrategy::new(config.compaction.clone()),
            compactor: Compactor::new(&data_dir),
            closed: AtomicBool::new(false),
            flush_signal: flush_tx,
            compact_signal: compact_tx,
            flush_lock: Mutex::new(()),
            compact_lock: Mutex::new(()),
            stop_signal: Mutex::new(None),
            workers: Mutex::new(Vec::new()),
            data_dir,
            config,
        });

        if shared.config.enable_auto_compaction {
            let (stop_tx, stop_rx) = bounded::<()>(0);
            let mut workers = Vec::new();

            {
                let shared = Arc::clone(&shared);
                let stop = stop_rx.clone();
                workers.push(
                    std::thread::Builder::new()
                        .name("strata-flush".into())
                        .spawn(move || flush_worker(shared, stop, flush_rx))?,
                );
            }
            {
                let shared = Arc::clone(&shared);
                workers.push(
                    std::thread::Builder::new()
                        .name("strata-compact".into())
                        .spawn(move || compaction_worker(shared, stop_rx, compact_rx))?,
                );
            }

            *shared.stop_signal.lock().unwrap_or_else(PoisonError::into_inner) = Some(stop_tx);
            *shared.workers.lock().unwrap_or_else(PoisonError::into_inner) = workers;
        }

        info!(
            data_dir = %shared.data_dir.display(),
            tables = table_count,
            auto_compaction = shared.config.enable_auto_compaction,
            "engine opened"
        );

        Ok(Self { shared })
    }

    /// Inserts or updates a key.
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), EngineError> {
        if self.shared.is_closed() {
            return Err(EngineError::Closed);
        }
        if key.is_empty() {
            return Err(EngineError::EmptyKey);
        }

        self.shared.cache.delete(&key);

        let full = {
            let inner = self.shared.write_inner();
            inner.active.put(key, value);
            inner.active.is_full()
        };

        self.shared.counters.writes.fetch_add(1, Ordering::Relaxed);
        if full {
            EngineShared::signal(&self.shared.flush_signal);
        }
        Ok(())
    }

    /// Deletes a key by writing a tombstone.
    pub fn delete(&self, key: Vec<u8>) -> Result<(), EngineError> {
        if self.shared.is_closed() {
            return Err(EngineError::Closed);
        }
        if key.is_empty() {
            return Err(EngineError::EmptyKey);
        }

        self.shared.cache.delete(&key);

        let full = {
            let inner = self.shared.write_inner();
            inner.active.delete(key);
            inner.active.is_full()
        };

        self.shared.counters.writes.fetch_add(1, Ordering::Relaxed);
        if full {
            EngineShared::signal(&self.shared.flush_signal);
        }
        Ok(())
    }

    /// Looks up a single key.
    ///
    /// Returns `Ok(Some(value))` if the key exists, `Ok(None)` if it
    /// was deleted or never written. The lookup order is: block cache
    /// → active MemTable → immutable MemTable → levels from L0
    /// outward, newest table first within each level. A read error on
    /// one table is treated as a miss for that table.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, EngineError> {
        if self.shared.is_closed() {
            return Err(EngineError::Closed);
        }
        self.shared.counters.reads.fetch_add(1, Ordering::Relaxed);

        if let Some(value) = self.shared.cache.get(key) {
            return Ok(Some(value));
        }

        let levels = {
            let inner = self.shared.read_inner();

            match inner.active.get(key) {
                MemtableGet::Value(value) => {
                    self.shared.cache.put(key.to_vec(), value.clone());
                    return Ok(Some(value));
                }
                MemtableGet::Tombstone => return Ok(None),
                MemtableGet::NotFound => {}
            }

            if let Some(immutable) = &inner.immutable {
                match immutable.get(key) {
                    MemtableGet::Value(value) => {
                        self.shared.cache.put(key.to_vec(), value.clone());
                        return Ok(Some(value));
                    }
                    MemtableGet::Tombstone => return Ok(None),
                    MemtableGet::NotFound => {}
                }
            }

            // Keep the snapshot, release the lock: the Arc keeps every
            // table alive even if a compaction publishes meanwhile.
            Arc::clone(&inner.levels)
        };

        for level in levels.iter() {
            for table in level.iter().rev() {
                match table.get(key) {
                    Ok(TableGet::Found(entry)) => {
                        self.shared
                            .counters
                            .bytes_read
                            .fetch_add((entry.key.len() + entry.value.len()) as u64, Ordering::Relaxed);
                        self.shared.cache.put(key.to_vec(), entry.value.clone());
                        return Ok(Some(entry.value));
                    }
                    Ok(TableGet::Tombstone) => return Ok(None),
                    Ok(TableGet::Miss) => {}
                    Err(err) => {
                        warn!(
                            table = table.id(),
                            level = table.level(),
                            %err,
                            "table read failed during lookup, treating as miss"
                        );
                    }
                }
            }
        }

        Ok(None)
    }

    /// Returns every live `(key, value)` pair with key in
    /// `[start, end)`, merged across all layers. For each key the
    /// newest layer wins; a tombstone suppresses all older values.
    pub fn scan(
        &self,
        start: &[u8],
        end: &[u8],
    ) -> Result<BTreeMap<Vec<u8>, Vec<u8>>, EngineError> {
        if self.shared.is_closed() {
            return Err(EngineError::Closed);
        }

        let mut results = BTreeMap::new();
        if start >= end {
            return Ok(results);
        }

        // Sources ordered newest-layer-first; the merge iterator
        // breaks key ties by source order, so the first record seen
        // for a key is the authoritative one.
        let mut sources: Vec<Box<dyn Iterator<Item = Entry>>> = Vec::new();

        let levels = {
            let inner = self.shared.read_inner();
            sources.push(Box::new(
                memtable_range(&inner.active, start, end).into_iter(),
            ));
            if let Some(immutable) = &inner.immutable {
                sources.push(Box::new(memtable_range(immutable, start, end).into_iter()));
            }
            Arc::clone(&inner.levels)
        };

        for level in levels.iter() {
            for table in level.iter().rev() {
                let entries = table.scan_raw(start, end)?;
                sources.push(Box::new(entries.into_iter()));
            }
        }

        let mut last_key: Option<Vec<u8>> = None;
        for entry in MergeIterator::new(sources) {
            if last_key.as_deref() == Some(entry.key.as_slice()) {
                continue;
            }
            last_key = Some(entry.key.clone());
            if !entry.deleted {
                results.insert(entry.key, entry.value);
            }
        }

        Ok(results)
    }

    /// Flushes buffered writes to disk and waits for completion.
    ///
    /// After `sync` returns, everything written so far is durable in
    /// level-0 tables.
    pub fn sync(&self) -> Result<(), EngineError> {
        if self.shared.is_closed() {
            return Err(EngineError::Closed);
        }

        loop {
            match self.shared.flush_once(true)? {
                FlushOutcome::Nothing => return Ok(()),
                FlushOutcome::Flushed => {
                    // Writes may have raced into the fresh MemTable;
                    // loop until both slots are drained.
                    let inner = self.shared.read_inner();
                    if inner.active.is_empty() && inner.immutable.is_none() {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Runs compaction rounds until no trigger fires. Returns `true`
    /// if at least one round ran.
    ///
    /// This is the foreground twin of the compaction worker, for
    /// callers (and tests) that disable auto-compaction.
    pub fn compact(&self) -> Result<bool, EngineError> {
        if self.shared.is_closed() {
            return Err(EngineError::Closed);
        }

        let mut any = false;
        while self.shared.compaction_round()? {
            any = true;
        }
        Ok(any)
    }

    /// Returns a snapshot of engine statistics.
    pub fn stats(&self) -> EngineStats {
        let (memtable_size_bytes, sstable_count, level0_count) = {
            let inner = self.shared.read_inner();
            (
                inner.active.size(),
                inner.levels.iter().map(Vec::len).sum(),
                inner.levels.first().map(Vec::len).unwrap_or(0),
            )
        };

        let counters = &self.shared.counters;
        EngineStats {
            writes: counters.writes.load(Ordering::Relaxed),
            reads: counters.reads.load(Ordering::Relaxed),
            flushes: counters.flushes.load(Ordering::Relaxed),
            compactions: counters.compactions.load(Ordering::Relaxed),
            bytes_written: counters.bytes_written.load(Ordering::Relaxed),
            bytes_read: counters.bytes_read.load(Ordering::Relaxed),
            memtable_size_bytes,
            sstable_count,
            level0_count,
        }
    }

    /// Returns the block cache hit/miss counters.
    pub fn cache_stats(&self) -> CacheStats {
        self.shared.cache.stats()
    }

    /// Logs a one-line summary of the current statistics.
    pub fn print_stats(&self) {
        let stats = self.stats();
        let cache = self.cache_stats();
        info!(
            writes = stats.writes,
            reads = stats.reads,
            flushes = stats.flushes,
            compactions = stats.compactions,
            bytes_written = stats.bytes_written,
            bytes_read = stats.bytes_read,
            memtable_size_bytes = stats.memtable_size_bytes,
            sstables = stats.sstable_count,
            level0 = stats.level0_count,
            cache_hits = cache.hits,
            cache_misses = cache.misses,
            cache_hit_rate = cache.hit_rate,
            "engine stats"
        );
    }

    /// Gracefully shuts down the engine. Idempotent.
    ///
    /// Stops both workers, waits for them to exit, runs a final flush,
    /// and releases every table handle. After `close`, all operations
    /// except further `close` calls fail with [`EngineError::Closed`].
    pub fn close(&self) -> Result<(), EngineError> {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(stop) = self
            .shared
            .stop_signal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            drop(stop);
        }

        let workers: Vec<JoinHandle<()>> = self
            .shared
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for worker in workers {
            if worker.join().is_err() {
                error!("worker panicked during shutdown");
            }
        }

        let mut first_error: Option<EngineError> = None;
        loop {
            match self.shared.flush_once(true) {
                Ok(FlushOutcome::Flushed) => continue,
                Ok(FlushOutcome::Nothing) => break,
                Err(err) => {
                    error!(%err, "final flush failed during close");
                    first_error.get_or_insert(err);
                    break;
                }
            }
        }

        {
            let mut inner = self.shared.write_inner();
            inner.levels = Arc::new(Vec::new());
        }
        self.shared.cache.clear();

        info!("engine closed");
        match first_error {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Shared procedures — used by both the public API and the workers
// ------------------------------------------------------------------------------------------------

impl EngineShared {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn read_inner(&self) -> RwLockReadGuard<'_, EngineInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_inner(&self) -> RwLockWriteGuard<'_, EngineInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Non-blocking nudge; a full channel means a wake-up is already
    /// pending.
    fn signal(sender: &Sender<()>) {
        let _ = sender.try_send(());
    }

    /// One flush attempt.
    ///
    /// With `force` unset, only a full MemTable is flushed (the
    /// worker-tick path); `force` flushes any non-empty MemTable
    /// (`sync` and `close`). An immutable snapshot left over from a
    /// failed flush is retried before a new swap happens.
    fn flush_once(&self, force: bool) -> Result<FlushOutcome, EngineError> {
        let _guard = self
            .flush_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let immutable = {
            let mut inner = self.write_inner();
            match &inner.immutable {
                Some(immutable) => Arc::clone(immutable),
                None => {
                    if inner.active.is_empty() || (!force && !inner.active.is_full()) {
                        return Ok(FlushOutcome::Nothing);
                    }
                    let fresh = Arc::new(Memtable::new(self.config.mem_table_size));
                    let old = std::mem::replace(&mut inner.active, fresh);
                    inner.immutable = Some(Arc::clone(&old));
                    old
                }
            }
        };

        let entries = immutable.entries();
        if entries.is_empty() {
            self.write_inner().immutable = None;
            return Ok(FlushOutcome::Nothing);
        }
        let entry_count = entries.len();

        let id = self.ids.next();
        let path = self.data_dir.join(table_file_name(0, id));

        let table = match SstWriter::new(&path)
            .write(entries)
            .and_then(|_| open_table(&path, 0, id))
        {
            Ok(table) => table,
            Err(err) => {
                // The immutable slot stays occupied; the next attempt
                // retries it. The partial file must not survive.
                if let Err(remove_err) = fs::remove_file(&path) {
                    if remove_err.kind() != io::ErrorKind::NotFound {
                        warn!(path = %path.display(), %remove_err, "failed to remove partial flush output");
                    }
                }
                return Err(err.into());
            }
        };
        let file_size = table.file_size();

        {
            let mut inner = self.write_inner();
            let mut levels: Vec<Vec<Arc<dyn Table>>> = (*inner.levels).clone();
            if levels.is_empty() {
                levels.push(Vec::new());
            }
            levels[0].push(table);
            inner.levels = Arc::new(levels);
            inner.immutable = None;
        }

        self.counters.flushes.fetch_add(1, Ordering::Relaxed);
        self.counters
            .bytes_written
            .fetch_add(file_size, Ordering::Relaxed);
        Self::signal(&self.compact_signal);

        debug!(id, entries = entry_count, bytes = file_size, "flushed MemTable to L0");
        Ok(FlushOutcome::Flushed)
    }

    /// One compaction round: select a plan, merge, publish, delete
    /// sources. Returns `true` if a plan ran.
    fn compaction_round(&self) -> Result<bool, EngineError> {
        let _guard = self
            .compact_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let plan = {
            let inner = self.read_inner();
            self.strategy.select(&inner.levels)
        };
        let Some(plan) = plan else {
            return Ok(false);
        };

        debug!(
            source_level = plan.source_level,
            output_level = plan.output_level,
            inputs = plan.inputs.len(),
            "compaction started"
        );

        let outputs = self.compactor.compact(&plan, &self.ids)?;
        let output_count = outputs.len();
        let output_bytes: u64 = outputs.iter().map(|table| table.file_size()).sum();

        // Copy-on-write publication: build the replacement vector and
        // swap it in; readers on the old snapshot stay valid.
        {
            let mut inner = self.write_inner();
            let mut levels: Vec<Vec<Arc<dyn Table>>> = (*inner.levels).clone();

            // Inputs span the source and output levels; drop them
            // wherever they sit.
            let input_ids: Vec<u64> = plan.inputs.iter().map(|table| table.id()).collect();
            for level in &mut levels {
                level.retain(|table| !input_ids.contains(&table.id()));
            }

            while levels.len() <= plan.output_level as usize {
                levels.push(Vec::new());
            }
            levels[plan.output_level as usize].extend(outputs);

            inner.levels = Arc::new(levels);
        }

        self.counters.compactions.fetch_add(1, Ordering::Relaxed);
        self.counters
            .bytes_written
            .fetch_add(output_bytes, Ordering::Relaxed);

        // Only after publication can the superseded files go; shared
        // ownership keeps in-flight readers on the old snapshot safe.
        if let Err(err) = self.compactor.cleanup_old(&plan.inputs) {
            warn!(%err, "failed to remove superseded tables");
        }

        info!(
            source_level = plan.source_level,
            output_level = plan.output_level,
            inputs = plan.inputs.len(),
            outputs = output_count,
            output_bytes,
            "compaction finished"
        );
        Ok(true)
    }

    fn flush_on_signal(&self) {
        if let Err(err) = self.flush_once(false) {
            error!(%err, "background flush failed");
        }
    }

    fn compact_on_signal(&self) {
        loop {
            match self.compaction_round() {
                Ok(true) => continue,
                Ok(false) => break,
                Err(err) => {
                    error!(%err, "background compaction failed");
                    break;
                }
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Background workers
// ------------------------------------------------------------------------------------------------

fn flush_worker(shared: Arc<EngineShared>, stop: Receiver<()>, signal: Receiver<()>) {
    let ticker = tick(FLUSH_TICK);
    loop {
        select! {
            recv(stop) -> _ => break,
            recv(signal) -> message => {
                if message.is_err() {
                    break;
                }
                shared.flush_on_signal();
            }
            recv(ticker) -> _ => shared.flush_on_signal(),
        }
    }
    debug!("flush worker stopped");
}

fn compaction_worker(shared: Arc<EngineShared>, stop: Receiver<()>, signal: Receiver<()>) {
    let ticker = tick(COMPACTION_TICK);
    loop {
        select! {
            recv(stop) -> _ => break,
            recv(signal) -> message => {
                if message.is_err() {
                    break;
                }
                shared.compact_on_signal();
            }
            recv(ticker) -> _ => shared.compact_on_signal(),
        }
    }
    debug!("compaction worker stopped");
}

// ------------------------------------------------------------------------------------------------
// Directory scan
// ------------------------------------------------------------------------------------------------

/// Enumerates `*.sst` files in `data_dir` and buckets them by level.
///
/// Malformed file names are skipped with a warning; a well-formed name
/// that fails to open surfaces its error and fails the scan. Within a
/// level, tables are ordered by ascending id (oldest first). Returns
/// the level vector and the highest id seen.
fn scan_tables(
    data_dir: &Path,
    max_levels: usize,
) -> Result<(Vec<Vec<Arc<dyn Table>>>, u64), EngineError> {
    let mut levels: Vec<Vec<Arc<dyn Table>>> = (0..max_levels).map(|_| Vec::new()).collect();
    let mut max_id = 0u64;

    for dir_entry in fs::read_dir(data_dir)? {
        let dir_entry = dir_entry?;
        let path = dir_entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if !name.ends_with(".sst") {
            continue;
        }

        let Some((level, id)) = parse_table_file_name(name) else {
            warn!(file = name, "ignoring table file with malformed name");
            continue;
        };

        let table = open_table(&path, level, id)?;
        while levels.len() <= level as usize {
            levels.push(Vec::new());
        }
        levels[level as usize].push(table);
        max_id = max_id.max(id);
    }

    for level in &mut levels {
        level.sort_by_key(|table| table.id());
    }

    Ok((levels, max_id))
}

/// Entries of a MemTable restricted to `[start, end)`, tombstones
/// included — the scan-path source.
fn memtable_range(memtable: &Memtable, start: &[u8], end: &[u8]) -> Vec<Entry> {
    memtable
        .entries()
        .into_iter()
        .filter(|entry| entry.key.as_slice() >= start && entry.key.as_slice() < end)
        .collect()
}
