//! # MemTable Module
//!
//! The mutable, in-memory write buffer of the storage engine.
//!
//! ## Design Invariants
//!
//! - At most one entry per key: a new `put` or `delete` replaces the
//!   existing entry, adjusting the size accounting.
//! - The accounted `size` is the sum of current key + value bytes and
//!   saturates at zero on any accounting anomaly.
//! - Iteration yields entries in ascending byte-key order, tombstones
//!   included.
//! - `is_full` holds exactly when `size >= max_size`.
//!
//! ## Lifecycle
//!
//! A MemTable is created empty, mutated only through writer calls, and
//! transitions to "immutable" by being swapped out of the engine's
//! active slot atomically. After a successful flush the immutable
//! instance is dropped.
//!
//! ## Concurrency
//!
//! All operations go through a single `RwLock`; read-heavy paths
//! (`get`, `scan`, `size`) take the shared lock.

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use crate::engine::utils::Entry;

/// Result of a point lookup in a [`Memtable`].
///
/// The engine needs to distinguish "deleted here" from "not present",
/// because a tombstone must stop the lookup from falling through to
/// older layers.
#[derive(Debug, PartialEq)]
pub enum MemtableGet {
    /// A live value for the key.
    Value(Vec<u8>),

    /// The key was deleted in this MemTable.
    Tombstone,

    /// The key is not present in this MemTable.
    NotFound,
}

struct MemtableInner {
    /// Entries keyed by the full byte key. At most one entry per key.
    tree: BTreeMap<Vec<u8>, Entry>,

    /// Sum of current key + value bytes.
    size: usize,
}

/// In-memory ordered buffer of entries with byte-size accounting.
pub struct Memtable {
    inner: RwLock<MemtableInner>,

    /// Byte threshold at which the table reports itself full.
    max_size: usize,
}

impl Memtable {
    /// Creates an empty MemTable that reports full at `max_size` bytes.
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: RwLock::new(MemtableInner {
                tree: BTreeMap::new(),
                size: 0,
            }),
            max_size,
        }
    }

    /// Inserts or replaces the entry for `key`.
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) {
        let mut inner = self.write();

        let old_value_len = inner.tree.get(&key).map(|entry| entry.value.len());
        match old_value_len {
            Some(old_len) => inner.size = inner.size.saturating_sub(old_len),
            None => inner.size = inner.size.saturating_add(key.len()),
        }
        inner.size = inner.size.saturating_add(value.len());

        inner.tree.insert(key.clone(), Entry::new(key, value));
    }

    /// Marks `key` as deleted, replacing any live entry with a fresh
    /// tombstone.
    pub fn delete(&self, key: Vec<u8>) {
        let mut inner = self.write();

        let old_value_len = inner.tree.get(&key).map(|entry| entry.value.len());
        match old_value_len {
            Some(old_len) => inner.size = inner.size.saturating_sub(old_len),
            None => inner.size = inner.size.saturating_add(key.len()),
        }

        inner.tree.insert(key.clone(), Entry::tombstone(key));
    }

    /// Looks up a key.
    pub fn get(&self, key: &[u8]) -> MemtableGet {
        let inner = self.read();
        match inner.tree.get(key) {
            Some(entry) if entry.deleted => MemtableGet::Tombstone,
            Some(entry) => MemtableGet::Value(entry.value.clone()),
            None => MemtableGet::NotFound,
        }
    }

    /// Returns the live `(key, value)` pairs with keys in
    /// `[start, end)`, in ascending key order. Tombstoned keys are
    /// omitted; an inverted range yields nothing.
    pub fn scan(&self, start: &[u8], end: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        if start >= end {
            return Vec::new();
        }
        let inner = self.read();
        inner
            .tree
            .range(start.to_vec()..end.to_vec())
            .filter(|(_, entry)| !entry.deleted)
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect()
    }

    /// Returns a snapshot of every entry — tombstones included — in
    /// ascending key order. This is the flush input.
    pub fn entries(&self) -> Vec<Entry> {
        let inner = self.read();
        inner.tree.values().cloned().collect()
    }

    /// Number of entries, tombstones included.
    pub fn len(&self) -> usize {
        self.read().tree.len()
    }

    /// Returns `true` when no entries are present.
    pub fn is_empty(&self) -> bool {
        self.read().tree.is_empty()
    }

    /// Accounted size in bytes (current key + value bytes).
    pub fn size(&self) -> usize {
        self.read().size
    }

    /// Returns `true` once the accounted size reaches the configured
    /// threshold.
    pub fn is_full(&self) -> bool {
        self.read().size >= self.max_size
    }

    /// Drops every entry and resets the size accounting.
    pub fn clear(&self) {
        let mut inner = self.write();
        inner.tree.clear();
        inner.size = 0;
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, MemtableInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, MemtableInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}
