//! # Block Cache Module
//!
//! A bounded, strict-LRU cache mapping key bytes to value bytes.
//!
//! The engine consults the cache before any MemTable or SSTable lookup
//! and fills it on every successful read. Every mutation of a key
//! (`put` or `delete` on the engine) invalidates that key's cache slot,
//! so the cache never serves a stale value.
//!
//! ## Semantics
//!
//! - `get` promotes the entry to most-recently-used and counts a hit;
//!   a lookup miss counts a miss.
//! - `put` updates an existing key in place (promoted, no eviction) or
//!   inserts a new one, evicting the single least-recently-used entry
//!   once the cache is at capacity.
//! - `clear` drops all entries and resets the counters.
//!
//! All operations are thread-safe behind a single mutex.


use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};

use lru::LruCache;

/// Default capacity used by the engine.
pub const DEFAULT_CACHE_CAPACITY: usize = 100_000;

/// Hit/miss statistics snapshot returned by [`BlockCache::stats`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStats {
    /// Number of `get` calls that found their key.
    pub hits: u64,

    /// Number of `get` calls that did not.
    pub misses: u64,

    /// `hits / (hits + misses)`, or 0.0 before any lookup.
    pub hit_rate: f64,
}

struct CacheInner {
    entries: LruCache<Vec<u8>, Vec<u8>>,
    hits: u64,
    misses: u64,
}

/// A bounded LRU cache of key → value bytes.
pub struct BlockCache {
    inner: Mutex<CacheInner>,
}

impl BlockCache {
    /// Creates a cache holding at most `capacity` entries. A capacity
    /// of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity clamped to >= 1");
        Self {
            inner: Mutex::new(CacheInner {
                entries: LruCache::new(capacity),
                hits: 0,
                misses: 0,
            }),
        }
    }

    /// Looks up a key, promoting it to most-recently-used on success.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let mut inner = self.lock();
        let value = inner.entries.get(key).cloned();
        match value {
            Some(value) => {
                inner.hits += 1;
                Some(value)
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Inserts or updates a key. Inserting into a full cache evicts the
    /// least-recently-used entry.
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) {
        self.lock().entries.put(key, value);
    }

    /// Removes a key if present.
    pub fn delete(&self, key: &[u8]) {
        self.lock().entries.pop(key);
    }

    /// Drops all entries and resets the hit/miss counters.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.hits = 0;
        inner.misses = 0;
    }

    /// Number of entries currently cached.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Returns `true` when the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of entries the cache will hold.
    pub fn capacity(&self) -> usize {
        self.lock().entries.cap().get()
    }

    /// Returns a snapshot of the hit/miss counters.
    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        let total = inner.hits + inner.misses;
        let hit_rate = if total == 0 {
            0.0
        } else {
            inner.hits as f64 / total as f64
        };
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            hit_rate,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
