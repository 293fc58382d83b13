//! # StrataDB
//!
//! An embeddable, persistent key-value storage engine built on a
//! **leveled Log-Structured Merge Tree (LSM-tree)** architecture.
//! Designed for fast writes, cheap point lookups, and predictable
//! background maintenance.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                       Engine                           │
//! │  ┌────────────┐  ┌──────────────┐  ┌───────────────┐   │
//! │  │  Active    │  │  Immutable   │  │  Leveled      │   │
//! │  │  MemTable  │  │  MemTable    │  │  SSTables     │   │
//! │  │            │  │  (flushing)  │  │  L0 … Ln      │   │
//! │  └─────┬──────┘  └──────┬───────┘  └──────┬────────┘   │
//! │        │   freeze       │   flush         │            │
//! │        └─────────►      └────────►        │            │
//! │                                           │            │
//! │  ┌────────────────────────────────────────┘            │
//! │  │  Leveled compaction (L0 → L1 → … → Ln)              │
//! │  └─────────────────────────────────────────────────────┤
//! │                                                        │
//! │  ┌──────────────────┐  ┌─────────────────────────────┐ │
//! │  │  LRU block cache │  │  Flush / compaction workers │ │
//! │  └──────────────────┘  └─────────────────────────────┘ │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`engine`] | Core storage engine — open, read, write, scan, sync, close |
//! | [`memtable`] | In-memory ordered write buffer with size accounting |
//! | [`sstable`] | Immutable, sorted, on-disk tables with sparse index and bloom filter |
//! | [`bloom`] | Double-hashing bloom filter with a stable on-disk format |
//! | [`cache`] | Bounded LRU block cache with hit/miss statistics |
//! | [`compaction`] | Leveled compaction strategy and merge executor |
//!
//! ## Key Features
//!
//! - **Ordered byte keys** — point lookups and `[start, end)` range
//!   scans over arbitrary byte keys and values.
//! - **Tombstone deletes** — deletions are markers that shadow older
//!   versions until compaction physically removes them.
//! - **Sparse-indexed SSTables** — one index entry per 128 records
//!   keeps the in-memory footprint small while bounding each lookup to
//!   a single short block scan.
//! - **Bloom-filter pruning** — each table carries a bloom filter so
//!   negative lookups skip the disk entirely.
//! - **Memory-mapped reads** — tables are read through `mmap` where the
//!   OS supports it, degrading to positional file reads otherwise.
//! - **Copy-on-write level publication** — compaction swaps in a whole
//!   new level snapshot, so in-flight readers are never torn.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stratadb::engine::{Engine, EngineConfig};
//!
//! let engine = Engine::open("/tmp/my_db", EngineConfig::default()).unwrap();
//!
//! // Write
//! engine.put(b"hello".to_vec(), b"world".to_vec()).unwrap();
//!
//! // Read
//! assert_eq!(engine.get(b"hello").unwrap(), Some(b"world".to_vec()));
//!
//! // Delete
//! engine.delete(b"hello".to_vec()).unwrap();
//! assert_eq!(engine.get(b"hello").unwrap(), None);
//!
//! // Range scan
//! engine.put(b"a".to_vec(), b"1".to_vec()).unwrap();
//! engine.put(b"b".to_vec(), b"2".to_vec()).unwrap();
//! let results = engine.scan(b"a", b"c").unwrap();
//! assert_eq!(results.len(), 2);
//!
//! // Graceful shutdown
//! engine.close().unwrap();
//! ```

#![allow(dead_code)]

pub mod bloom;
pub mod cache;
pub mod compaction;
pub mod engine;
pub mod memtable;
pub mod sstable;

pub use engine::{Engine, EngineConfig, EngineError, EngineStats};
