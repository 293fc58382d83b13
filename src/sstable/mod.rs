//! # SSTable Module
//!
//! Immutable, sorted, on-disk tables — the durable layer of the
//! LSM tree.
//!
//! An SSTable holds each key at most once, in ascending byte order.
//! Point lookups binary-search a **sparse index** (one entry per
//! [`INDEX_INTERVAL`] records) and then scan a single short block;
//! a per-table **bloom filter** rejects most lookups for absent keys
//! before any data is touched.
//!
//! ## On-disk layout (little-endian)
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ header   magic (u32) | version (u32)                         │
//! │          entry_count (u64) | index_offset (u64)              │
//! ├──────────────────────────────────────────────────────────────┤
//! │ data     key_len (u32) | key | value_len (u32) | value       │
//! │          | timestamp (i64) | deleted (u8)          × count   │
//! ├──────────────────────────────────────────────────────────────┤
//! │ index    count (u32), then per entry:                        │
//! │          key_len (u32) | key | offset (u64)                  │
//! ├──────────────────────────────────────────────────────────────┤
//! │ bloom    bloom_size (u32) | marshaled filter                 │
//! ├──────────────────────────────────────────────────────────────┤
//! │ footer   crc32 (u32) over the marshaled filter bytes         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Files are named `L<level>-<id:06>.sst`. Tables written before the
//! bloom block was introduced end right after the index; they open
//! with a filter that cannot exclude anything.
//!
//! ## Sub-modules
//!
//! - [`builder`] — [`SstWriter`], streams sorted entries to a new file.
//! - [`reader`] — [`SsTableReader`], positional file reads.
//! - [`mapped`] — [`MappedSsTable`], the `mmap`-backed variant.
//!
//! Both readers implement the shared [`Table`] contract and are safe
//! for concurrent use; a table file is immutable once written.

pub mod builder;
pub mod mapped;
pub mod reader;

#[cfg(test)]
mod tests;

pub use builder::SstWriter;
pub use mapped::MappedSsTable;
pub use reader::SsTableReader;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use crate::bloom::BloomFilter;
use crate::engine::utils::Entry;

// ------------------------------------------------------------------------------------------------
// Constants
// ------------------------------------------------------------------------------------------------

/// Table file magic: `b"SSTB"` read as a little-endian u32.
pub(crate) const MAGIC: u32 = 0x5353_5442;

/// Current format version.
pub(crate) const FORMAT_VERSION: u32 = 1;

/// Fixed header size in bytes.
pub(crate) const HEADER_SIZE: u64 = 24;

/// One sparse-index entry is emitted per this many data entries, so a
/// point lookup scans at most this many records.
pub const INDEX_INTERVAL: usize = 128;

/// Target false-positive rate for per-table bloom filters.
pub(crate) const BLOOM_FP_RATE: f64 = 0.01;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by SSTable operations (read, write, open).
#[derive(Debug, Error)]
pub enum SsTableError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Missing or wrong magic, truncated structures, malformed fields.
    #[error("invalid table format: {0}")]
    InvalidFormat(String),

    /// A stored checksum did not match the recomputed one.
    #[error("integrity error: {0}")]
    Integrity(String),

    /// A file offset exceeded the u64 range while writing.
    #[error("file offset overflow")]
    OffsetOverflow,
}

// ------------------------------------------------------------------------------------------------
// Table contract
// ------------------------------------------------------------------------------------------------

/// Result of a single-key lookup in one table.
#[derive(Debug, PartialEq)]
pub enum TableGet {
    /// A live entry for the key.
    Found(Entry),

    /// The key is tombstoned in this table; the lookup must stop here.
    Tombstone,

    /// This table has no information about the key.
    Miss,
}

/// Identity and placement of a table file.
#[derive(Debug, Clone)]
pub struct TableMeta {
    /// LSM level this table belongs to.
    pub level: u32,

    /// Engine-assigned id, unique across the data directory.
    pub id: u64,

    /// Absolute path of the backing file.
    pub path: PathBuf,

    /// On-disk size in bytes.
    pub file_size: u64,
}

/// The shared read contract of the seek-based and memory-mapped
/// readers.
///
/// Implementations are immutable after open and safe for concurrent
/// reads. Key comparisons are byte-lexicographic.
pub trait Table: Send + Sync + std::fmt::Debug {
    /// Identity and placement of this table.
    fn meta(&self) -> &TableMeta;

    /// Number of data entries, tombstones included.
    fn entry_count(&self) -> u64;

    /// Point lookup.
    fn get(&self, key: &[u8]) -> Result<TableGet, SsTableError>;

    /// All entries with key in `[start, end)`, tombstones included,
    /// in ascending key order.
    fn scan_raw(&self, start: &[u8], end: &[u8]) -> Result<Vec<Entry>, SsTableError>;

    /// Every entry in the table, tombstones included, in key order.
    fn entries(&self) -> Result<Vec<Entry>, SsTableError>;

    /// LSM level of this table.
    fn level(&self) -> u32 {
        self.meta().level
    }

    /// Engine-assigned table id.
    fn id(&self) -> u64 {
        self.meta().id
    }

    /// Path of the backing file.
    fn path(&self) -> &Path {
        &self.meta().path
    }

    /// On-disk size in bytes.
    fn file_size(&self) -> u64 {
        self.meta().file_size
    }

    /// Live `(key, value)` pairs with key in `[start, end)`.
    fn scan(&self, start: &[u8], end: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, SsTableError> {
        Ok(self
            .scan_raw(start, end)?
            .into_iter()
            .filter(|entry| !entry.deleted)
            .map(|entry| (entry.key, entry.value))
            .collect())
    }
}

/// Opens a table preferring the memory-mapped reader, degrading to
/// positional reads when mapping fails.
///
/// Format and integrity errors are never masked by the fallback — only
/// an I/O-level mapping failure retries with the seek-based reader.
pub fn open_table(path: &Path, level: u32, id: u64) -> Result<Arc<dyn Table>, SsTableError> {
    match MappedSsTable::open(path, level, id) {
        Ok(table) => Ok(Arc::new(table)),
        Err(SsTableError::Io(err)) => {
            warn!(path = %path.display(), %err, "mmap open failed, falling back to seek reads");
            Ok(Arc::new(SsTableReader::open(path, level, id)?))
        }
        Err(err) => Err(err),
    }
}

// ------------------------------------------------------------------------------------------------
// File naming
// ------------------------------------------------------------------------------------------------

/// Formats the canonical file name for a table: `L<level>-<id:06>.sst`.
pub fn table_file_name(level: u32, id: u64) -> String {
    format!("L{level}-{id:06}.sst")
}

/// Parses a table file name back into `(level, id)`. Returns `None`
/// for anything that does not match `L<level>-<id>.sst`.
pub fn parse_table_file_name(name: &str) -> Option<(u32, u64)> {
    let rest = name.strip_prefix('L')?.strip_suffix(".sst")?;
    let (level, id) = rest.split_once('-')?;
    Some((level.parse().ok()?, id.parse().ok()?))
}

// ------------------------------------------------------------------------------------------------
// Sparse index
// ------------------------------------------------------------------------------------------------

/// One sparse-index entry: the first key of a block and the file
/// offset of that block's first data entry.
#[derive(Debug, Clone)]
pub(crate) struct IndexEntry {
    pub(crate) key: Vec<u8>,
    pub(crate) offset: u64,
}

/// Returns the index of the block that may contain `key`, or `None`
/// when `key` sorts before the table's first key.
pub(crate) fn find_block(index: &[IndexEntry], key: &[u8]) -> Option<usize> {
    let after = index.partition_point(|entry| entry.key.as_slice() <= key);
    after.checked_sub(1)
}

/// Half-open byte range `[start, end)` of block `block_idx` in the
/// data region, where `data_end` is the index offset.
pub(crate) fn block_bounds(index: &[IndexEntry], data_end: u64, block_idx: usize) -> (u64, u64) {
    let start = index[block_idx].offset;
    let end = index
        .get(block_idx + 1)
        .map(|next| next.offset)
        .unwrap_or(data_end);
    (start, end)
}

// ------------------------------------------------------------------------------------------------
// Slice decoding — shared by both readers
// ------------------------------------------------------------------------------------------------

pub(crate) fn get_u32(buf: &[u8], off: &mut usize) -> Result<u32, SsTableError> {
    let bytes = take(buf, off, 4)?;
    Ok(u32::from_le_bytes(bytes.try_into().expect("4-byte slice")))
}

pub(crate) fn get_u64(buf: &[u8], off: &mut usize) -> Result<u64, SsTableError> {
    let bytes = take(buf, off, 8)?;
    Ok(u64::from_le_bytes(bytes.try_into().expect("8-byte slice")))
}

pub(crate) fn get_i64(buf: &[u8], off: &mut usize) -> Result<i64, SsTableError> {
    let bytes = take(buf, off, 8)?;
    Ok(i64::from_le_bytes(bytes.try_into().expect("8-byte slice")))
}

pub(crate) fn take<'a>(
    buf: &'a [u8],
    off: &mut usize,
    len: usize,
) -> Result<&'a [u8], SsTableError> {
    let end = off
        .checked_add(len)
        .filter(|&end| end <= buf.len())
        .ok_or_else(|| {
            SsTableError::InvalidFormat(format!(
                "truncated read: need {len} bytes at offset {off}, have {}",
                buf.len()
            ))
        })?;
    let slice = &buf[*off..end];
    *off = end;
    Ok(slice)
}

/// Decodes one data entry at `*off`, advancing the cursor past it.
pub(crate) fn decode_entry(buf: &[u8], off: &mut usize) -> Result<Entry, SsTableError> {
    let key_len = get_u32(buf, off)? as usize;
    let key = take(buf, off, key_len)?.to_vec();
    let value_len = get_u32(buf, off)? as usize;
    let value = take(buf, off, value_len)?.to_vec();
    let timestamp = get_i64(buf, off)?;
    let deleted = take(buf, off, 1)?[0] != 0;
    Ok(Entry {
        key,
        value,
        timestamp,
        deleted,
    })
}

// ------------------------------------------------------------------------------------------------
// Header / index / bloom parsing — shared by both readers
// ------------------------------------------------------------------------------------------------

/// Validates the 24-byte header and returns `(entry_count, index_offset)`.
pub(crate) fn parse_header(buf: &[u8]) -> Result<(u64, u64), SsTableError> {
    if buf.len() < HEADER_SIZE as usize {
        return Err(SsTableError::InvalidFormat(format!(
            "file too small for header: {} bytes",
            buf.len()
        )));
    }

    let mut off = 0usize;
    let magic = get_u32(buf, &mut off)?;
    if magic != MAGIC {
        return Err(SsTableError::InvalidFormat(format!(
            "bad magic 0x{magic:08x}"
        )));
    }

    let version = get_u32(buf, &mut off)?;
    if version != FORMAT_VERSION {
        return Err(SsTableError::InvalidFormat(format!(
            "unsupported format version {version}"
        )));
    }

    let entry_count = get_u64(buf, &mut off)?;
    let index_offset = get_u64(buf, &mut off)?;
    Ok((entry_count, index_offset))
}

/// Parses the sparse index and bloom block from `buf`, the file bytes
/// starting at `index_offset`.
///
/// Index offsets are validated to be ascending and inside the data
/// region `[HEADER_SIZE, index_offset)`. A missing bloom trailer
/// (legacy files) yields a filter that cannot exclude anything; a
/// present trailer must pass its CRC32 check.
pub(crate) fn parse_index_and_bloom(
    buf: &[u8],
    index_offset: u64,
) -> Result<(Vec<IndexEntry>, BloomFilter), SsTableError> {
    let mut off = 0usize;

    let count = get_u32(buf, &mut off)? as usize;
    let mut index = Vec::with_capacity(count);
    let mut prev_offset = 0u64;

    for i in 0..count {
        let key_len = get_u32(buf, &mut off)? as usize;
        let key = take(buf, &mut off, key_len)?.to_vec();
        let offset = get_u64(buf, &mut off)?;

        if offset < HEADER_SIZE || offset >= index_offset || (i > 0 && offset <= prev_offset) {
            return Err(SsTableError::InvalidFormat(format!(
                "index entry {i} points at invalid offset {offset}"
            )));
        }
        prev_offset = offset;
        index.push(IndexEntry { key, offset });
    }

    // Legacy tables end right after the index.
    if off == buf.len() {
        return Ok((index, BloomFilter::pass_all()));
    }

    let bloom_size = get_u32(buf, &mut off)? as usize;
    let bloom_bytes = take(buf, &mut off, bloom_size)?;
    let stored_crc = get_u32(buf, &mut off)?;

    let computed_crc = crc32fast::hash(bloom_bytes);
    if stored_crc != computed_crc {
        return Err(SsTableError::Integrity(format!(
            "bloom checksum mismatch: stored 0x{stored_crc:08x}, computed 0x{computed_crc:08x}"
        )));
    }

    let bloom = BloomFilter::unmarshal(bloom_bytes)
        .map_err(|err| SsTableError::InvalidFormat(err.to_string()))?;
    Ok((index, bloom))
}

/// Scans one decoded block for `key`.
///
/// `block` must hold whole entries in ascending key order. Returns as
/// soon as a key greater than the query is seen.
pub(crate) fn search_block(block: &[u8], key: &[u8]) -> Result<TableGet, SsTableError> {
    let mut off = 0usize;
    let mut scanned = 0usize;

    while off < block.len() && scanned < INDEX_INTERVAL {
        let entry = decode_entry(block, &mut off)?;
        scanned += 1;

        match entry.key.as_slice().cmp(key) {
            std::cmp::Ordering::Less => continue,
            std::cmp::Ordering::Equal => {
                return Ok(if entry.deleted {
                    TableGet::Tombstone
                } else {
                    TableGet::Found(entry)
                });
            }
            std::cmp::Ordering::Greater => return Ok(TableGet::Miss),
        }
    }

    Ok(TableGet::Miss)
}
