//! Seek-based SSTable reader.
//!
//! Opens the file, validates the header, and keeps the sparse index
//! and bloom filter in memory. Data access goes through positional
//! reads on a single shared file handle; only the block that may hold
//! the key is read per lookup.
//!
//! This reader is the portable fallback for [`MappedSsTable`]
//! (`super::mapped`) and shares its [`Table`] contract.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use crate::bloom::BloomFilter;
use crate::engine::utils::Entry;

use super::{
    HEADER_SIZE, IndexEntry, SsTableError, Table, TableGet, TableMeta, block_bounds, decode_entry,
    find_block, parse_header, parse_index_and_bloom, search_block,
};

/// An immutable sorted table read through positional file I/O.
#[derive(Debug)]
pub struct SsTableReader {
    meta: TableMeta,
    entry_count: u64,
    index_offset: u64,
    index: Vec<IndexEntry>,
    bloom: BloomFilter,
    file: Mutex<File>,
}

impl SsTableReader {
    /// Opens and validates a table file.
    ///
    /// Reads the header, the sparse index, and the bloom block into
    /// memory. A table whose bloom trailer is absent (legacy format)
    /// opens with a filter that cannot exclude anything; a corrupt
    /// header or checksum rejects the table.
    pub fn open(path: impl AsRef<Path>, level: u32, id: u64) -> Result<Self, SsTableError> {
        let path = path.as_ref();
        let mut file = File::open(path)?;
        let file_size = file.metadata()?.len();

        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)?;
        let (entry_count, index_offset) = parse_header(&header)?;

        if index_offset < HEADER_SIZE || index_offset > file_size {
            return Err(SsTableError::InvalidFormat(format!(
                "index offset {index_offset} outside file of {file_size} bytes"
            )));
        }

        let mut tail = Vec::with_capacity((file_size - index_offset) as usize);
        file.seek(SeekFrom::Start(index_offset))?;
        file.read_to_end(&mut tail)?;
        let (index, bloom) = parse_index_and_bloom(&tail, index_offset)?;

        if index.is_empty() != (entry_count == 0) {
            return Err(SsTableError::InvalidFormat(format!(
                "index has {} entries for an entry count of {entry_count}",
                index.len()
            )));
        }

        Ok(Self {
            meta: TableMeta {
                level,
                id,
                path: path.to_path_buf(),
                file_size,
            },
            entry_count,
            index_offset,
            index,
            bloom,
            file: Mutex::new(file),
        })
    }

    /// Reads `len` bytes at `offset` through the shared handle.
    fn read_range(&self, offset: u64, len: usize) -> Result<Vec<u8>, SsTableError> {
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn read_block(&self, block_idx: usize) -> Result<Vec<u8>, SsTableError> {
        let (start, end) = block_bounds(&self.index, self.index_offset, block_idx);
        self.read_range(start, (end - start) as usize)
    }
}

impl Table for SsTableReader {
    fn meta(&self) -> &TableMeta {
        &self.meta
    }

    fn entry_count(&self) -> u64 {
        self.entry_count
    }

    fn get(&self, key: &[u8]) -> Result<TableGet, SsTableError> {
        if self.entry_count == 0 || !self.bloom.may_contain(key) {
            return Ok(TableGet::Miss);
        }

        let Some(block_idx) = find_block(&self.index, key) else {
            return Ok(TableGet::Miss);
        };

        let block = self.read_block(block_idx)?;
        search_block(&block, key)
    }

    fn scan_raw(&self, start: &[u8], end: &[u8]) -> Result<Vec<Entry>, SsTableError> {
        if start >= end || self.index.is_empty() {
            return Ok(Vec::new());
        }

        let first_block = find_block(&self.index, start).unwrap_or(0);
        let mut results = Vec::new();

        for block_idx in first_block..self.index.len() {
            let block = self.read_block(block_idx)?;
            let mut off = 0usize;

            while off < block.len() {
                let entry = decode_entry(&block, &mut off)?;
                if entry.key.as_slice() < start {
                    continue;
                }
                if entry.key.as_slice() >= end {
                    return Ok(results);
                }
                results.push(entry);
            }
        }

        Ok(results)
    }

    fn entries(&self) -> Result<Vec<Entry>, SsTableError> {
        if self.entry_count == 0 {
            return Ok(Vec::new());
        }

        let data = self.read_range(HEADER_SIZE, (self.index_offset - HEADER_SIZE) as usize)?;
        let mut results = Vec::with_capacity(self.entry_count as usize);
        let mut off = 0usize;

        while off < data.len() {
            results.push(decode_entry(&data, &mut off)?);
        }

        Ok(results)
    }
}
