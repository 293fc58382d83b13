//! Memory-mapped SSTable reader.
//!
//! Maps the whole table file and serves lookups and scans straight
//! from the mapping, avoiding per-read syscalls. Shares the [`Table`]
//! contract with the seek-based reader; [`super::open_table`] falls
//! back to the latter when mapping fails.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use crate::bloom::BloomFilter;
use crate::engine::utils::Entry;

use super::{
    HEADER_SIZE, IndexEntry, SsTableError, Table, TableGet, TableMeta, block_bounds, decode_entry,
    find_block, parse_header, parse_index_and_bloom, search_block,
};

/// An immutable sorted table served from a read-only memory mapping.
#[derive(Debug)]
pub struct MappedSsTable {
    meta: TableMeta,
    entry_count: u64,
    index_offset: u64,
    index: Vec<IndexEntry>,
    bloom: BloomFilter,
    mmap: Mmap,
}

impl MappedSsTable {
    /// Opens and validates a table file through a read-only mapping.
    ///
    /// # Safety
    ///
    /// Uses `unsafe { Mmap::map(..) }`, which is sound here because
    /// table files are immutable after creation, the mapping is
    /// read-only, and every block boundary is validated before
    /// slicing.
    pub fn open(path: impl AsRef<Path>, level: u32, id: u64) -> Result<Self, SsTableError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        let file_size = mmap.len() as u64;

        let (entry_count, index_offset) = parse_header(&mmap)?;

        if index_offset < HEADER_SIZE || index_offset > file_size {
            return Err(SsTableError::InvalidFormat(format!(
                "index offset {index_offset} outside file of {file_size} bytes"
            )));
        }

        let (index, bloom) = parse_index_and_bloom(&mmap[index_offset as usize..], index_offset)?;

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
            mmap,
        })
    }

    fn block(&self, block_idx: usize) -> &[u8] {
        let (start, end) = block_bounds(&self.index, self.index_offset, block_idx);
        &self.mmap[start as usize..end as usize]
    }
}

impl Table for MappedSsTable {
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

        search_block(self.block(block_idx), key)
    }

    fn scan_raw(&self, start: &[u8], end: &[u8]) -> Result<Vec<Entry>, SsTableError> {
        if start >= end || self.index.is_empty() {
            return Ok(Vec::new());
        }

        let first_block = find_block(&self.index, start).unwrap_or(0);
        let mut results = Vec::new();

        for block_idx in first_block..self.index.len() {
            let block = self.block(block_idx);
            let mut off = 0usize;

            while off < block.len() {
                let entry = decode_entry(block, &mut off)?;
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

        let data = &self.mmap[HEADER_SIZE as usize..self.index_offset as usize];
        let mut results = Vec::with_capacity(self.entry_count as usize);
        let mut off = 0usize;

        while off < data.len() {
            results.push(decode_entry(data, &mut off)?);
        }

        Ok(results)
    }
}
