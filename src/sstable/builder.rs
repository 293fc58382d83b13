//! SSTable writer — builds a complete table file from entries.
//!
//! The writer sorts the input, builds a bloom filter over every key,
//! streams the data block while collecting one sparse-index entry per
//! [`INDEX_INTERVAL`] records, appends the index and bloom blocks, and
//! finally back-patches the header with the real index offset before
//! fsyncing.
//!
//! On failure the file handle is closed and the error surfaced; the
//! caller owns deletion of the partial output.

use std::fs::OpenOptions;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use crate::bloom::BloomFilter;
use crate::engine::utils::Entry;

use super::{BLOOM_FP_RATE, FORMAT_VERSION, HEADER_SIZE, INDEX_INTERVAL, MAGIC, SsTableError};

/// Builds a complete SSTable file on disk.
///
/// # Example
///
/// ```rust,ignore
/// SstWriter::new(&path).write(entries)?;
/// ```
pub struct SstWriter<P: AsRef<Path>> {
    path: P,
}

impl<P: AsRef<Path>> SstWriter<P> {
    /// Creates a writer targeting the given output path.
    pub fn new(path: P) -> Self {
        Self { path }
    }

    /// Sorts `entries` by key and writes the table.
    ///
    /// Duplicate keys must not occur — flush inputs hold one entry per
    /// key and compaction inputs are deduplicated. An empty input
    /// produces a valid zero-entry table.
    ///
    /// # Errors
    ///
    /// - [`SsTableError::OffsetOverflow`] if the running file offset
    ///   would exceed `u64`.
    /// - I/O errors from writing, seeking, or syncing.
    pub fn write(self, mut entries: Vec<Entry>) -> Result<(), SsTableError> {
        entries.sort_by(|a, b| a.key.cmp(&b.key));

        let mut bloom = BloomFilter::new(entries.len(), BLOOM_FP_RATE);
        for entry in &entries {
            bloom.add(&entry.key);
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(self.path.as_ref())?;
        let mut writer = BufWriter::new(file);

        // 1. Header with a placeholder index offset — patched after the
        //    data block length is known.
        write_header(&mut writer, entries.len() as u64, 0)?;

        // 2. Data block, collecting one index entry per INDEX_INTERVAL
        //    records.
        let mut offset = HEADER_SIZE;
        let mut index: Vec<(Vec<u8>, u64)> = Vec::new();

        for (i, entry) in entries.iter().enumerate() {
            if i % INDEX_INTERVAL == 0 {
                index.push((entry.key.clone(), offset));
            }

            writer.write_all(&(entry.key.len() as u32).to_le_bytes())?;
            writer.write_all(&entry.key)?;
            writer.write_all(&(entry.value.len() as u32).to_le_bytes())?;
            writer.write_all(&entry.value)?;
            writer.write_all(&entry.timestamp.to_le_bytes())?;
            writer.write_all(&[entry.deleted as u8])?;

            offset = offset
                .checked_add(entry.encoded_len() as u64)
                .ok_or(SsTableError::OffsetOverflow)?;
        }

        let index_offset = offset;

        // 3. Sparse index.
        writer.write_all(&(index.len() as u32).to_le_bytes())?;
        for (key, entry_offset) in &index {
            writer.write_all(&(key.len() as u32).to_le_bytes())?;
            writer.write_all(key)?;
            writer.write_all(&entry_offset.to_le_bytes())?;
        }

        // 4. Bloom block and its CRC32 footer.
        let bloom_bytes = bloom.marshal();
        writer.write_all(&(bloom_bytes.len() as u32).to_le_bytes())?;
        writer.write_all(&bloom_bytes)?;
        writer.write_all(&crc32fast::hash(&bloom_bytes).to_le_bytes())?;

        writer.flush()?;

        // 5. Back-patch the header with the real index offset, then
        //    make the file durable.
        let mut file = writer
            .into_inner()
            .map_err(|err| SsTableError::Io(err.into_error()))?;
        file.seek(SeekFrom::Start(0))?;
        write_header(&mut file, entries.len() as u64, index_offset)?;
        file.sync_all()?;

        Ok(())
    }
}

fn write_header(
    writer: &mut impl Write,
    entry_count: u64,
    index_offset: u64,
) -> Result<(), SsTableError> {
    writer.write_all(&MAGIC.to_le_bytes())?;
    writer.write_all(&FORMAT_VERSION.to_le_bytes())?;
    writer.write_all(&entry_count.to_le_bytes())?;
    writer.write_all(&index_offset.to_le_bytes())?;
    Ok(())
}
