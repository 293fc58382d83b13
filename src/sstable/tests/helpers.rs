use std::path::Path;

use crate::engine::utils::Entry;
use crate::sstable::{MappedSsTable, SsTableReader, SstWriter, Table};

/// A live entry with a deterministic timestamp.
pub fn entry(key: &str, value: &str, ts: i64) -> Entry {
    Entry {
        key: key.as_bytes().to_vec(),
        value: value.as_bytes().to_vec(),
        timestamp: ts,
        deleted: false,
    }
}

/// A tombstone with a deterministic timestamp.
pub fn tombstone(key: &str, ts: i64) -> Entry {
    Entry {
        key: key.as_bytes().to_vec(),
        value: Vec::new(),
        timestamp: ts,
        deleted: true,
    }
}

/// `count` entries keyed `key-000000 ..`, values `value-<i>`.
pub fn numbered_entries(count: usize) -> Vec<Entry> {
    (0..count)
        .map(|i| entry(&format!("key-{i:06}"), &format!("value-{i}"), i as i64 + 1))
        .collect()
}

/// Writes `entries` to `path` and opens it with both reader variants.
pub fn write_and_open(path: &Path, entries: Vec<Entry>) -> (MappedSsTable, SsTableReader) {
    SstWriter::new(path).write(entries).expect("write table");
    let mapped = MappedSsTable::open(path, 0, 1).expect("open mapped");
    let seek = SsTableReader::open(path, 0, 1).expect("open seek");
    (mapped, seek)
}

/// Runs `check` against both reader variants.
pub fn for_both_readers(path: &Path, entries: Vec<Entry>, check: impl Fn(&dyn Table)) {
    let (mapped, seek) = write_and_open(path, entries);
    check(&mapped);
    check(&seek);
}
