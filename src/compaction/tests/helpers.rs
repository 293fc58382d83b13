use std::path::Path;
use std::sync::Arc;

use crate::engine::utils::Entry;
use crate::sstable::{SstWriter, Table, open_table, table_file_name};

/// Writes the given `(key, value, timestamp)` triples as a table file
/// and opens it as a shared handle.
pub fn build_table(
    dir: &Path,
    level: u32,
    id: u64,
    rows: &[(&str, &str, i64)],
) -> Arc<dyn Table> {
    let entries: Vec<Entry> = rows
        .iter()
        .map(|(key, value, ts)| Entry {
            key: key.as_bytes().to_vec(),
            value: value.as_bytes().to_vec(),
            timestamp: *ts,
            deleted: false,
        })
        .collect();
    write_table(dir, level, id, entries)
}

/// Like [`build_table`] but marks every row with an empty value as a
/// tombstone.
pub fn build_table_with_tombstones(
    dir: &Path,
    level: u32,
    id: u64,
    rows: &[(&str, Option<&str>, i64)],
) -> Arc<dyn Table> {
    let entries: Vec<Entry> = rows
        .iter()
        .map(|(key, value, ts)| match value {
            Some(value) => Entry {
                key: key.as_bytes().to_vec(),
                value: value.as_bytes().to_vec(),
                timestamp: *ts,
                deleted: false,
            },
            None => Entry {
                key: key.as_bytes().to_vec(),
                value: Vec::new(),
                timestamp: *ts,
                deleted: true,
            },
        })
        .collect();
    write_table(dir, level, id, entries)
}

fn write_table(dir: &Path, level: u32, id: u64, entries: Vec<Entry>) -> Arc<dyn Table> {
    let path = dir.join(table_file_name(level, id));
    SstWriter::new(&path).write(entries).expect("write table");
    open_table(&path, level, id).expect("open table")
}

/// A table of `count` entries with `value_len`-byte values, for
/// size-driven strategy tests.
pub fn build_sized_table(
    dir: &Path,
    level: u32,
    id: u64,
    count: usize,
    value_len: usize,
) -> Arc<dyn Table> {
    let entries: Vec<Entry> = (0..count)
        .map(|i| Entry {
            key: format!("L{level}-key-{i:06}").into_bytes(),
            value: vec![b'x'; value_len],
            timestamp: i as i64 + 1,
            deleted: false,
        })
        .collect();
    write_table(dir, level, id, entries)
}
