use crate::compaction::LeveledOptions;
use crate::engine::{Engine, EngineConfig};
use tracing_subscriber::EnvFilter;

/// Initialize a tracing subscriber controlled by `RUST_LOG`.
/// Safe to call multiple times — only the first call takes effect.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Large MemTable, no background workers: nothing flushes unless the
/// test says so.
pub fn manual_config() -> EngineConfig {
    init_tracing();
    EngineConfig {
        mem_table_size: 1024 * 1024,
        cache_capacity: 1024,
        compaction: LeveledOptions::default(),
        enable_auto_compaction: false,
    }
}

/// Small MemTable, still no background workers: tests drive flushes
/// deterministically via `sync`.
pub fn small_buffer_config() -> EngineConfig {
    init_tracing();
    EngineConfig {
        mem_table_size: 4 * 1024,
        cache_capacity: 1024,
        compaction: LeveledOptions::default(),
        enable_auto_compaction: false,
    }
}

/// Background workers enabled with a small MemTable, for end-to-end
/// flush/compaction behavior.
pub fn auto_config() -> EngineConfig {
    init_tracing();
    EngineConfig {
        mem_table_size: 4 * 1024,
        cache_capacity: 1024,
        compaction: LeveledOptions::default(),
        enable_auto_compaction: true,
    }
}

pub fn key(i: usize) -> Vec<u8> {
    format!("key-{i:06}").into_bytes()
}

pub fn value(i: usize) -> Vec<u8> {
    format!("value-{i:06}").into_bytes()
}

/// Puts `count` numbered keys.
pub fn fill(engine: &Engine, count: usize) {
    for i in 0..count {
        engine.put(key(i), value(i)).expect("put");
    }
}

/// Puts `count` numbered keys, syncing every `batch` puts so the data
/// lands in multiple L0 tables.
pub fn fill_in_batches(engine: &Engine, count: usize, batch: usize) {
    for i in 0..count {
        engine.put(key(i), value(i)).expect("put");
        if (i + 1) % batch == 0 {
            engine.sync().expect("sync");
        }
    }
    engine.sync().expect("sync");
}
