//! Statistics counters and snapshots.

#[cfg(test)]
mod tests {
    use crate::engine::Engine;
    use crate::engine::tests::helpers::*;
    use tempfile::TempDir;

    #[test]
    fn counters_track_operations() {
        let tmp = TempDir::new().unwrap();
        let engine = Engine::open(tmp.path(), manual_config()).unwrap();

        fill(&engine, 10);
        engine.delete(key(0)).unwrap();
        for i in 0..5 {
            engine.get(&key(i)).unwrap();
        }

        let stats = engine.stats();
        assert_eq!(stats.writes, 11, "10 puts + 1 delete");
        assert_eq!(stats.reads, 5);
        assert_eq!(stats.flushes, 0);
        assert_eq!(stats.compactions, 0);
        assert!(stats.memtable_size_bytes > 0);
        engine.close().unwrap();
    }

    #[test]
    fn flush_and_compaction_counters() {
        let tmp = TempDir::new().unwrap();
        let engine = Engine::open(tmp.path(), manual_config()).unwrap();

        fill_in_batches(&engine, 40, 10);
        let after_flushes = engine.stats();
        assert_eq!(after_flushes.flushes, 4);
        assert!(after_flushes.bytes_written > 0);

        engine.compact().unwrap();
        let after_compact = engine.stats();
        assert_eq!(after_compact.compactions, 1);
        assert!(after_compact.bytes_written > after_flushes.bytes_written);
        engine.close().unwrap();
    }

    #[test]
    fn bytes_read_counts_disk_hits() {
        let tmp = TempDir::new().unwrap();
        let engine = Engine::open(tmp.path(), manual_config()).unwrap();

        fill(&engine, 10);
        engine.sync().unwrap();

        assert_eq!(engine.stats().bytes_read, 0);
        engine.get(&key(3)).unwrap();
        assert!(engine.stats().bytes_read > 0);
        engine.close().unwrap();
    }

    #[test]
    fn table_counts_in_snapshot() {
        let tmp = TempDir::new().unwrap();
        let engine = Engine::open(tmp.path(), manual_config()).unwrap();

        fill_in_batches(&engine, 30, 10);
        let stats = engine.stats();
        assert_eq!(stats.level0_count, 3);
        assert_eq!(stats.sstable_count, 3);
        engine.close().unwrap();
    }

    #[test]
    fn cache_stats_reflect_hits() {
        let tmp = TempDir::new().unwrap();
        let engine = Engine::open(tmp.path(), manual_config()).unwrap();

        engine.put(b"k".to_vec(), b"v".to_vec()).unwrap();
        engine.get(b"k").unwrap(); // miss, then fills the cache
        engine.get(b"k").unwrap(); // hit

        let cache = engine.cache_stats();
        assert!(cache.hits >= 1);
        assert!(cache.misses >= 1);
        assert!(cache.hit_rate > 0.0);
        engine.close().unwrap();
    }

    #[test]
    fn print_stats_does_not_panic() {
        let tmp = TempDir::new().unwrap();
        let engine = Engine::open(tmp.path(), manual_config()).unwrap();
        fill(&engine, 5);
        engine.print_stats();
        engine.close().unwrap();
    }
}
