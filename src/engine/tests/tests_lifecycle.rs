//! Open/close lifecycle, persistence across reopen, corrupt files.

#[cfg(test)]
mod tests {
    use crate::engine::{Engine, EngineError};
    use crate::engine::tests::helpers::*;
    use tempfile::TempDir;

    #[test]
    fn close_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let engine = Engine::open(tmp.path(), manual_config()).unwrap();

        engine.close().unwrap();
        engine.close().unwrap();
    }

    #[test]
    fn operations_after_close_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let engine = Engine::open(tmp.path(), manual_config()).unwrap();
        engine.close().unwrap();

        assert!(matches!(
            engine.put(b"k".to_vec(), b"v".to_vec()),
            Err(EngineError::Closed)
        ));
        assert!(matches!(
            engine.delete(b"k".to_vec()),
            Err(EngineError::Closed)
        ));
        assert!(matches!(engine.get(b"k"), Err(EngineError::Closed)));
        assert!(matches!(engine.scan(b"a", b"z"), Err(EngineError::Closed)));
        assert!(matches!(engine.sync(), Err(EngineError::Closed)));
        assert!(matches!(engine.compact(), Err(EngineError::Closed)));
    }

    #[test]
    fn close_flushes_buffered_writes() {
        let tmp = TempDir::new().unwrap();
        let engine = Engine::open(tmp.path(), manual_config()).unwrap();

        fill(&engine, 20);
        engine.close().unwrap();

        // All data must be on disk now.
        let reopened = Engine::open(tmp.path(), manual_config()).unwrap();
        for i in 0..20 {
            assert_eq!(reopened.get(&key(i)).unwrap(), Some(value(i)));
        }
        reopened.close().unwrap();
    }

    #[test]
    fn reopen_preserves_all_state() {
        let tmp = TempDir::new().unwrap();

        {
            let engine = Engine::open(tmp.path(), small_buffer_config()).unwrap();
            fill_in_batches(&engine, 100, 25);
            for i in 0..10 {
                engine.delete(key(i)).unwrap();
            }
            engine.close().unwrap();
        }

        let engine = Engine::open(tmp.path(), small_buffer_config()).unwrap();
        for i in 0..10 {
            assert_eq!(engine.get(&key(i)).unwrap(), None, "deleted key {i}");
        }
        for i in 10..100 {
            assert_eq!(engine.get(&key(i)).unwrap(), Some(value(i)), "key {i}");
        }
        engine.close().unwrap();
    }

    #[test]
    fn reopen_after_compaction() {
        let tmp = TempDir::new().unwrap();

        {
            let engine = Engine::open(tmp.path(), manual_config()).unwrap();
            fill_in_batches(&engine, 40, 10);
            engine.compact().unwrap();
            engine.close().unwrap();
        }

        let engine = Engine::open(tmp.path(), manual_config()).unwrap();
        assert_eq!(engine.stats().level0_count, 0);
        assert!(engine.stats().sstable_count >= 1);
        for i in 0..40 {
            assert_eq!(engine.get(&key(i)).unwrap(), Some(value(i)));
        }
        engine.close().unwrap();
    }

    #[test]
    fn malformed_file_names_are_ignored() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("junk.sst"), b"not a table").unwrap();
        std::fs::write(tmp.path().join("L0-notanid.sst"), b"also junk").unwrap();

        let engine = Engine::open(tmp.path(), manual_config()).unwrap();
        assert_eq!(engine.stats().sstable_count, 0);
        engine.close().unwrap();
    }

    #[test]
    fn corrupt_table_refuses_open() {
        let tmp = TempDir::new().unwrap();

        {
            let engine = Engine::open(tmp.path(), manual_config()).unwrap();
            fill(&engine, 10);
            engine.close().unwrap();
        }

        // Smash the magic of the only table file.
        let table_path = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .find(|path| path.extension().is_some_and(|ext| ext == "sst"))
            .expect("one table on disk");
        let mut bytes = std::fs::read(&table_path).unwrap();
        bytes[0..4].copy_from_slice(b"XXXX");
        std::fs::write(&table_path, bytes).unwrap();

        assert!(Engine::open(tmp.path(), manual_config()).is_err());
    }

    #[test]
    fn engine_handles_are_cloneable() {
        let tmp = TempDir::new().unwrap();
        let engine = Engine::open(tmp.path(), manual_config()).unwrap();
        let clone = engine.clone();

        engine.put(b"k".to_vec(), b"v".to_vec()).unwrap();
        assert_eq!(clone.get(b"k").unwrap(), Some(b"v".to_vec()));

        clone.close().unwrap();
        assert!(matches!(
            engine.put(b"x".to_vec(), b"y".to_vec()),
            Err(EngineError::Closed)
        ));
    }

    #[test]
    fn open_creates_missing_directory() {
        let tmp = TempDir::new().unwrap();
        let nested = tmp.path().join("a").join("b");
        let engine = Engine::open(&nested, manual_config()).unwrap();
        engine.put(b"k".to_vec(), b"v".to_vec()).unwrap();
        engine.close().unwrap();
        assert!(nested.is_dir());
    }
}
