//! Basic put/get/delete behavior.

#[cfg(test)]
mod tests {
    use crate::memtable::{Memtable, MemtableGet};

    #[test]
    fn put_and_get() {
        let table = Memtable::new(1024);
        table.put(b"key1".to_vec(), b"value1".to_vec());

        assert_eq!(
            table.get(b"key1"),
            MemtableGet::Value(b"value1".to_vec())
        );
    }

    #[test]
    fn get_missing_key() {
        let table = Memtable::new(1024);
        assert_eq!(table.get(b"ghost"), MemtableGet::NotFound);
    }

    #[test]
    fn put_replaces_existing_entry() {
        let table = Memtable::new(1024);
        table.put(b"k".to_vec(), b"v1".to_vec());
        table.put(b"k".to_vec(), b"v2".to_vec());

        assert_eq!(table.get(b"k"), MemtableGet::Value(b"v2".to_vec()));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn delete_existing_key_leaves_tombstone() {
        let table = Memtable::new(1024);
        table.put(b"k".to_vec(), b"v".to_vec());
        table.delete(b"k".to_vec());

        assert_eq!(table.get(b"k"), MemtableGet::Tombstone);
        assert_eq!(table.len(), 1, "tombstone still occupies the key");
    }

    #[test]
    fn delete_absent_key_inserts_tombstone() {
        let table = Memtable::new(1024);
        table.delete(b"never-written".to_vec());

        assert_eq!(table.get(b"never-written"), MemtableGet::Tombstone);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn put_after_delete_resurrects_key() {
        let table = Memtable::new(1024);
        table.put(b"k".to_vec(), b"v1".to_vec());
        table.delete(b"k".to_vec());
        table.put(b"k".to_vec(), b"v2".to_vec());

        assert_eq!(table.get(b"k"), MemtableGet::Value(b"v2".to_vec()));
    }

    #[test]
    fn timestamps_increase_across_updates() {
        let table = Memtable::new(1024);
        table.put(b"k".to_vec(), b"v1".to_vec());
        let first = table.entries()[0].timestamp;
        table.put(b"k".to_vec(), b"v2".to_vec());
        let second = table.entries()[0].timestamp;

        assert!(second > first);
    }

    #[test]
    fn entries_are_key_ordered_and_include_tombstones() {
        let table = Memtable::new(1024);
        table.put(b"banana".to_vec(), b"1".to_vec());
        table.put(b"apple".to_vec(), b"2".to_vec());
        table.delete(b"cherry".to_vec());

        let entries = table.entries();
        let keys: Vec<_> = entries.iter().map(|e| e.key.clone()).collect();
        assert_eq!(
            keys,
            vec![b"apple".to_vec(), b"banana".to_vec(), b"cherry".to_vec()]
        );
        assert!(entries[2].deleted);
    }

    #[test]
    fn clear_empties_the_table() {
        let table = Memtable::new(1024);
        table.put(b"k".to_vec(), b"v".to_vec());
        table.clear();

        assert!(table.is_empty());
        assert_eq!(table.size(), 0);
        assert_eq!(table.get(b"k"), MemtableGet::NotFound);
    }
}
