//! MemTable Tests
//!
//! Tests verify:
//! - Basic put/get/delete operations
//! - Size tracking
//! - Tombstone handling
//! - Sorted iteration and inclusive range scans
//! - Layer merging (newer entries win)
//! - Concurrent access patterns

use tickvault::memtable::{MemTable, MemTableEntry};

// =============================================================================
// Helper Functions
// =============================================================================

fn value(bytes: &[u8]) -> Option<MemTableEntry> {
    Some(MemTableEntry::Value(bytes.to_vec()))
}

fn table_with(keys: &[&[u8]]) -> MemTable {
    let memtable = MemTable::new();
    for key in keys {
        memtable.put(key.to_vec(), key.to_vec());
    }
    memtable
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_new_memtable_is_empty() {
    let memtable = MemTable::new();
    assert_eq!(memtable.entry_count(), 0);
    assert_eq!(memtable.size(), 0);
    assert!(memtable.is_empty());
}

#[test]
fn test_put_and_get() {
    let memtable = MemTable::new();

    memtable.put(b"key1".to_vec(), b"value1".to_vec());

    assert_eq!(memtable.get(b"key1"), value(b"value1"));
    assert_eq!(memtable.get(b"nonexistent"), None);
}

#[test]
fn test_put_overwrites_existing() {
    let memtable = MemTable::new();

    memtable.put(b"key1".to_vec(), b"value1".to_vec());
    memtable.put(b"key1".to_vec(), b"value2".to_vec());

    assert_eq!(memtable.entry_count(), 1);
    assert_eq!(memtable.get(b"key1"), value(b"value2"));
}

// =============================================================================
// Delete / Tombstone Tests
// =============================================================================

#[test]
fn test_delete_creates_tombstone() {
    let memtable = MemTable::new();

    memtable.put(b"key1".to_vec(), b"value1".to_vec());
    memtable.delete(b"key1".to_vec());

    let entry = memtable.get(b"key1").unwrap();
    assert!(entry.is_tombstone());
    assert_eq!(entry.into_value(), None);
    assert_eq!(memtable.entry_count(), 1); // Tombstone still counts as entry
}

#[test]
fn test_delete_nonexistent_key() {
    let memtable = MemTable::new();

    memtable.delete(b"nonexistent".to_vec());

    assert_eq!(memtable.get(b"nonexistent"), Some(MemTableEntry::Tombstone));
    assert_eq!(memtable.entry_count(), 1);
}

#[test]
fn test_put_after_delete() {
    let memtable = MemTable::new();

    memtable.put(b"key1".to_vec(), b"value1".to_vec());
    memtable.delete(b"key1".to_vec());
    memtable.put(b"key1".to_vec(), b"value2".to_vec());

    assert_eq!(memtable.get(b"key1"), value(b"value2"));
}

// =============================================================================
// Size Tracking Tests
// =============================================================================

#[test]
fn test_size_tracking_put_returns_new_size() {
    let memtable = MemTable::new();

    let size = memtable.put(b"key".to_vec(), b"value".to_vec());

    assert_eq!(size, b"key".len() + b"value".len());
    assert_eq!(memtable.size(), size);
}

#[test]
fn test_size_tracking_overwrite() {
    let memtable = MemTable::new();

    memtable.put(b"key".to_vec(), b"short".to_vec());
    let size_after_first = memtable.size();

    memtable.put(b"key".to_vec(), b"much_longer_value".to_vec());
    let size_after_second = memtable.size();

    assert_eq!(size_after_first, b"key".len() + b"short".len());
    assert_eq!(size_after_second, b"key".len() + b"much_longer_value".len());
}

#[test]
fn test_size_tracking_delete() {
    let memtable = MemTable::new();

    memtable.put(b"key".to_vec(), b"value".to_vec());
    let size_after_delete = memtable.delete(b"key".to_vec());

    assert_eq!(size_after_delete, b"key".len()); // Tombstone = just key
}

#[test]
fn test_should_flush() {
    let memtable = MemTable::new();

    memtable.put(b"key".to_vec(), b"value".to_vec());

    let size = memtable.size();
    assert!(!memtable.should_flush(1000));
    assert!(memtable.should_flush(size - 1));
    assert!(memtable.should_flush(size));
}

// =============================================================================
// Iteration Tests
// =============================================================================

#[test]
fn test_iter_sorted_order() {
    let memtable = MemTable::new();

    // Insert in random order
    memtable.put(b"cherry".to_vec(), b"3".to_vec());
    memtable.put(b"apple".to_vec(), b"1".to_vec());
    memtable.put(b"banana".to_vec(), b"2".to_vec());

    let entries: Vec<_> = memtable.iter().collect();

    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].0, b"apple"); // Sorted!
    assert_eq!(entries[1].0, b"banana");
    assert_eq!(entries[2].0, b"cherry");
}

#[test]
fn test_iter_includes_tombstones() {
    let memtable = MemTable::new();

    memtable.put(b"key1".to_vec(), b"value1".to_vec());
    memtable.delete(b"key2".to_vec());
    memtable.put(b"key3".to_vec(), b"value3".to_vec());

    let entries: Vec<_> = memtable.iter().collect();

    assert_eq!(entries.len(), 3);
    assert!(matches!(entries[0].1, MemTableEntry::Value(_)));
    assert!(matches!(entries[1].1, MemTableEntry::Tombstone));
    assert!(matches!(entries[2].1, MemTableEntry::Value(_)));
}

#[test]
fn test_iter_is_a_snapshot() {
    let memtable = MemTable::new();
    memtable.put(b"key".to_vec(), b"value".to_vec());

    let mut entries = memtable.iter();

    // Modify memtable after taking the iterator
    memtable.put(b"key".to_vec(), b"modified".to_vec());
    memtable.put(b"later".to_vec(), b"x".to_vec());

    assert_eq!(
        entries.next(),
        Some((b"key".to_vec(), MemTableEntry::Value(b"value".to_vec())))
    );
    assert_eq!(entries.next(), None);
}

// =============================================================================
// Range Tests
// =============================================================================

#[test]
fn test_range_is_inclusive() {
    let memtable = table_with(&[b"a", b"b", b"c", b"d"]);

    let keys: Vec<Vec<u8>> = memtable
        .range(b"b", b"c")
        .into_iter()
        .map(|(k, _)| k)
        .collect();

    assert_eq!(keys, vec![b"b".to_vec(), b"c".to_vec()]);
}

#[test]
fn test_range_inverted_bounds_is_empty() {
    let memtable = table_with(&[b"a", b"b"]);

    assert!(memtable.range(b"b", b"a").is_empty());
    assert!(memtable.range_keys(b"b", b"a").is_empty());
}

#[test]
fn test_range_keys_reports_tombstones() {
    let memtable = table_with(&[b"a", b"c"]);
    memtable.delete(b"b".to_vec());

    let keys = memtable.range_keys(b"a", b"z");

    assert_eq!(
        keys,
        vec![
            (b"a".to_vec(), false),
            (b"b".to_vec(), true),
            (b"c".to_vec(), false),
        ]
    );
}

#[test]
fn test_first_key_seeks_past_start() {
    let memtable = table_with(&[b"a", b"c"]);
    memtable.delete(b"d".to_vec());

    assert_eq!(memtable.first_key(b""), Some((b"a".to_vec(), false)));
    assert_eq!(memtable.first_key(b"b"), Some((b"c".to_vec(), false)));
    assert_eq!(memtable.first_key(b"c\0"), Some((b"d".to_vec(), true)));
    assert_eq!(memtable.first_key(b"e"), None);
}

// =============================================================================
// Merge / Clear Tests
// =============================================================================

#[test]
fn test_merge_from_newer_wins() {
    let older = MemTable::new();
    older.put(b"k1".to_vec(), b"old".to_vec());
    older.put(b"k2".to_vec(), b"old".to_vec());

    let newer = MemTable::new();
    newer.put(b"k1".to_vec(), b"new".to_vec());
    newer.delete(b"k2".to_vec());
    newer.put(b"k3".to_vec(), b"new".to_vec());

    older.merge_from(&newer);

    assert_eq!(older.get(b"k1"), value(b"new"));
    assert_eq!(older.get(b"k2"), Some(MemTableEntry::Tombstone));
    assert_eq!(older.get(b"k3"), value(b"new"));
    assert_eq!(older.entry_count(), 3);
}

#[test]
fn test_clear() {
    let memtable = table_with(&[b"key1", b"key2"]);
    assert!(memtable.size() > 0);

    memtable.clear();

    assert_eq!(memtable.entry_count(), 0);
    assert_eq!(memtable.size(), 0);
    assert!(memtable.is_empty());
    assert_eq!(memtable.get(b"key1"), None);
}

// =============================================================================
// Edge Cases
// =============================================================================

#[test]
fn test_empty_key_and_value() {
    let memtable = MemTable::new();

    memtable.put(vec![], vec![]);

    assert_eq!(memtable.get(&[]), Some(MemTableEntry::Value(vec![])));
}

#[test]
fn test_many_entries_sorted() {
    let memtable = MemTable::new();

    for i in (0..1000).rev() {
        let key = format!("key{:04}", i).into_bytes();
        let value = format!("value{}", i).into_bytes();
        memtable.put(key, value);
    }

    assert_eq!(memtable.entry_count(), 1000);

    let entries: Vec<_> = memtable.iter().collect();
    assert!(entries.windows(2).all(|w| w[0].0 < w[1].0));
}

// =============================================================================
// Concurrent Access Tests (Basic)
// =============================================================================

#[test]
fn test_concurrent_reads() {
    use std::sync::Arc;
    use std::thread;

    let memtable = Arc::new(MemTable::new());
    memtable.put(b"key".to_vec(), b"value".to_vec());

    let mut handles = vec![];

    for _ in 0..10 {
        let mt = Arc::clone(&memtable);
        let handle = thread::spawn(move || {
            for _ in 0..100 {
                assert_eq!(mt.get(b"key"), Some(MemTableEntry::Value(b"value".to_vec())));
            }
        });
        handles.push(handle);
    }

    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_concurrent_writes() {
    use std::sync::Arc;
    use std::thread;

    let memtable = Arc::new(MemTable::new());

    let mut handles = vec![];

    for i in 0..10 {
        let mt = Arc::clone(&memtable);
        let handle = thread::spawn(move || {
            for j in 0..10 {
                let key = format!("key{}_{}", i, j).into_bytes();
                let value = format!("value{}_{}", i, j).into_bytes();
                mt.put(key, value);
            }
        });
        handles.push(handle);
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(memtable.entry_count(), 100);
    let expected: usize = memtable
        .iter()
        .map(|(k, v)| k.len() + v.into_value().map_or(0, |v| v.len()))
        .sum();
    assert_eq!(memtable.size(), expected);
}
