//! Tests for the transactional Store
//!
//! These tests verify:
//! - Commits become visible to snapshots taken afterwards only
//! - Recovery of committed data from the WAL after an unclean shutdown
//! - Flush and compaction triggers
//! - Open semantics (create vs. existing database)

use std::path::PathBuf;
use tempfile::TempDir;
use tickvault::config::Config;
use tickvault::memtable::MemTable;
use tickvault::store::Store;
use tickvault::wal::WalRecovery;
use tickvault::TickError;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_store() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("db");
    (temp_dir, path)
}

fn open_store(path: &PathBuf) -> Store {
    Store::open(Config::builder().data_dir(path).build()).unwrap()
}

fn writes(entries: &[(&[u8], &[u8])]) -> MemTable {
    let memtable = MemTable::new();
    for (key, value) in entries {
        memtable.put(key.to_vec(), value.to_vec());
    }
    memtable
}

// =============================================================================
// Open Tests
// =============================================================================

#[test]
fn test_open_creates_layout() {
    let (_temp, path) = setup_temp_store();

    let store = open_store(&path);

    assert!(store.wal_path().exists());
    assert!(store.storage_dir().is_dir());
    assert!(Store::exists(&path).unwrap());
    assert_eq!(store.snapshot().version(), 0);
}

#[test]
fn test_open_without_create_fails_on_missing_database() {
    let (_temp, path) = setup_temp_store();

    let result = Store::open(Config::builder().data_dir(&path).create(false).build());

    assert!(matches!(result, Err(TickError::Config(_))));
    assert!(!path.exists());
}

#[test]
fn test_open_without_create_succeeds_on_existing_database() {
    let (_temp, path) = setup_temp_store();
    open_store(&path).close().unwrap();

    let store = Store::open(Config::builder().data_dir(&path).create(false).build()).unwrap();

    assert_eq!(store.data_dir(), path.as_path());
}

// =============================================================================
// Commit / Snapshot Tests
// =============================================================================

#[test]
fn test_commit_visible_to_new_snapshots() {
    let (_temp, path) = setup_temp_store();
    let store = open_store(&path);

    let before = store.snapshot();
    let version = store.commit(writes(&[(b"k", b"v")])).unwrap();
    let after = store.snapshot();

    assert_eq!(version, 1);
    assert_eq!(after.version(), 1);
    assert_eq!(after.get(b"k").unwrap(), Some(b"v".to_vec()));
    // Snapshot taken earlier is unaffected
    assert_eq!(before.get(b"k").unwrap(), None);
}

#[test]
fn test_commit_empty_write_set_is_noop() {
    let (_temp, path) = setup_temp_store();
    let store = open_store(&path);
    store.commit(writes(&[(b"k", b"v")])).unwrap();

    let version = store.commit(MemTable::new()).unwrap();

    assert_eq!(version, 1);
    assert_eq!(store.snapshot().layer_count(), 1);
}

#[test]
fn test_newer_layer_shadows_older() {
    let (_temp, path) = setup_temp_store();
    let store = open_store(&path);

    store.commit(writes(&[(b"a", b"1"), (b"b", b"1")])).unwrap();
    store.commit(writes(&[(b"a", b"2")])).unwrap();
    let deletes = MemTable::new();
    deletes.delete(b"b".to_vec());
    store.commit(deletes).unwrap();

    let snapshot = store.snapshot();
    assert_eq!(snapshot.get(b"a").unwrap(), Some(b"2".to_vec()));
    assert_eq!(snapshot.get(b"b").unwrap(), None);
    assert_eq!(snapshot.range_keys(b"a", b"z"), vec![b"a".to_vec()]);
    assert_eq!(
        snapshot.range(b"a", b"z").unwrap(),
        vec![(b"a".to_vec(), b"2".to_vec())]
    );
}

#[test]
fn test_snapshot_first_key_prefers_newest_source() {
    let (_temp, path) = setup_temp_store();
    let store = open_store(&path);
    store.commit(writes(&[(b"b", b"1"), (b"d", b"1")])).unwrap();
    store.flush().unwrap();

    let deletes = MemTable::new();
    deletes.delete(b"b".to_vec());
    store.commit(deletes).unwrap();
    store.commit(writes(&[(b"c", b"2")])).unwrap();

    let snapshot = store.snapshot();
    assert_eq!(snapshot.first_key(b"a"), Some((b"b".to_vec(), true)));
    assert_eq!(snapshot.first_key(b"b\0"), Some((b"c".to_vec(), false)));
    assert_eq!(snapshot.first_key(b"c\0"), Some((b"d".to_vec(), false)));
    assert_eq!(snapshot.first_key(b"e"), None);
}

// =============================================================================
// Flush / Compaction Tests
// =============================================================================

#[test]
fn test_explicit_flush_moves_layers_to_sstable() {
    let (_temp, path) = setup_temp_store();
    let store = open_store(&path);
    store.commit(writes(&[(b"a", b"1")])).unwrap();
    store.commit(writes(&[(b"b", b"2")])).unwrap();

    store.flush().unwrap();

    let snapshot = store.snapshot();
    assert_eq!(snapshot.layer_count(), 0);
    assert_eq!(snapshot.sstable_count(), 1);
    assert_eq!(snapshot.version(), 2);
    assert_eq!(snapshot.get(b"a").unwrap(), Some(b"1".to_vec()));
    assert_eq!(std::fs::metadata(store.wal_path()).unwrap().len(), 0);
}

#[test]
fn test_flush_triggered_by_size_limit() {
    let (_temp, path) = setup_temp_store();
    let config = Config::builder()
        .data_dir(&path)
        .memtable_size_limit(16)
        .build();
    let store = Store::open(config).unwrap();

    store.commit(writes(&[(b"k", b"small")])).unwrap();
    assert_eq!(store.sstable_count(), 0);

    store.commit(writes(&[(b"key", b"a larger value")])).unwrap();
    assert_eq!(store.sstable_count(), 1);
    assert_eq!(store.snapshot().layer_count(), 0);
}

#[test]
fn test_commit_succeeds_when_automatic_flush_fails() {
    let (_temp, path) = setup_temp_store();
    let config = Config::builder()
        .data_dir(&path)
        .memtable_size_limit(1)
        .build();
    let store = Store::open(config).unwrap();

    // A plain file where the table directory was makes every flush fail
    let storage_dir = store.storage_dir().to_path_buf();
    std::fs::remove_dir_all(&storage_dir).unwrap();
    std::fs::write(&storage_dir, b"not a directory").unwrap();

    assert_eq!(store.commit(writes(&[(b"a", b"1")])).unwrap(), 1);
    assert_eq!(store.sstable_count(), 0);
    assert_eq!(store.snapshot().get(b"a").unwrap(), Some(b"1".to_vec()));
    assert!(std::fs::metadata(store.wal_path()).unwrap().len() > 0);

    std::fs::remove_file(&storage_dir).unwrap();
    std::fs::create_dir(&storage_dir).unwrap();

    store.flush().unwrap();
    assert_eq!(store.sstable_count(), 1);
    assert_eq!(store.snapshot().layer_count(), 0);
    assert_eq!(store.snapshot().get(b"a").unwrap(), Some(b"1".to_vec()));
}

#[test]
fn test_compaction_triggered_by_sstable_count() {
    let (_temp, path) = setup_temp_store();
    let config = Config::builder()
        .data_dir(&path)
        .memtable_size_limit(1)
        .max_sstables(2)
        .build();
    let store = Store::open(config).unwrap();

    store.commit(writes(&[(b"a", b"1")])).unwrap();
    store.commit(writes(&[(b"b", b"2")])).unwrap();
    assert_eq!(store.sstable_count(), 2);

    store.commit(writes(&[(b"a", b"3")])).unwrap();
    assert_eq!(store.sstable_count(), 1);

    let snapshot = store.snapshot();
    assert_eq!(snapshot.get(b"a").unwrap(), Some(b"3".to_vec()));
    assert_eq!(snapshot.get(b"b").unwrap(), Some(b"2".to_vec()));
}

#[test]
fn test_old_snapshot_survives_compaction() {
    let (_temp, path) = setup_temp_store();
    let store = open_store(&path);
    store.commit(writes(&[(b"a", b"1")])).unwrap();
    store.flush().unwrap();
    store.commit(writes(&[(b"b", b"2")])).unwrap();
    store.flush().unwrap();

    let old = store.snapshot();
    store.compact().unwrap();

    assert_eq!(store.sstable_count(), 1);
    assert_eq!(old.get(b"a").unwrap(), Some(b"1".to_vec()));
    assert_eq!(old.get(b"b").unwrap(), Some(b"2".to_vec()));
}

// =============================================================================
// Recovery Tests
// =============================================================================

#[test]
fn test_recovery_after_drop_without_close() {
    let (_temp, path) = setup_temp_store();

    {
        let store = open_store(&path);
        store.commit(writes(&[(b"a", b"1")])).unwrap();
        store.commit(writes(&[(b"b", b"2")])).unwrap();
        // Dropped without close: data only lives in the WAL
        assert_eq!(store.sstable_count(), 0);
        assert_eq!(WalRecovery::verify(&store.wal_path()).unwrap().entries_recovered, 2);
    }

    let store = open_store(&path);
    let snapshot = store.snapshot();

    assert_eq!(snapshot.get(b"a").unwrap(), Some(b"1".to_vec()));
    assert_eq!(snapshot.get(b"b").unwrap(), Some(b"2".to_vec()));
    // Recovered data was flushed and the WAL cleared
    assert_eq!(store.sstable_count(), 1);
    assert_eq!(std::fs::metadata(store.wal_path()).unwrap().len(), 0);
}

#[test]
fn test_recovery_preserves_deletes() {
    let (_temp, path) = setup_temp_store();

    {
        let store = open_store(&path);
        store.commit(writes(&[(b"a", b"1")])).unwrap();
        store.flush().unwrap();
        let deletes = MemTable::new();
        deletes.delete(b"a".to_vec());
        store.commit(deletes).unwrap();
    }

    let store = open_store(&path);

    assert_eq!(store.snapshot().get(b"a").unwrap(), None);
}

#[test]
fn test_close_persists_everything() {
    let (_temp, path) = setup_temp_store();

    {
        let store = open_store(&path);
        for i in 0..50u32 {
            let key = format!("key{:03}", i).into_bytes();
            let value = i.to_le_bytes();
            store.commit(writes(&[(key.as_slice(), &value[..])])).unwrap();
        }
        store.close().unwrap();
    }

    let store = open_store(&path);
    let entries = store.snapshot().range(b"key000", b"key999").unwrap();

    assert_eq!(entries.len(), 50);
    assert_eq!(entries[7], (b"key007".to_vec(), 7u32.to_le_bytes().to_vec()));
}
