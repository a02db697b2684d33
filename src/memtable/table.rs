//! MemTable implementation
//!
//! BTreeMap-based memtable with RwLock for concurrency.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use super::MemTableEntry;

/// In-memory ordered table
pub struct MemTable {
    /// Sorted entries
    data: RwLock<BTreeMap<Vec<u8>, MemTableEntry>>,

    /// Approximate size in bytes (keys + values)
    size: AtomicUsize,
}

impl MemTable {
    /// Create a new empty MemTable
    pub fn new() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            size: AtomicUsize::new(0),
        }
    }

    /// Get an entry by key (read lock)
    ///
    /// Returns `Some(Tombstone)` for deleted keys so callers can stop
    /// searching older layers.
    pub fn get(&self, key: &[u8]) -> Option<MemTableEntry> {
        self.data.read().get(key).cloned()
    }

    /// Put a key-value pair (write lock)
    ///
    /// Returns the new approximate size
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) -> usize {
        self.insert(key, MemTableEntry::Value(value))
    }

    /// Delete a key (write lock, inserts tombstone)
    ///
    /// Returns the new approximate size
    pub fn delete(&self, key: Vec<u8>) -> usize {
        self.insert(key, MemTableEntry::Tombstone)
    }

    fn insert(&self, key: Vec<u8>, entry: MemTableEntry) -> usize {
        let added = key.len() + entry_size(&entry);
        let mut data = self.data.write();
        let removed = match data.get(&key) {
            Some(old) => key.len() + entry_size(old),
            None => 0,
        };
        data.insert(key, entry);

        // Adjust under the write lock so size stays consistent with data
        let current = self.size.load(Ordering::Relaxed);
        let new_size = (current + added).saturating_sub(removed);
        self.size.store(new_size, Ordering::Relaxed);
        new_size
    }

    /// Get approximate size in bytes
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    /// Get entry count (tombstones included)
    pub fn entry_count(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Check if should flush (size >= limit)
    pub fn should_flush(&self, size_limit: usize) -> bool {
        self.size() >= size_limit
    }

    /// Entries with keys in `[start, end]`, in key order
    pub fn range(&self, start: &[u8], end: &[u8]) -> Vec<(Vec<u8>, MemTableEntry)> {
        if start > end {
            return Vec::new();
        }
        self.data
            .read()
            .range::<[u8], _>((Bound::Included(start), Bound::Included(end)))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Smallest key at or after `start` with its tombstone flag
    pub fn first_key(&self, start: &[u8]) -> Option<(Vec<u8>, bool)> {
        self.data
            .read()
            .range::<[u8], _>((Bound::Included(start), Bound::Unbounded))
            .next()
            .map(|(k, v)| (k.clone(), v.is_tombstone()))
    }

    /// Keys in `[start, end]` with their tombstone flag, values left in place
    pub fn range_keys(&self, start: &[u8], end: &[u8]) -> Vec<(Vec<u8>, bool)> {
        if start > end {
            return Vec::new();
        }
        self.data
            .read()
            .range::<[u8], _>((Bound::Included(start), Bound::Included(end)))
            .map(|(k, v)| (k.clone(), v.is_tombstone()))
            .collect()
    }

    /// Get an iterator over all entries (for flush)
    /// Returns entries in sorted key order
    pub fn iter(&self) -> MemTableIterator {
        let entries: Vec<(Vec<u8>, MemTableEntry)> = self
            .data
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        MemTableIterator {
            inner: entries.into_iter(),
        }
    }

    /// Apply every entry of `newer` on top of this table
    pub fn merge_from(&self, newer: &MemTable) {
        for (key, entry) in newer.iter() {
            self.insert(key, entry);
        }
    }

    /// Clear all entries (after successful flush)
    pub fn clear(&self) {
        let mut data = self.data.write();
        data.clear();
        self.size.store(0, Ordering::Relaxed);
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemTable")
            .field("entries", &self.entry_count())
            .field("size", &self.size())
            .finish()
    }
}

fn entry_size(entry: &MemTableEntry) -> usize {
    match entry {
        MemTableEntry::Value(value) => value.len(),
        MemTableEntry::Tombstone => 0,
    }
}

/// Iterator over MemTable entries
///
/// Owns a copy of the entries taken at creation, so the table stays
/// writable while the iterator is alive.
pub struct MemTableIterator {
    inner: std::vec::IntoIter<(Vec<u8>, MemTableEntry)>,
}

impl Iterator for MemTableIterator {
    type Item = (Vec<u8>, MemTableEntry);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}
