//! Point-in-time views of the store

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{Result, TickError};
use crate::memtable::{MemTable, MemTableEntry};
use crate::storage::SSTableReader;

/// Immutable view of every committed write up to `version`
///
/// Search order mirrors the age of the data:
/// 1. Committed memtable layers (newest first)
/// 2. SSTables (newest first)
///
/// The first source that knows a key decides it; a tombstone hides every
/// older version.
#[derive(Debug, Default)]
pub struct Snapshot {
    version: u64,
    layers: Vec<Arc<MemTable>>,
    sstables: Vec<Arc<SSTableReader>>,
}

/// Where the newest version of a key lives
enum Source<'a> {
    Layer(Vec<u8>),
    Table(&'a SSTableReader),
}

impl Snapshot {
    pub(crate) fn new(
        version: u64,
        layers: Vec<Arc<MemTable>>,
        sstables: Vec<Arc<SSTableReader>>,
    ) -> Self {
        Self {
            version,
            layers,
            sstables,
        }
    }

    /// Number of commits this view includes
    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn layers(&self) -> &[Arc<MemTable>] {
        &self.layers
    }

    pub(crate) fn sstables(&self) -> &[Arc<SSTableReader>] {
        &self.sstables
    }

    /// Committed layers not yet flushed to an SSTable
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Approximate bytes held by unflushed layers
    pub fn memtable_bytes(&self) -> usize {
        self.layers.iter().map(|layer| layer.size()).sum()
    }

    pub fn sstable_count(&self) -> usize {
        self.sstables.len()
    }

    /// Get a value by key
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        for layer in &self.layers {
            if let Some(entry) = layer.get(key) {
                return Ok(entry.into_value());
            }
        }

        for reader in &self.sstables {
            // Skip SSTable if key is outside its range (O(1) check)
            if !reader.might_contain(key) {
                continue;
            }
            match reader.get(key) {
                Ok(value) => return Ok(value),
                Err(TickError::KeyNotFound) => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(None)
    }

    /// Smallest key at or after `start` known to any source, with the
    /// tombstone flag of its newest version
    pub fn first_key(&self, start: &[u8]) -> Option<(Vec<u8>, bool)> {
        let candidates = self
            .layers
            .iter()
            .map(|layer| layer.first_key(start))
            .chain(self.sstables.iter().map(|reader| reader.first_key(start)));

        // Sources run newest first, so on equal keys the earlier one wins
        let mut best: Option<(Vec<u8>, bool)> = None;
        for candidate in candidates.flatten() {
            if best.as_ref().map_or(true, |(key, _)| candidate.0 < *key) {
                best = Some(candidate);
            }
        }
        best
    }

    /// Live keys in `[start, end]`, ascending
    ///
    /// Answered from memtable keys and SSTable indexes without reading values.
    pub fn range_keys(&self, start: &[u8], end: &[u8]) -> Vec<Vec<u8>> {
        let mut newest: BTreeMap<Vec<u8>, bool> = BTreeMap::new();
        for layer in &self.layers {
            for (key, tombstone) in layer.range_keys(start, end) {
                newest.entry(key).or_insert(tombstone);
            }
        }
        for reader in &self.sstables {
            for (key, tombstone) in reader.range_keys(start, end) {
                newest.entry(key).or_insert(tombstone);
            }
        }
        newest
            .into_iter()
            .filter_map(|(key, tombstone)| (!tombstone).then_some(key))
            .collect()
    }

    /// Live key/value pairs in `[start, end]`, ascending
    pub fn range(&self, start: &[u8], end: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut newest: BTreeMap<Vec<u8>, Option<Source<'_>>> = BTreeMap::new();
        for layer in &self.layers {
            for (key, entry) in layer.range(start, end) {
                newest.entry(key).or_insert(match entry {
                    MemTableEntry::Value(value) => Some(Source::Layer(value)),
                    MemTableEntry::Tombstone => None,
                });
            }
        }
        for reader in &self.sstables {
            for (key, tombstone) in reader.range_keys(start, end) {
                newest
                    .entry(key)
                    .or_insert((!tombstone).then_some(Source::Table(reader.as_ref())));
            }
        }

        let mut entries = Vec::with_capacity(newest.len());
        for (key, source) in newest {
            let value = match source {
                Some(Source::Layer(value)) => value,
                Some(Source::Table(reader)) => match reader.get(&key)? {
                    Some(value) => value,
                    None => continue,
                },
                None => continue,
            };
            entries.push((key, value));
        }
        Ok(entries)
    }
}
