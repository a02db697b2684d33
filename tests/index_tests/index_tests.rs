//! Tests for SeriesIndex
//!
//! These tests verify:
//! - Routing of timestamps to their owning segment
//! - Forward overflow cascades across full segments
//! - Re-keying when a segment's first point changes
//! - Write-back of changed segments and reload from the store

use std::collections::BTreeMap;

use tickvault::codec::decode_segment;
use tickvault::index::{SegmentStore, SeriesIndex};
use tickvault::keys::SegmentKey;
use tickvault::memtable::{MemTable, MemTableEntry};
use tickvault::{Point, Result, SeriesId, TickError, Timestamp};

// =============================================================================
// Helper Functions
// =============================================================================

/// Plain ordered map standing in for the transactional store
#[derive(Default)]
struct MapStore(BTreeMap<Vec<u8>, Vec<u8>>);

impl SegmentStore for MapStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.0.get(key).cloned())
    }

    fn range_keys(&self, start: &[u8], end: &[u8]) -> Result<Vec<Vec<u8>>> {
        Ok(self
            .0
            .range(start.to_vec()..=end.to_vec())
            .map(|(k, _)| k.clone())
            .collect())
    }
}

impl MapStore {
    fn apply(&mut self, writes: &MemTable) {
        for (key, entry) in writes.iter() {
            match entry {
                MemTableEntry::Value(value) => {
                    self.0.insert(key, value);
                }
                MemTableEntry::Tombstone => {
                    self.0.remove(&key);
                }
            }
        }
    }

    fn stored_starts(&self, series: SeriesId) -> Vec<i64> {
        let (lo, hi) = SegmentKey::series_range(&series);
        self.range_keys(&lo, &hi)
            .unwrap()
            .iter()
            .map(|k| SegmentKey::decode(k).unwrap().start.ticks())
            .collect()
    }
}

/// Store whose read of one key fails
struct FailingStore<'a> {
    inner: &'a MapStore,
    bad_key: Vec<u8>,
}

impl SegmentStore for FailingStore<'_> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if key == self.bad_key.as_slice() {
            return Err(TickError::Corruption("unreadable segment".to_string()));
        }
        self.inner.get(key)
    }

    fn range_keys(&self, start: &[u8], end: &[u8]) -> Result<Vec<Vec<u8>>> {
        self.inner.range_keys(start, end)
    }
}

const SERIES: SeriesId = SeriesId::from_u128(0xabc);

fn point(t: i64) -> Point {
    Point::new(t, 0, t as f64)
}

fn index_of<const N: usize>(store: &MapStore, timestamps: &[i64]) -> SeriesIndex<N> {
    let mut index = SeriesIndex::empty(SERIES);
    for &t in timestamps {
        index.insert(store, point(t)).unwrap();
    }
    index
}

fn starts<const N: usize>(index: &SeriesIndex<N>) -> Vec<i64> {
    index.starts().iter().map(|s| s.ticks()).collect()
}

fn layout<const N: usize>(index: &mut SeriesIndex<N>, store: &MapStore) -> Vec<Vec<i64>> {
    index
        .starts()
        .into_iter()
        .map(|start| {
            index
                .segment(store, start)
                .unwrap()
                .iter()
                .map(|p| p.timestamp.ticks())
                .collect()
        })
        .collect()
}

/// Flush `index` into a write set and apply it to `store`
fn persist<const N: usize>(index: &mut SeriesIndex<N>, store: &mut MapStore) -> usize {
    let writes = MemTable::new();
    let written = index.flush(&writes).unwrap();
    store.apply(&writes);
    written
}

// =============================================================================
// Routing Tests
// =============================================================================

#[test]
fn test_locate_empty_series() {
    let index: SeriesIndex<3> = SeriesIndex::empty(SERIES);

    assert_eq!(index.locate(Timestamp::new(5)), None);
    assert!(index.is_empty());
    assert_eq!(index.series(), SERIES);
}

#[test]
fn test_locate_routes_to_largest_start_at_or_below() {
    let store = MapStore::default();
    let index: SeriesIndex<3> = index_of(&store, &[10, 20, 30, 40, 50, 60, 70]);
    assert_eq!(starts(&index), vec![10, 40, 70]);

    assert_eq!(index.locate(Timestamp::new(5)), Some(Timestamp::new(10)));
    assert_eq!(index.locate(Timestamp::new(39)), Some(Timestamp::new(10)));
    assert_eq!(index.locate(Timestamp::new(40)), Some(Timestamp::new(40)));
    assert_eq!(index.locate(Timestamp::new(1000)), Some(Timestamp::new(70)));
    assert_eq!(index.ordinal(Timestamp::new(70)), 2);
    assert_eq!(index.prev_start(Timestamp::new(40)), Some(Timestamp::new(10)));
    assert_eq!(index.next_start(Timestamp::new(70)), None);
}

// =============================================================================
// Cascade Tests
// =============================================================================

#[test]
fn test_overflow_of_maximum_starts_new_tail() {
    // capacity 3; 2, 4, 6 then 1 evicts 6 into a new segment
    let store = MapStore::default();
    let mut index: SeriesIndex<3> = index_of(&store, &[2, 4, 6, 1]);

    assert_eq!(layout(&mut index, &store), vec![vec![1, 2, 4], vec![6]]);
    assert_eq!(starts(&index), vec![1, 6]);
}

#[test]
fn test_overflow_into_gap() {
    // capacity 3; 1, 2, 4 then 3 evicts 4
    let store = MapStore::default();
    let mut index: SeriesIndex<3> = index_of(&store, &[1, 2, 4, 3]);

    assert_eq!(layout(&mut index, &store), vec![vec![1, 2, 3], vec![4]]);
}

#[test]
fn test_cascade_through_every_segment() {
    let store = MapStore::default();
    let mut index: SeriesIndex<3> = index_of(&store, &[10, 20, 30, 40, 50, 60, 70, 80, 90]);

    index.insert(&store, point(5)).unwrap();

    assert_eq!(
        layout(&mut index, &store),
        vec![vec![5, 10, 20], vec![30, 40, 50], vec![60, 70, 80], vec![90]]
    );
    assert_eq!(starts(&index), vec![5, 30, 60, 90]);
}

#[test]
fn test_point_above_full_segment_moves_to_next() {
    let store = MapStore::default();
    let mut index: SeriesIndex<3> = index_of(&store, &[10, 20, 30, 40, 50, 60, 70, 80, 90]);

    index.insert(&store, point(35)).unwrap();

    assert_eq!(
        layout(&mut index, &store),
        vec![vec![10, 20, 30], vec![35, 40, 50], vec![60, 70, 80], vec![90]]
    );
}

#[test]
fn test_duplicate_replaces_without_cascade() {
    let store = MapStore::default();
    let mut index: SeriesIndex<3> = index_of(&store, &[1, 2, 3, 4]);

    index.insert(&store, Point::new(2, 7, -1.0)).unwrap();

    assert_eq!(layout(&mut index, &store), vec![vec![1, 2, 3], vec![4]]);
    let stored = *index.segment(&store, Timestamp::new(1)).unwrap().get(1).unwrap();
    assert_eq!(stored, Point::new(2, 7, -1.0));
}

#[test]
fn test_every_segment_but_tail_is_full() {
    let store = MapStore::default();
    let timestamps: Vec<i64> = (0..50).map(|i| (i * 37) % 101).collect();
    let mut index: SeriesIndex<4> = index_of(&store, &timestamps);

    let segments = layout(&mut index, &store);
    let (tail, full) = segments.split_last().unwrap();
    assert!(full.iter().all(|s| s.len() == 4));
    assert!(!tail.is_empty() && tail.len() <= 4);

    let flat: Vec<i64> = segments.concat();
    assert!(flat.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(flat.len(), 50);
    assert_eq!(index.point_count(&store).unwrap(), 50);
}

// =============================================================================
// Write-back Tests
// =============================================================================

#[test]
fn test_flush_and_reload() {
    let mut store = MapStore::default();
    let mut index: SeriesIndex<3> = index_of(&store, &[5, 3, 9, 1, 7]);
    assert!(index.is_dirty());

    let written = persist(&mut index, &mut store);

    assert_eq!(written, 2);
    assert!(!index.is_dirty());
    assert_eq!(store.stored_starts(SERIES), vec![1, 7]);

    let mut reloaded: SeriesIndex<3> = SeriesIndex::load(&store, SERIES).unwrap();
    assert_eq!(starts(&reloaded), vec![1, 7]);
    assert_eq!(layout(&mut reloaded, &store), vec![vec![1, 3, 5], vec![7, 9]]);
}

#[test]
fn test_rekeyed_segment_deletes_old_key() {
    let mut store = MapStore::default();
    let mut index: SeriesIndex<3> = index_of(&store, &[10, 20]);
    persist(&mut index, &mut store);
    assert_eq!(store.stored_starts(SERIES), vec![10]);

    index.insert(&store, point(5)).unwrap();
    persist(&mut index, &mut store);

    assert_eq!(store.stored_starts(SERIES), vec![5]);
    let key = SegmentKey::new(SERIES, Timestamp::new(5)).encode();
    let segment = decode_segment::<3>(&store.0[&key]).unwrap();
    assert_eq!(segment.len(), 3);
}

#[test]
fn test_capacity_one_takes_over_abandoned_key() {
    let mut store = MapStore::default();
    let mut index: SeriesIndex<1> = index_of(&store, &[5]);
    persist(&mut index, &mut store);

    // 3 takes the first slot, 5 moves to a new segment keyed 5
    index.insert(&store, point(3)).unwrap();
    persist(&mut index, &mut store);

    assert_eq!(store.stored_starts(SERIES), vec![3, 5]);
    let reloaded: SeriesIndex<1> = SeriesIndex::load(&store, SERIES).unwrap();
    assert_eq!(reloaded.segment_count(), 2);
}

#[test]
fn test_release_drops_only_clean_segments() {
    let mut store = MapStore::default();
    let mut index: SeriesIndex<3> = index_of(&store, &[1, 2, 3, 4]);

    // Dirty segments survive release
    index.release(Timestamp::new(1));
    persist(&mut index, &mut store);
    index.release(Timestamp::new(1));

    // Clean segments reload from the store
    assert_eq!(layout(&mut index, &store), vec![vec![1, 2, 3], vec![4]]);
}

#[test]
fn test_failed_cascade_load_leaves_index_unchanged() {
    let mut store = MapStore::default();
    let mut index: SeriesIndex<3> = index_of(&store, &[1, 2, 3, 4, 5, 6]);
    persist(&mut index, &mut store);

    let mut reloaded: SeriesIndex<3> = SeriesIndex::load(&store, SERIES).unwrap();
    let failing = FailingStore {
        inner: &store,
        bad_key: SegmentKey::new(SERIES, Timestamp::new(4)).encode(),
    };

    // 0 would push 3 into the unreadable segment
    assert!(reloaded.insert(&failing, point(0)).is_err());
    assert!(!reloaded.is_dirty());
    assert_eq!(starts(&reloaded), vec![1, 4]);

    let writes = MemTable::new();
    assert_eq!(reloaded.flush(&writes).unwrap(), 0);
    assert!(writes.is_empty());
    assert_eq!(
        layout(&mut reloaded, &store),
        vec![vec![1, 2, 3], vec![4, 5, 6]]
    );

    reloaded.insert(&store, point(0)).unwrap();
    assert_eq!(
        layout(&mut reloaded, &store),
        vec![vec![0, 1, 2], vec![3, 4, 5], vec![6]]
    );
}
