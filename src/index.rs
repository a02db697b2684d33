//! Series Index
//!
//! Per-series catalogue of segments, keyed by the timestamp of each
//! segment's first point, plus the cascading insert that keeps segment
//! ranges contiguous.
//!
//! ## Shape
//! ```text
//!   start ──►  [ s0 .................. ] [ s1 .................. ] [ s2 ...... ]
//!              full (N points)            full (N points)            tail (≤ N)
//! ```
//! - A timestamp `t` belongs to the segment with the largest start ≤ `t`;
//!   timestamps below the first start belong to the first segment.
//! - No segment is empty; every segment except the tail is full.
//!
//! Segments are loaded from the store on first touch and written back by
//! [`SeriesIndex::flush`].

use std::collections::BTreeMap;
use std::ops::Bound;

use crate::codec::{decode_segment, encode_segment};
use crate::error::{Result, TickError};
use crate::keys::SegmentKey;
use crate::memtable::MemTable;
use crate::segment::{InsertOutcome, Segment, SegmentItem};
use crate::types::{Point, SeriesId, Timestamp};

/// Read access to stored segments
pub trait SegmentStore {
    /// Value stored under `key`
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Live keys in `[start, end]`, ascending
    fn range_keys(&self, start: &[u8], end: &[u8]) -> Result<Vec<Vec<u8>>>;
}

struct Slot<const N: usize> {
    /// Start the segment is stored under, `None` until first flushed
    persisted_at: Option<Timestamp>,
    /// Loaded contents
    segment: Option<Segment<Point, N>>,
    dirty: bool,
}

impl<const N: usize> Slot<N> {
    fn fresh(point: Point) -> Self {
        Self {
            persisted_at: None,
            segment: Some(Segment::with_item(point)),
            dirty: true,
        }
    }
}

/// Catalogue of one series' segments
pub struct SeriesIndex<const N: usize> {
    series: SeriesId,
    slots: BTreeMap<Timestamp, Slot<N>>,
}

impl<const N: usize> SeriesIndex<N> {
    /// Catalogue of a series with no segments
    pub fn empty(series: SeriesId) -> Self {
        Self {
            series,
            slots: BTreeMap::new(),
        }
    }

    /// Load the catalogue of `series`; segment contents stay on disk until
    /// touched
    pub fn load(store: &impl SegmentStore, series: SeriesId) -> Result<Self> {
        let (lo, hi) = SegmentKey::series_range(&series);
        let mut index = Self::empty(series);
        for key in store.range_keys(&lo, &hi)? {
            let segment_key = SegmentKey::decode(&key)?;
            index.slots.insert(
                segment_key.start,
                Slot {
                    persisted_at: Some(segment_key.start),
                    segment: None,
                    dirty: false,
                },
            );
        }
        Ok(index)
    }

    pub fn series(&self) -> SeriesId {
        self.series
    }

    /// Number of segments
    pub fn segment_count(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// True when a segment has changes not yet written back
    pub fn is_dirty(&self) -> bool {
        self.slots.values().any(|slot| slot.dirty)
    }

    /// Start of the segment owning `timestamp`, `None` for an empty series
    pub fn locate(&self, timestamp: Timestamp) -> Option<Timestamp> {
        self.slots
            .range(..=timestamp)
            .next_back()
            .or_else(|| self.slots.iter().next())
            .map(|(start, _)| *start)
    }

    pub fn first_start(&self) -> Option<Timestamp> {
        self.slots.keys().next().copied()
    }

    pub fn last_start(&self) -> Option<Timestamp> {
        self.slots.keys().next_back().copied()
    }

    /// Start of the segment following the one at `start`
    pub fn next_start(&self, start: Timestamp) -> Option<Timestamp> {
        self.slots
            .range((Bound::Excluded(start), Bound::Unbounded))
            .next()
            .map(|(s, _)| *s)
    }

    /// Start of the segment preceding the one at `start`
    pub fn prev_start(&self, start: Timestamp) -> Option<Timestamp> {
        self.slots.range(..start).next_back().map(|(s, _)| *s)
    }

    /// Position of the segment at `start` among the series' segments
    pub fn ordinal(&self, start: Timestamp) -> usize {
        self.slots.range(..start).count()
    }

    /// Starts of every segment, ascending
    pub fn starts(&self) -> Vec<Timestamp> {
        self.slots.keys().copied().collect()
    }

    /// Segment at `start`, loading it if needed
    pub fn segment(
        &mut self,
        store: &impl SegmentStore,
        start: Timestamp,
    ) -> Result<&Segment<Point, N>> {
        Ok(&*self.load_slot(store, start)?)
    }

    /// Drop the cached contents of a clean segment
    pub fn release(&mut self, start: Timestamp) {
        if let Some(slot) = self.slots.get_mut(&start) {
            if !slot.dirty {
                slot.segment = None;
            }
        }
    }

    /// Number of points in the series
    ///
    /// Only the tail is loaded: every other segment is full.
    pub fn point_count(&mut self, store: &impl SegmentStore) -> Result<usize> {
        let last = match self.last_start() {
            Some(last) => last,
            None => return Ok(0),
        };
        let tail = self.segment(store, last)?.len();
        Ok((self.slots.len() - 1) * N + tail)
    }

    /// Insert a point, cascading overflow forward
    ///
    /// A point with an existing timestamp replaces the stored point. Every
    /// segment the cascade may reach is loaded before any is changed, so a
    /// failed load leaves the index untouched.
    pub fn insert(&mut self, store: &impl SegmentStore, point: Point) -> Result<()> {
        let mut start = match self.locate(point.timestamp) {
            Some(start) => start,
            None => {
                self.slots.insert(point.timestamp, Slot::fresh(point));
                return Ok(());
            }
        };
        self.load_cascade(store, start)?;

        let mut item = point;
        loop {
            let segment = self.load_slot(store, start)?;
            let outcome = segment.insert(item);
            let first = match segment.first().map(|first| first.key()) {
                Some(first) => first,
                None => {
                    return Err(TickError::Corruption(format!(
                        "Segment {} of series {} is empty",
                        start, self.series
                    )))
                }
            };
            self.mark_dirty(start, first);

            match outcome {
                InsertOutcome::Done => return Ok(()),
                InsertOutcome::Cascaded(overflow) => {
                    item = overflow;
                    match self.next_start(first) {
                        Some(next) => start = next,
                        None => {
                            self.slots.insert(item.key(), Slot::fresh(item));
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    /// Write every changed segment into `writes`
    ///
    /// Abandoned keys are deleted before any segment is written, so a
    /// segment may take over the key another one gave up.
    pub fn flush(&mut self, writes: &MemTable) -> Result<usize> {
        let deletes: Vec<Timestamp> = self
            .slots
            .iter()
            .filter_map(|(start, slot)| match slot.persisted_at {
                Some(persisted) if slot.dirty && persisted != *start => Some(persisted),
                _ => None,
            })
            .collect();
        for start in deletes {
            writes.delete(SegmentKey::new(self.series, start).encode());
        }

        let mut written = 0;
        for (start, slot) in self.slots.iter_mut() {
            if !slot.dirty {
                continue;
            }
            let segment = slot.segment.as_ref().ok_or_else(|| {
                TickError::Corruption(format!("Dirty segment {} was not loaded", start))
            })?;
            writes.put(
                SegmentKey::new(self.series, *start).encode(),
                encode_segment(segment),
            );
            slot.persisted_at = Some(*start);
            slot.dirty = false;
            written += 1;
        }
        Ok(written)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Load the segment at `start` and every full segment run after it
    fn load_cascade(&mut self, store: &impl SegmentStore, start: Timestamp) -> Result<()> {
        let mut next = Some(start);
        while let Some(start) = next {
            if !self.load_slot(store, start)?.is_full() {
                break;
            }
            next = self.next_start(start);
        }
        Ok(())
    }

    fn load_slot(
        &mut self,
        store: &impl SegmentStore,
        start: Timestamp,
    ) -> Result<&mut Segment<Point, N>> {
        let series = self.series;
        let slot = self.slots.get_mut(&start).ok_or_else(|| {
            TickError::Corruption(format!("Series {} has no segment at {}", series, start))
        })?;

        if slot.segment.is_none() {
            let key = SegmentKey::new(series, slot.persisted_at.unwrap_or(start));
            let bytes = store.get(&key.encode())?.ok_or_else(|| {
                TickError::Corruption(format!(
                    "Segment {} of series {} is catalogued but not stored",
                    key.start, series
                ))
            })?;
            slot.segment = Some(decode_segment::<N>(&bytes)?);
        }

        slot.segment.as_mut().ok_or_else(|| {
            TickError::Corruption(format!("Segment {} of series {} failed to load", start, series))
        })
    }

    /// Record a change to the segment at `start`, re-keying it when its first
    /// point moved to `first`
    fn mark_dirty(&mut self, start: Timestamp, first: Timestamp) {
        if first == start {
            if let Some(slot) = self.slots.get_mut(&start) {
                slot.dirty = true;
            }
            return;
        }
        // The new first point sorts above the previous segment, so `first`
        // never collides with another start
        if let Some(mut slot) = self.slots.remove(&start) {
            slot.dirty = true;
            self.slots.insert(first, slot);
        }
    }
}

impl<const N: usize> std::fmt::Debug for SeriesIndex<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeriesIndex")
            .field("series", &self.series)
            .field("segments", &self.slots.len())
            .field("dirty", &self.is_dirty())
            .finish()
    }
}
