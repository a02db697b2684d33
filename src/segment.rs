//! Segment Module
//!
//! Fixed-capacity, sorted buffer of points; the unit of storage.
//!
//! ## Responsibilities
//! - Keep items strictly ascending by key with no gaps
//! - Never hold more than `N` items
//! - Classify a key relative to the stored items (tri-state search)
//! - Report the item that no longer fits when a full segment is inserted into
//!
//! A segment performs no I/O. Encoding lives in `codec`, persistence in the
//! transaction layer.

use std::slice;

use crate::error::{Result, TickError};
use crate::types::{Point, Timestamp};

/// Items that can be stored in a segment
pub trait SegmentItem: Copy {
    /// Ordering key of the item
    fn key(&self) -> Timestamp;
}

impl SegmentItem for Point {
    #[inline]
    fn key(&self) -> Timestamp {
        self.timestamp
    }
}

/// Outcome of a tri-state search
///
/// The index always refers to a stored item:
/// - `Equal(i)`: item `i` has exactly the searched key
/// - `Less(i)`: item `i` is the nearest item below the key (the key falls
///   in a gap or beyond the last item)
/// - `Greater(i)`: the key precedes every item; `i` is the first item
/// - `Empty`: nothing is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchResult {
    Empty,
    Equal(usize),
    Greater(usize),
    Less(usize),
}

impl SearchResult {
    /// Index of the item the search landed on
    pub fn index(&self) -> Option<usize> {
        match *self {
            SearchResult::Empty => None,
            SearchResult::Equal(i) | SearchResult::Greater(i) | SearchResult::Less(i) => Some(i),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, SearchResult::Empty)
    }

    pub fn is_equal(&self) -> bool {
        matches!(self, SearchResult::Equal(_))
    }

    pub fn is_greater(&self) -> bool {
        matches!(self, SearchResult::Greater(_))
    }

    pub fn is_less(&self) -> bool {
        matches!(self, SearchResult::Less(_))
    }

    /// Same classification with a different index (used when a segment-local
    /// result is translated to another frame of reference)
    pub(crate) fn with_index(self, index: usize) -> Self {
        match self {
            SearchResult::Empty => SearchResult::Empty,
            SearchResult::Equal(_) => SearchResult::Equal(index),
            SearchResult::Greater(_) => SearchResult::Greater(index),
            SearchResult::Less(_) => SearchResult::Less(index),
        }
    }
}

/// Outcome of inserting into a segment
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InsertOutcome<T> {
    /// The item was stored (or replaced an item with the same key)
    Done,
    /// The segment was full; this item must be placed in a later segment.
    /// It sorts after every item left in the segment.
    Cascaded(T),
}

impl<T> InsertOutcome<T> {
    pub fn is_done(&self) -> bool {
        matches!(self, InsertOutcome::Done)
    }

    /// The overflowing item, if any
    pub fn overflow(self) -> Option<T> {
        match self {
            InsertOutcome::Done => None,
            InsertOutcome::Cascaded(item) => Some(item),
        }
    }
}

/// Sorted buffer of at most `N` items
#[derive(Debug, Clone, PartialEq)]
pub struct Segment<T, const N: usize> {
    items: Vec<T>,
}

impl<T: SegmentItem, const N: usize> Segment<T, N> {
    /// Maximum number of items
    pub const CAPACITY: usize = N;

    const NON_ZERO: () = assert!(N > 0, "segment capacity must be non-zero");

    /// Create an empty segment
    ///
    /// Storage grows with the item count; `N` only bounds it.
    pub fn new() -> Self {
        let () = Self::NON_ZERO;
        Self { items: Vec::new() }
    }

    /// Create a segment holding a single item
    pub fn with_item(item: T) -> Self {
        let mut segment = Self::new();
        segment.items.push(item);
        segment
    }

    /// Build a segment from decoded items, validating the segment invariants
    pub fn from_vec(items: Vec<T>) -> Result<Self> {
        if items.len() > N {
            return Err(TickError::Corruption(format!(
                "Segment holds {} items, capacity is {}",
                items.len(),
                N
            )));
        }
        if items.windows(2).any(|w| w[0].key() >= w[1].key()) {
            return Err(TickError::Corruption(
                "Segment items are not strictly ascending".to_string(),
            ));
        }
        let mut segment = Self::new();
        segment.items.extend(items);
        Ok(segment)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() == N
    }

    pub fn first(&self) -> Option<&T> {
        self.items.first()
    }

    pub fn last(&self) -> Option<&T> {
        self.items.last()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn iter(&self) -> slice::Iter<'_, T> {
        self.items.iter()
    }

    /// True when `key` lies within [first, last]
    pub fn interval_contains(&self, key: Timestamp) -> bool {
        match (self.items.first(), self.items.last()) {
            (Some(first), Some(last)) => key >= first.key() && key <= last.key(),
            _ => false,
        }
    }

    /// Index of the first item with a key >= `key`
    pub fn lower_bound(&self, key: Timestamp) -> usize {
        self.items.partition_point(|item| item.key() < key)
    }

    /// Tri-state search for `key`
    pub fn search(&self, key: Timestamp) -> SearchResult {
        let last = match self.items.last() {
            Some(last) => last,
            None => return SearchResult::Empty,
        };

        // Appends dominate, check the tail first
        if last.key() < key {
            return SearchResult::Less(self.items.len() - 1);
        }

        match self.items.binary_search_by_key(&key, |item| item.key()) {
            Ok(index) => SearchResult::Equal(index),
            Err(0) => SearchResult::Greater(0),
            Err(index) => SearchResult::Less(index - 1),
        }
    }

    /// Insert `item` at its sorted position
    ///
    /// - An item with an existing key replaces the stored item.
    /// - A full segment evicts its maximum when `item` sorts below it.
    /// - A full segment rejects `item` when it sorts above the maximum; the
    ///   item itself is returned for placement in a later segment.
    pub fn insert(&mut self, item: T) -> InsertOutcome<T> {
        let key = item.key();

        // Fast path: append
        match self.items.last() {
            Some(last) if last.key() < key => {
                if self.items.len() < N {
                    self.items.push(item);
                    return InsertOutcome::Done;
                }
                return InsertOutcome::Cascaded(item);
            }
            None => {
                self.items.push(item);
                return InsertOutcome::Done;
            }
            _ => {}
        }

        match self.items.binary_search_by_key(&key, |stored| stored.key()) {
            Ok(index) => {
                self.items[index] = item;
                InsertOutcome::Done
            }
            Err(index) if self.items.len() < N => {
                self.items.insert(index, item);
                InsertOutcome::Done
            }
            Err(index) => {
                // index < N here: the key sorts below the current maximum
                match self.items.pop() {
                    Some(evicted) => {
                        self.items.insert(index, item);
                        InsertOutcome::Cascaded(evicted)
                    }
                    None => InsertOutcome::Done,
                }
            }
        }
    }

    /// Remove every item
    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T: SegmentItem, const N: usize> Default for Segment<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, T: SegmentItem, const N: usize> IntoIterator for &'a Segment<T, N> {
    type Item = &'a T;
    type IntoIter = slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
