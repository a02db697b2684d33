//! Cursor
//!
//! Navigation and mutation handle bound to one series of one transaction.
//!
//! ## Position
//! A cursor remembers the point it stands on, not a raw slot. Every move
//! re-locates that point's timestamp in the series index, so inserts made
//! through this or another cursor of the same transaction never leave it
//! pointing at a shifted slot.
//!
//! ```text
//!   BeforeFirst ◄── move_previous ──  At(point)  ── move_next ──► AfterLast
//!                                        ▲
//!              move_first / move_last / search
//! ```

use std::fmt;

use crate::error::{Result, TickError};
use crate::index::SeriesIndex;
use crate::segment::SearchResult;
use crate::transaction::{Transaction, TxState, TxView};
use crate::types::{Point, SeriesId, Timestamp};

/// A point and where it was found
#[derive(Debug, Clone, Copy)]
struct Location {
    /// Start of the segment holding the point
    start: Timestamp,
    point: Point,
}

#[derive(Debug, Clone, Copy)]
enum Position {
    Unpositioned,
    BeforeFirst,
    AfterLast,
    At(Location),
}

/// Cursor over one series
///
/// Borrows its transaction: any number of cursors may be open at once, and
/// all of them must be gone before the transaction commits.
pub struct Cursor<'t, 'e, const N: usize> {
    tx: &'t Transaction<'e, N>,
    series: SeriesId,
    position: Position,
    closed: bool,
}

impl<'t, 'e, const N: usize> Cursor<'t, 'e, N> {
    pub(crate) fn new(tx: &'t Transaction<'e, N>, series: SeriesId) -> Self {
        Self {
            tx,
            series,
            position: Position::Unpositioned,
            closed: false,
        }
    }

    /// The series the cursor is bound to
    pub fn timeseries(&self) -> SeriesId {
        self.series
    }

    /// Rebind the cursor to another series of the same transaction
    ///
    /// Pending changes to the current series are written to the transaction
    /// first. The cursor ends up unpositioned.
    pub fn change_timeseries(&mut self, series: SeriesId) -> Result<()> {
        if series == self.series {
            self.position = Position::Unpositioned;
            return Ok(());
        }
        self.flush()?;
        self.tx.ensure_usable()?;
        self.tx.record(self.tx.open_series(series))?;
        self.series = series;
        self.position = Position::Unpositioned;
        Ok(())
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Insert a point; an existing point with the same timestamp is replaced
    ///
    /// The cursor position is unchanged.
    pub fn insert(&mut self, timestamp: impl Into<Timestamp>, flags: u64, value: f64) -> Result<()> {
        self.tx.ensure_writable()?;
        let point = Point::new(timestamp, flags, value);
        self.with_index(|index, view| index.insert(view, point))
    }

    /// Write changed segments of the bound series into the transaction
    pub fn flush(&self) -> Result<()> {
        let mut state = self.tx.state().borrow_mut();
        let TxState { writes, series } = &mut *state;
        if let Some(index) = series.get_mut(&self.series) {
            if index.is_dirty() {
                let written = self.tx.record(index.flush(writes))?;
                tracing::trace!("Flushed {} segments of series {}", written, self.series);
            }
        }
        Ok(())
    }

    /// Flush and release the cursor
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.flush()
    }

    // =========================================================================
    // Navigation
    // =========================================================================

    /// Move to the first point of the series
    pub fn move_first(&mut self) -> Result<bool> {
        let found = self.with_index(|index, view| {
            let start = match index.first_start() {
                Some(start) => start,
                None => return Ok(None),
            };
            Ok(index
                .segment(view, start)?
                .first()
                .map(|point| Location { start, point: *point }))
        })?;
        Ok(self.settle(found, Position::AfterLast))
    }

    /// Move to the last point of the series
    pub fn move_last(&mut self) -> Result<bool> {
        let found = self.with_index(|index, view| {
            let start = match index.last_start() {
                Some(start) => start,
                None => return Ok(None),
            };
            Ok(index
                .segment(view, start)?
                .last()
                .map(|point| Location { start, point: *point }))
        })?;
        Ok(self.settle(found, Position::BeforeFirst))
    }

    /// Advance to the next point; false once the last point was passed
    pub fn move_next(&mut self) -> Result<bool> {
        match self.position {
            Position::Unpositioned | Position::BeforeFirst => self.move_first(),
            Position::AfterLast => Ok(false),
            Position::At(from) => {
                let found = self.with_index(|index, view| next_after(index, view, from))?;
                Ok(self.settle(found, Position::AfterLast))
            }
        }
    }

    /// Step back to the previous point; false once the first point was passed
    pub fn move_previous(&mut self) -> Result<bool> {
        match self.position {
            Position::Unpositioned | Position::AfterLast => self.move_last(),
            Position::BeforeFirst => Ok(false),
            Position::At(from) => {
                let found = self.with_index(|index, view| previous_before(index, view, from))?;
                Ok(self.settle(found, Position::BeforeFirst))
            }
        }
    }

    /// Tri-state search over the whole series
    ///
    /// The returned index counts points from the start of the series. The
    /// cursor moves onto the reported point; an empty series leaves it
    /// unpositioned.
    pub fn search(&mut self, timestamp: impl Into<Timestamp>) -> Result<SearchResult> {
        let timestamp = timestamp.into();
        let found = self.with_index(|index, view| {
            let start = match index.locate(timestamp) {
                Some(start) => start,
                None => return Ok(None),
            };
            let ordinal = index.ordinal(start);
            let segment = index.segment(view, start)?;
            let result = segment.search(timestamp);
            Ok(result
                .index()
                .and_then(|i| segment.get(i).map(|point| (i, *point)))
                .map(|(i, point)| (result.with_index(ordinal * N + i), Location { start, point })))
        })?;

        match found {
            Some((result, location)) => {
                self.position = Position::At(location);
                Ok(result)
            }
            None => {
                self.position = Position::Unpositioned;
                Ok(SearchResult::Empty)
            }
        }
    }

    /// The point the cursor stands on
    ///
    /// Reflects the point as it was when the cursor moved onto it.
    pub fn current(&self) -> Result<Point> {
        match self.position {
            Position::At(location) => Ok(location.point),
            _ => Err(TickError::InvalidOperation(
                "Cursor is not positioned on a point".to_string(),
            )),
        }
    }

    // =========================================================================
    // Scans
    // =========================================================================

    /// Visit every point in ascending order, returning the number visited
    ///
    /// Does not move the cursor.
    pub fn for_each<F>(&self, f: F) -> Result<usize>
    where
        F: FnMut(&Point),
    {
        self.scan(None, None, f)
    }

    /// Visit points from where [`search`](Self::search) for `start` lands
    /// through the end of the series
    pub fn for_each_from<F>(&self, start: impl Into<Timestamp>, f: F) -> Result<usize>
    where
        F: FnMut(&Point),
    {
        self.scan(Some(start.into()), None, f)
    }

    /// Like [`for_each_from`](Self::for_each_from), stopping after the last
    /// point with a timestamp ≤ `end`
    pub fn for_each_range<F>(
        &self,
        start: impl Into<Timestamp>,
        end: impl Into<Timestamp>,
        f: F,
    ) -> Result<usize>
    where
        F: FnMut(&Point),
    {
        self.scan(Some(start.into()), Some(end.into()), f)
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Number of points in the series
    pub fn len(&self) -> Result<usize> {
        self.with_index(|index, view| index.point_count(view))
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.with_index(|index, _| Ok(index.is_empty()))
    }

    /// Timestamps of the first and last point
    pub fn bounds(&self) -> Result<Option<(Timestamp, Timestamp)>> {
        self.with_index(|index, view| {
            let (first, last) = match (index.first_start(), index.last_start()) {
                (Some(first), Some(last)) => (first, last),
                _ => return Ok(None),
            };
            let last_ts = match index.segment(view, last)?.last() {
                Some(point) => point.timestamp,
                None => return Ok(None),
            };
            // A segment's start is its first timestamp
            Ok(Some((first, last_ts)))
        })
    }

    /// Log the layout of the bound series
    pub fn dump(&self) -> Result<()> {
        self.with_index(|index, view| {
            tracing::debug!(
                "Series {}: {} segments (capacity {})",
                index.series(),
                index.segment_count(),
                N
            );
            for start in index.starts() {
                let segment = index.segment(view, start)?;
                tracing::debug!(
                    "  segment {}: {} points [{} .. {}]",
                    start,
                    segment.len(),
                    segment.first().map(|p| p.timestamp).unwrap_or(start),
                    segment.last().map(|p| p.timestamp).unwrap_or(start)
                );
                index.release(start);
            }
            Ok(())
        })
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Run `f` against the bound series' index and the transaction view
    fn with_index<R>(
        &self,
        f: impl FnOnce(&mut SeriesIndex<N>, &TxView<'_>) -> Result<R>,
    ) -> Result<R> {
        self.tx.ensure_usable()?;
        let mut state = self.tx.state().borrow_mut();
        let TxState { writes, series } = &mut *state;
        let index = series
            .get_mut(&self.series)
            .ok_or(TickError::SeriesNotFound(self.series))?;
        let view = TxView::new(writes, self.tx.snapshot());
        self.tx.record(f(index, &view))
    }

    /// Apply the outcome of a move; `miss` is where the cursor ends up when
    /// there was no point to move to
    fn settle(&mut self, found: Option<Location>, miss: Position) -> bool {
        let previous = self.position;
        self.position = match found {
            Some(location) => Position::At(location),
            None => miss,
        };

        // Leaving a segment: drop its cached contents
        if let (Position::At(from), Position::At(to)) = (previous, self.position) {
            if from.start != to.start {
                if let Ok(mut state) = self.tx.state().try_borrow_mut() {
                    if let Some(index) = state.series.get_mut(&self.series) {
                        index.release(from.start);
                    }
                }
            }
        }
        found.is_some()
    }

    fn scan<F>(&self, from: Option<Timestamp>, until: Option<Timestamp>, mut f: F) -> Result<usize>
    where
        F: FnMut(&Point),
    {
        let mut next = self.with_index(|index, view| match from {
            None => Ok(index.first_start().map(|start| (start, 0))),
            Some(timestamp) => match index.locate(timestamp) {
                None => Ok(None),
                Some(start) => {
                    let offset = index.segment(view, start)?.search(timestamp).index();
                    Ok(offset.map(|offset| (start, offset)))
                }
            },
        })?;

        let mut count = 0;
        while let Some((start, offset)) = next {
            // Copy the points out so `f` runs without the transaction borrowed
            let (points, following) = self.with_index(|index, view| {
                let points = index
                    .segment(view, start)?
                    .as_slice()
                    .get(offset..)
                    .unwrap_or(&[])
                    .to_vec();
                index.release(start);
                Ok((points, index.next_start(start)))
            })?;

            for point in &points {
                if until.map_or(false, |end| point.timestamp > end) {
                    return Ok(count);
                }
                f(point);
                count += 1;
            }
            next = following.map(|start| (start, 0));
        }
        Ok(count)
    }
}

/// First point with a timestamp above `from`
fn next_after<const N: usize>(
    index: &mut SeriesIndex<N>,
    view: &TxView<'_>,
    from: Location,
) -> Result<Option<Location>> {
    let timestamp = from.point.timestamp;
    let start = match index.locate(timestamp) {
        Some(start) => start,
        None => return Ok(None),
    };

    let segment = index.segment(view, start)?;
    let mut i = segment.lower_bound(timestamp);
    if segment.get(i).map_or(false, |p| p.timestamp == timestamp) {
        i += 1;
    }
    if let Some(point) = segment.get(i) {
        return Ok(Some(Location { start, point: *point }));
    }

    match index.next_start(start) {
        Some(next) => Ok(index
            .segment(view, next)?
            .first()
            .map(|point| Location { start: next, point: *point })),
        None => Ok(None),
    }
}

/// Last point with a timestamp below `from`
fn previous_before<const N: usize>(
    index: &mut SeriesIndex<N>,
    view: &TxView<'_>,
    from: Location,
) -> Result<Option<Location>> {
    let timestamp = from.point.timestamp;
    let start = match index.locate(timestamp) {
        Some(start) => start,
        None => return Ok(None),
    };

    let segment = index.segment(view, start)?;
    let i = segment.lower_bound(timestamp);
    if i > 0 {
        return Ok(segment
            .get(i - 1)
            .map(|point| Location { start, point: *point }));
    }

    match index.prev_start(start) {
        Some(prev) => Ok(index
            .segment(view, prev)?
            .last()
            .map(|point| Location { start: prev, point: *point })),
        None => Ok(None),
    }
}

impl<const N: usize> Drop for Cursor<'_, '_, N> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.flush() {
            tracing::warn!("Failed to flush cursor on series {}: {}", self.series, e);
        }
    }
}

impl<const N: usize> fmt::Debug for Cursor<'_, '_, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("transaction", &self.tx.id())
            .field("series", &self.series)
            .field("position", &self.position)
            .finish()
    }
}
