//! Transactions
//!
//! A transaction pins a store snapshot and buffers its writes in a private
//! write set until commit. Cursors borrow the transaction, so it cannot be
//! committed or closed while one is still alive.
//!
//! ## Read path
//! ```text
//!   get(key) ──► write set ──► snapshot layers ──► SSTables
//! ```
//!
//! ## Modes
//! - `ReadOnly`: any number at a time, each on the snapshot current at begin
//! - `ReadWrite`: at most one per engine; holds the engine's writer gate
//!   until it commits, aborts or is dropped

use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use parking_lot::MutexGuard;

use crate::codec::{decode_series_header, encode_series_header};
use crate::cursor::Cursor;
use crate::error::{Result, TickError};
use crate::index::{SegmentStore, SeriesIndex};
use crate::keys::{next_series_key, series_key, StoreKey};
use crate::memtable::MemTable;
use crate::store::{Snapshot, Store};
use crate::types::SeriesId;

/// Access mode of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionMode {
    ReadWrite,
    ReadOnly,
}

impl fmt::Display for TransactionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionMode::ReadWrite => write!(f, "read-write"),
            TransactionMode::ReadOnly => write!(f, "read-only"),
        }
    }
}

/// Per-transaction mutable state, shared by every cursor of the transaction
#[derive(Default)]
pub(crate) struct TxState<const N: usize> {
    /// Uncommitted writes
    pub(crate) writes: MemTable,
    /// Catalogues of the series opened so far
    pub(crate) series: HashMap<SeriesId, SeriesIndex<N>>,
}

/// The write set layered over the pinned snapshot
pub(crate) struct TxView<'a> {
    writes: &'a MemTable,
    snapshot: &'a Snapshot,
}

impl<'a> TxView<'a> {
    pub(crate) fn new(writes: &'a MemTable, snapshot: &'a Snapshot) -> Self {
        Self { writes, snapshot }
    }
}

impl TxView<'_> {
    /// Smallest live key at or after `start`
    fn first_live_key(&self, start: &[u8]) -> Option<Vec<u8>> {
        let mut from = start.to_vec();
        loop {
            let own = self.writes.first_key(&from);
            let committed = self.snapshot.first_key(&from);
            let (key, tombstone) = match (own, committed) {
                (Some(own), Some(committed)) if committed.0 < own.0 => committed,
                (Some(own), _) => own,
                (None, committed) => committed?,
            };
            if !tombstone {
                return Some(key);
            }
            from = key;
            from.push(0);
        }
    }
}

impl SegmentStore for TxView<'_> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.writes.get(key) {
            Some(entry) => Ok(entry.into_value()),
            None => self.snapshot.get(key),
        }
    }

    fn range_keys(&self, start: &[u8], end: &[u8]) -> Result<Vec<Vec<u8>>> {
        let mut keys: BTreeSet<Vec<u8>> =
            self.snapshot.range_keys(start, end).into_iter().collect();
        for (key, tombstone) in self.writes.range_keys(start, end) {
            if tombstone {
                keys.remove(&key);
            } else {
                keys.insert(key);
            }
        }
        Ok(keys.into_iter().collect())
    }
}

/// A read-only or read-write unit of work
pub struct Transaction<'e, const N: usize> {
    store: &'e Store,
    id: u64,
    mode: TransactionMode,
    snapshot: Arc<Snapshot>,
    state: RefCell<TxState<N>>,
    /// Writer gate, held by read-write transactions only
    _writer: Option<MutexGuard<'e, ()>>,
    /// Set once any operation hit a storage failure; the transaction can
    /// then only be discarded
    failed: Cell<bool>,
    finished: bool,
}

impl<'e, const N: usize> Transaction<'e, N> {
    pub(crate) fn new(
        store: &'e Store,
        id: u64,
        mode: TransactionMode,
        writer: Option<MutexGuard<'e, ()>>,
    ) -> Self {
        let snapshot = store.snapshot();
        tracing::debug!(
            "Transaction {} began ({}, version {})",
            id,
            mode,
            snapshot.version()
        );
        Self {
            store,
            id,
            mode,
            snapshot,
            state: RefCell::new(TxState::default()),
            _writer: writer,
            failed: Cell::new(false),
            finished: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn mode(&self) -> TransactionMode {
        self.mode
    }

    pub fn is_read_only(&self) -> bool {
        self.mode == TransactionMode::ReadOnly
    }

    /// Store version this transaction reads from
    pub fn snapshot_version(&self) -> u64 {
        self.snapshot.version()
    }

    /// Open a cursor on `series`
    ///
    /// A read-write transaction creates the series on first use; a read-only
    /// one fails with `SeriesNotFound`.
    pub fn open_timeseries(&self, series: SeriesId) -> Result<Cursor<'_, 'e, N>> {
        self.ensure_usable()?;
        let opened = self.open_series(series);
        self.record(opened)?;
        Ok(Cursor::new(self, series))
    }

    /// True when `series` exists in this transaction's view
    pub fn contains_timeseries(&self, series: SeriesId) -> Result<bool> {
        self.ensure_usable()?;
        if self.state.borrow().series.contains_key(&series) {
            return Ok(true);
        }
        let state = self.state.borrow();
        let view = TxView::new(&state.writes, &self.snapshot);
        let header = self.record(view.get(&series_key(&series)))?;
        Ok(header.is_some())
    }

    /// Every series visible to this transaction, in id order
    ///
    /// Seeks from each series straight to the next one, so segment keys are
    /// never enumerated.
    pub fn timeseries_ids(&self) -> Result<Vec<SeriesId>> {
        self.ensure_usable()?;
        let state = self.state.borrow();
        let view = TxView::new(&state.writes, &self.snapshot);
        let mut ids = Vec::new();
        let mut from = Vec::new();
        while let Some(key) = view.first_live_key(&from) {
            let series = match self.record(StoreKey::decode(&key))? {
                StoreKey::Series(id) => {
                    ids.push(id);
                    id
                }
                StoreKey::Segment(segment) => segment.series,
            };
            match next_series_key(&series) {
                Some(next) => from = next,
                None => break,
            }
        }
        Ok(ids)
    }

    /// Persist every change made through this transaction
    ///
    /// Returns the store version the commit produced. Committing a read-only
    /// transaction only releases its snapshot.
    ///
    /// Fails with `TransactionAborted`, writing nothing, once an earlier
    /// operation of the transaction hit a storage failure.
    pub fn commit(mut self) -> Result<u64> {
        self.finished = true;
        if self.failed.get() {
            self.discard("aborted after a storage failure");
            return Err(TickError::TransactionAborted(self.id));
        }
        if self.is_read_only() {
            tracing::debug!("Transaction {} closed", self.id);
            return Ok(self.snapshot.version());
        }

        let state = self.state.take();
        let TxState { writes, mut series } = state;

        let mut segments = 0;
        for index in series.values_mut() {
            segments += index.flush(&writes)?;
        }

        let operations = writes.entry_count();
        let version = self.store.commit(writes)?;
        tracing::debug!(
            "Transaction {} committed version {} ({} series, {} segments, {} operations)",
            self.id,
            version,
            series.len(),
            segments,
            operations
        );
        Ok(version)
    }

    /// Discard every change made through this transaction
    pub fn abort(mut self) {
        self.finished = true;
        self.discard("aborted");
    }

    /// Release the transaction without committing
    ///
    /// Pending writes of a read-write transaction are discarded.
    pub fn close(mut self) {
        self.finished = true;
        self.discard("closed");
    }

    // =========================================================================
    // Crate-internal API (used by Cursor)
    // =========================================================================

    pub(crate) fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub(crate) fn state(&self) -> &RefCell<TxState<N>> {
        &self.state
    }

    /// True once an operation of this transaction hit a storage failure
    pub fn is_failed(&self) -> bool {
        self.failed.get()
    }

    pub(crate) fn ensure_usable(&self) -> Result<()> {
        if self.failed.get() {
            return Err(TickError::TransactionAborted(self.id));
        }
        Ok(())
    }

    /// Pass `result` through, failing the transaction on a storage failure
    pub(crate) fn record<R>(&self, result: Result<R>) -> Result<R> {
        if let Err(e) = &result {
            if e.is_storage_failure() && !self.failed.replace(true) {
                tracing::warn!(
                    "Transaction {} failed and must be retried: {}",
                    self.id,
                    e
                );
            }
        }
        result
    }

    pub(crate) fn ensure_writable(&self) -> Result<()> {
        if self.is_read_only() {
            return Err(TickError::InvalidOperation(format!(
                "Transaction {} is read-only",
                self.id
            )));
        }
        Ok(())
    }

    /// Make `series` available to cursors, creating it when writable
    pub(crate) fn open_series(&self, series: SeriesId) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.series.contains_key(&series) {
            return Ok(());
        }

        let TxState { writes, series: catalogues } = &mut *state;
        let view = TxView::new(writes, &self.snapshot);
        let header_key = series_key(&series);

        match view.get(&header_key)? {
            Some(header) => {
                let capacity = decode_series_header(&header)?;
                if capacity != N {
                    return Err(TickError::Corruption(format!(
                        "Series {} was written with segment capacity {}, engine uses {}",
                        series, capacity, N
                    )));
                }
            }
            None => {
                if self.is_read_only() {
                    return Err(TickError::SeriesNotFound(series));
                }
                writes.put(header_key, encode_series_header(N));
                tracing::debug!("Transaction {} created series {}", self.id, series);
            }
        }

        let index = SeriesIndex::load(&TxView::new(writes, &self.snapshot), series)?;
        catalogues.insert(series, index);
        Ok(())
    }

    fn discard(&self, verb: &str) {
        let state = self.state.borrow();
        if state.writes.is_empty() && !state.series.values().any(|index| index.is_dirty()) {
            tracing::debug!("Transaction {} {}", self.id, verb);
        } else {
            tracing::debug!(
                "Transaction {} {}, discarding {} pending writes",
                self.id,
                verb,
                state.writes.entry_count()
            );
        }
    }
}

impl<const N: usize> Drop for Transaction<'_, N> {
    fn drop(&mut self) {
        if !self.finished {
            self.discard("dropped");
        }
    }
}

impl<const N: usize> fmt::Debug for Transaction<'_, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("version", &self.snapshot.version())
            .finish()
    }
}
