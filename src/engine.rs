//! Engine Module
//!
//! Top-level handle: opens the backing store and issues transactions.
//!
//! ## Responsibilities
//! - Open or create the database directory
//! - Enforce a single read-write transaction at a time
//! - Hand out snapshot-isolated read-only transactions
//! - Expose store maintenance (flush, compaction, stats)

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::config::Config;
use crate::error::Result;
use crate::store::Store;
use crate::transaction::{Transaction, TransactionMode};

/// Number of points per segment unless chosen otherwise
pub const DEFAULT_SEGMENT_SIZE: usize = 8100;

/// Options accepted by [`Engine::open`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Directory holding the database files
    pub database_directory: PathBuf,
    /// Create the database when the directory holds none
    pub create: bool,
}

impl EngineOptions {
    /// Options for `database_directory`, creating the database if missing
    pub fn new(database_directory: impl Into<PathBuf>) -> Self {
        Self {
            database_directory: database_directory.into(),
            create: true,
        }
    }

    pub fn create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    /// Full configuration with defaults for everything else
    pub fn into_config(self) -> Config {
        Config::builder()
            .data_dir(self.database_directory)
            .create(self.create)
            .build()
    }
}

/// Point-in-time statistics of an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineStats {
    /// Number of commits in the current snapshot
    pub version: u64,
    /// Committed layers still held in memory
    pub memtable_layers: usize,
    /// Approximate bytes held by those layers
    pub memtable_bytes: usize,
    pub sstables: usize,
}

impl fmt::Display for EngineStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "version={} memtable_layers={} memtable_bytes={} sstables={}",
            self.version, self.memtable_layers, self.memtable_bytes, self.sstables
        )
    }
}

/// The timeseries engine
///
/// `N` is the segment capacity. It is recorded with every series, so a
/// database must always be opened with the capacity it was written with.
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Read-write transactions**: Serialized by `writer`. The transaction
///   holds the gate until it commits, aborts or is dropped.
/// - **Read-only transactions**: Never block; each reads the snapshot
///   published by the last commit before it began.
pub struct Engine<const N: usize = DEFAULT_SEGMENT_SIZE> {
    store: Store,

    /// Held by the active read-write transaction
    writer: Mutex<()>,

    next_transaction_id: AtomicU64,
}

impl<const N: usize> Engine<N> {
    /// Open or create an engine
    pub fn new(options: EngineOptions) -> Result<Self> {
        Self::open(options)
    }

    /// Open or create an engine
    pub fn open(options: EngineOptions) -> Result<Self> {
        Self::with_config(options.into_config())
    }

    /// Open with a full configuration
    pub fn with_config(config: Config) -> Result<Self> {
        let store = Store::open(config)?;
        tracing::info!(
            "Engine open at {} (segment size {})",
            store.data_dir().display(),
            N
        );
        Ok(Self {
            store,
            writer: Mutex::new(()),
            next_transaction_id: AtomicU64::new(1),
        })
    }

    /// Begin a transaction
    ///
    /// A read-write transaction waits for the active one, if any, to finish.
    pub fn begin_transaction(&self, mode: TransactionMode) -> Result<Transaction<'_, N>> {
        let writer = match mode {
            TransactionMode::ReadWrite => Some(self.writer.lock()),
            TransactionMode::ReadOnly => None,
        };
        Ok(Transaction::new(&self.store, self.next_id(), mode, writer))
    }

    /// Begin a read-only transaction
    pub fn begin_read(&self) -> Result<Transaction<'_, N>> {
        self.begin_transaction(TransactionMode::ReadOnly)
    }

    /// Begin a read-write transaction, waiting for the active one
    pub fn begin_write(&self) -> Result<Transaction<'_, N>> {
        self.begin_transaction(TransactionMode::ReadWrite)
    }

    /// Begin a read-write transaction unless one is already active
    pub fn try_begin_write(&self) -> Result<Option<Transaction<'_, N>>> {
        Ok(self.writer.try_lock().map(|writer| {
            Transaction::new(
                &self.store,
                self.next_id(),
                TransactionMode::ReadWrite,
                Some(writer),
            )
        }))
    }

    /// Move committed data from memory into an SSTable
    pub fn flush(&self) -> Result<()> {
        self.store.flush()
    }

    /// Merge every SSTable into one
    pub fn compact(&self) -> Result<()> {
        self.store.compact()
    }

    pub fn stats(&self) -> EngineStats {
        let snapshot = self.store.snapshot();
        EngineStats {
            version: snapshot.version(),
            memtable_layers: snapshot.layer_count(),
            memtable_bytes: snapshot.memtable_bytes(),
            sstables: snapshot.sstable_count(),
        }
    }

    /// Close the engine gracefully
    ///
    /// Flushes committed data and syncs the WAL.
    pub fn close(self) -> Result<()> {
        self.store.close()
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn data_dir(&self) -> &Path {
        self.store.data_dir()
    }

    pub fn config(&self) -> &Config {
        self.store.config()
    }

    /// Segment capacity of this engine
    pub const fn segment_size(&self) -> usize {
        N
    }

    fn next_id(&self) -> u64 {
        self.next_transaction_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl<const N: usize> fmt::Debug for Engine<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("store", &self.store)
            .field("segment_size", &N)
            .finish()
    }
}
