//! Store Module
//!
//! Ordered, transactional key-value store the timeseries layer runs on.
//!
//! ## Responsibilities
//! - Apply a transaction's write set atomically (one WAL entry per commit)
//! - Publish immutable snapshots for snapshot-isolated reads
//! - Flush committed layers to SSTables and compact them
//! - Recover committed data from the WAL on startup
//!
//! ## Layout on disk
//! ```text
//! {data_dir}/
//!   ├── wal.log          (write-ahead log)
//!   └── sstables/        (SSTable files)
//! ```
//!
//! ## Write path
//! ```text
//!  write set ──► WAL append (fsync) ──► new snapshot: [write set, layers..] + sstables
//!                                              │
//!                          layers > limit ──► merge layers ──► SSTable, truncate WAL
//!                                              │
//!                      sstables > max ──► full compaction
//! ```

mod snapshot;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::config::Config;
use crate::error::{Result, TickError};
use crate::memtable::{MemTable, MemTableEntry};
use crate::storage::StorageManager;
use crate::wal::{Operation, WalRecovery, WalWriter};

pub use snapshot::Snapshot;

/// The backing store
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Writes** (commit/flush/compact): Serialized by `write_lock`
/// - **Reads**: Lock-free on data. A reader clones the current
///   `Arc<Snapshot>` once and keeps reading it no matter what commits after.
pub struct Store {
    config: Config,

    /// Directory for all data files (SSTables)
    storage_dir: PathBuf,

    /// Write-ahead log for durability (exclusive access needed)
    wal: Mutex<WalWriter>,

    /// Persistent storage manager
    storage: StorageManager,

    /// The most recently published snapshot
    current: RwLock<Arc<Snapshot>>,

    /// Serializes commits and maintenance
    write_lock: Mutex<()>,
}

impl Store {
    // =========================================================================
    // Path Constants (relative to data_dir)
    // =========================================================================
    pub const WAL_FILENAME: &'static str = "wal.log";
    pub const SSTABLE_DIR: &'static str = "sstables";

    /// Open or create a store with the given config
    ///
    /// On startup:
    /// 1. Check for an existing database (required unless `config.create`)
    /// 2. Load existing SSTables
    /// 3. Recover committed entries from the WAL
    /// 4. Flush recovered data to an SSTable and truncate the WAL
    pub fn open(config: Config) -> Result<Self> {
        let storage_dir = config.data_dir.join(Self::SSTABLE_DIR);
        let wal_path = config.data_dir.join(Self::WAL_FILENAME);

        if !Self::exists(&config.data_dir)? {
            if !config.create {
                return Err(TickError::Config(format!(
                    "No database at {} and create is disabled",
                    config.data_dir.display()
                )));
            }
            tracing::info!("Creating database at {}", config.data_dir.display());
        }

        fs::create_dir_all(&config.data_dir)?;
        fs::create_dir_all(&storage_dir)?;

        let storage = StorageManager::open(&storage_dir)?;

        if wal_path.exists() {
            let (entries, result) = WalRecovery::recover(&wal_path)?;

            if result.entries_recovered > 0 || result.entries_corrupted > 0 {
                tracing::info!(
                    "WAL recovery: {} entries recovered, {} corrupted, last_lsn={}",
                    result.entries_recovered,
                    result.entries_corrupted,
                    result.last_lsn
                );
            }

            let recovered = MemTable::new();
            for entry in entries {
                for operation in entry.operations {
                    match operation {
                        Operation::Put { key, value } => recovered.put(key, value),
                        Operation::Delete { key } => recovered.delete(key),
                    };
                }
            }

            // Make recovered data durable in an SSTable before the WAL goes
            if !recovered.is_empty() {
                tracing::info!(
                    "Flushing {} recovered entries to SSTable",
                    recovered.entry_count()
                );
                storage.flush(&recovered)?;
            }
        }

        let mut wal = WalWriter::open(&wal_path, config.wal_sync_strategy)?;
        wal.truncate()?;

        let snapshot = Snapshot::new(0, Vec::new(), storage.sstables());

        tracing::debug!(
            "Store open at {} with {} SSTables",
            config.data_dir.display(),
            snapshot.sstable_count()
        );

        Ok(Self {
            config,
            storage_dir,
            wal: Mutex::new(wal),
            storage,
            current: RwLock::new(Arc::new(snapshot)),
            write_lock: Mutex::new(()),
        })
    }

    /// True when `data_dir` already holds a database
    pub fn exists(data_dir: &Path) -> Result<bool> {
        if data_dir.join(Self::WAL_FILENAME).exists() {
            return Ok(true);
        }
        StorageManager::has_sstables(&data_dir.join(Self::SSTABLE_DIR))
    }

    /// The current snapshot
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current.read())
    }

    /// Atomically apply a write set, returning the version it produced
    ///
    /// The write set becomes visible to snapshots taken after this returns.
    /// An empty write set commits nothing and returns the current version.
    /// Once the WAL append succeeds the commit succeeds; a failing automatic
    /// flush is logged and retried by the next commit or `flush`.
    pub fn commit(&self, writes: MemTable) -> Result<u64> {
        let _write_guard = self.write_lock.lock();

        let current = self.snapshot();
        if writes.is_empty() {
            return Ok(current.version());
        }

        // Step 1: Write to WAL first (durability guarantee)
        let operations: Vec<Operation> = writes
            .iter()
            .map(|(key, entry)| match entry {
                MemTableEntry::Value(value) => Operation::Put { key, value },
                MemTableEntry::Tombstone => Operation::Delete { key },
            })
            .collect();
        let operation_count = operations.len();
        let lsn = self.wal.lock().append(operations)?;

        // Step 2: Publish the write set as the newest layer
        let version = current.version() + 1;
        let mut layers = Vec::with_capacity(current.layer_count() + 1);
        layers.push(Arc::new(writes));
        layers.extend(current.layers().iter().cloned());
        let snapshot = Snapshot::new(version, layers, current.sstables().to_vec());
        let memtable_bytes = snapshot.memtable_bytes();
        *self.current.write() = Arc::new(snapshot);

        tracing::debug!(
            "Committed version {} ({} operations, LSN {})",
            version,
            operation_count,
            lsn
        );

        // Step 3: Check if flush is needed. The commit is already durable and
        // visible, so a failed flush stays pending for the next attempt.
        if memtable_bytes >= self.config.memtable_size_limit {
            if let Err(e) = self.flush_internal() {
                tracing::warn!("Flush after version {} failed, retrying later: {}", version, e);
            }
        }

        Ok(version)
    }

    /// Flush committed layers to disk
    ///
    /// Forces a flush regardless of their size
    pub fn flush(&self) -> Result<()> {
        let _write_guard = self.write_lock.lock();
        self.flush_internal()
    }

    /// Merge all SSTables into one
    pub fn compact(&self) -> Result<()> {
        let _write_guard = self.write_lock.lock();
        self.compact_internal()
    }

    /// Close the store gracefully
    ///
    /// Flushes any pending data and syncs to disk
    pub fn close(self) -> Result<()> {
        let _write_guard = self.write_lock.lock();
        self.flush_internal()?;
        self.wal.lock().sync()?;
        tracing::debug!("Store at {} closed", self.config.data_dir.display());
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Get the storage directory path (where SSTables are stored)
    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Get the WAL file path
    pub fn wal_path(&self) -> PathBuf {
        self.config.data_dir.join(Self::WAL_FILENAME)
    }

    /// Get the number of SSTables
    pub fn sstable_count(&self) -> usize {
        self.storage.sstable_count()
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    // =========================================================================
    // Private Helpers (called with write lock held)
    // =========================================================================

    fn flush_internal(&self) -> Result<()> {
        let current = self.snapshot();
        if current.layer_count() == 0 {
            return Ok(());
        }

        // Step 1: Merge layers oldest → newest so newer writes win
        let merged = MemTable::new();
        for layer in current.layers().iter().rev() {
            merged.merge_from(layer);
        }
        tracing::debug!(
            "Flushing {} layers ({} entries)",
            current.layer_count(),
            merged.entry_count()
        );

        // Step 2: Write the SSTable
        self.storage.flush(&merged)?;

        // Step 3: Swap layers for the table; visible data is unchanged
        *self.current.write() = Arc::new(Snapshot::new(
            current.version(),
            Vec::new(),
            self.storage.sstables(),
        ));

        // Step 4: Truncate WAL (entries are now durable in SSTable)
        self.wal.lock().truncate()?;

        if self.storage.sstable_count() > self.config.max_sstables {
            self.compact_internal()?;
        }

        Ok(())
    }

    fn compact_internal(&self) -> Result<()> {
        if self.storage.sstable_count() < 2 {
            return Ok(());
        }

        // Flushed layers only live in SSTables, so compaction sees everything
        // committed before the last flush; newer layers stay on top.
        self.storage.compact()?;

        let current = self.snapshot();
        *self.current.write() = Arc::new(Snapshot::new(
            current.version(),
            current.layers().to_vec(),
            self.storage.sstables(),
        ));
        Ok(())
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("data_dir", &self.config.data_dir)
            .field("version", &self.snapshot().version())
            .field("sstables", &self.storage.sstable_count())
            .finish()
    }
}
