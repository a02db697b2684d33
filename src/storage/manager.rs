//! Storage Manager
//!
//! Owns the SSTable directory: discovers tables on open, writes a new table
//! per flushed layer and folds everything into one table on compaction.
//!
//! Files are named `sstable_{id:06}.sst`; a higher id is a newer table.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{Result, TickError};
use crate::memtable::{MemTable, MemTableEntry};

use super::{SSTable, SSTableBuilder, SSTableReader};

const FILE_PREFIX: &str = "sstable_";
const FILE_EXTENSION: &str = "sst";

fn table_path(dir: &Path, id: u64) -> PathBuf {
    dir.join(format!("{}{:06}.{}", FILE_PREFIX, id, FILE_EXTENSION))
}

/// "sstable_000042.sst" → Some(42)
fn table_id(path: &Path) -> Option<u64> {
    if path.extension()? != FILE_EXTENSION {
        return None;
    }
    path.file_stem()?
        .to_str()?
        .strip_prefix(FILE_PREFIX)?
        .parse()
        .ok()
}

/// The set of live SSTables
///
/// Readers are handed out as `Arc`s, newest first. Lookups go through those
/// handles and never take the list lock.
pub struct StorageManager {
    data_dir: PathBuf,
    sstables: RwLock<Vec<Arc<SSTableReader>>>,
    next_sstable_id: AtomicU64,
}

impl StorageManager {
    /// Open the table directory, creating it if needed
    ///
    /// Every table found is opened, which verifies its checksum; a damaged
    /// table fails the open.
    pub fn open(path: &Path) -> Result<Self> {
        fs::create_dir_all(path)?;

        let mut ids = Vec::new();
        for entry in fs::read_dir(path)? {
            let file = entry?.path();
            if let Some(id) = table_id(&file).filter(|_| file.is_file()) {
                ids.push(id);
            }
        }
        ids.sort_unstable_by(|a, b| b.cmp(a));

        let sstables = ids
            .iter()
            .map(|&id| SSTableReader::open(&table_path(path, id)).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;
        let next_id = ids.first().map_or(1, |&newest| newest + 1);

        tracing::debug!(
            "Opened storage at {} with {} SSTables",
            path.display(),
            sstables.len()
        );

        Ok(Self {
            data_dir: path.to_path_buf(),
            sstables: RwLock::new(sstables),
            next_sstable_id: AtomicU64::new(next_id),
        })
    }

    /// Write `memtable` to a new table, which becomes the newest
    pub fn flush(&self, memtable: &MemTable) -> Result<Arc<SSTableReader>> {
        if memtable.is_empty() {
            return Err(TickError::Storage(
                "Cannot flush an empty memtable".to_string(),
            ));
        }

        let (reader, table) = self.write_table(memtable.iter().map(|(key, entry)| {
            let value = match entry {
                MemTableEntry::Value(value) => Some(value),
                MemTableEntry::Tombstone => None,
            };
            (key, value)
        }))?;
        self.sstables.write().insert(0, Arc::clone(&reader));

        tracing::info!(
            "Flushed {} entries to {} ({} bytes)",
            table.entry_count,
            table.path.display(),
            table.file_size
        );
        Ok(reader)
    }

    /// Merge every table into one and delete the replaced files
    ///
    /// Newer entries shadow older ones and tombstones are dropped, as no
    /// older table is left for them to hide. Returns `None` when nothing
    /// survives. Readers of the replaced tables stay usable.
    pub fn compact(&self) -> Result<Option<Arc<SSTableReader>>> {
        let inputs = self.sstables();
        if inputs.is_empty() {
            return Ok(None);
        }

        // Oldest first, so later inserts win
        let mut merged: BTreeMap<Vec<u8>, Option<Vec<u8>>> = BTreeMap::new();
        for reader in inputs.iter().rev() {
            for entry in reader.iter()? {
                let (key, value) = entry?;
                merged.insert(key, value);
            }
        }
        merged.retain(|_, value| value.is_some());

        let output = if merged.is_empty() {
            None
        } else {
            let live = merged.len();
            let (reader, table) = self.write_table(merged.into_iter())?;
            tracing::info!(
                "Compacted {} SSTables into {} ({} live entries)",
                inputs.len(),
                table.path.display(),
                live
            );
            Some(reader)
        };

        {
            let mut sstables = self.sstables.write();
            sstables.retain(|current| !inputs.iter().any(|old| Arc::ptr_eq(old, current)));
            sstables.extend(output.iter().cloned());
        }

        for reader in &inputs {
            match fs::remove_file(reader.path()) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
                _ => {}
            }
        }
        if output.is_none() {
            tracing::info!("Compacted {} SSTables, nothing left live", inputs.len());
        }

        Ok(output)
    }

    /// Open readers, newest first
    pub fn sstables(&self) -> Vec<Arc<SSTableReader>> {
        self.sstables.read().clone()
    }

    pub fn sstable_count(&self) -> usize {
        self.sstables.read().len()
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Id the next table will receive
    pub fn next_sstable_id(&self) -> u64 {
        self.next_sstable_id.load(Ordering::SeqCst)
    }

    /// True when `dir` holds at least one SSTable file
    pub fn has_sstables(dir: &Path) -> Result<bool> {
        if !dir.is_dir() {
            return Ok(false);
        }
        for entry in fs::read_dir(dir)? {
            if table_id(&entry?.path()).is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Build a table from sorted entries (`None` = tombstone) and open it
    fn write_table(
        &self,
        entries: impl Iterator<Item = (Vec<u8>, Option<Vec<u8>>)>,
    ) -> Result<(Arc<SSTableReader>, SSTable)> {
        let id = self.next_sstable_id.fetch_add(1, Ordering::SeqCst);
        let path = table_path(&self.data_dir, id);

        let mut builder = SSTableBuilder::new(&path)?;
        for (key, value) in entries {
            match value {
                Some(value) => builder.add(&key, &value)?,
                None => builder.add_tombstone(&key)?,
            }
        }
        let table = builder.finish()?;
        let reader = Arc::new(SSTableReader::open(&path)?);
        Ok((reader, table))
    }
}

impl std::fmt::Debug for StorageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageManager")
            .field("data_dir", &self.data_dir)
            .field("sstables", &self.sstable_count())
            .finish()
    }
}
