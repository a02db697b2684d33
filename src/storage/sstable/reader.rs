//! SSTable Reader
//!
//! Opens SSTable files and provides O(log n) key lookups via in-memory index.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::ops::Bound;
use std::path::{Path, PathBuf};

use bytes::Buf;
use parking_lot::Mutex;

use crate::error::{Result, TickError};

use super::iterator::SSTableIterator;
use super::{
    EntryHeader, ENTRY_HEADER_SIZE, FOOTER_SIZE, HEADER_SIZE, INDEX_RECORD_SIZE, MAGIC, VERSION,
};

/// Location of one entry in the data block
#[derive(Debug, Clone, Copy)]
struct IndexEntry {
    offset: u64,
    tombstone: bool,
}

/// Reader for SSTable files with in-memory index for O(log n) lookups
///
/// The file handle sits behind a mutex so one reader can be shared by every
/// snapshot that references the table.
pub struct SSTableReader {
    path: PathBuf,
    /// File handle for reading entries
    file: Mutex<BufReader<File>>,
    /// In-memory index: key → entry location
    index: BTreeMap<Vec<u8>, IndexEntry>,
    /// Metadata
    entry_count: u64,
    /// Index block starting offset (for iteration)
    index_offset: u64,
    file_size: u64,
}

impl SSTableReader {
    /// Open an SSTable for reading
    ///
    /// Verifies the data block checksum and loads the entire index into
    /// memory for fast lookups.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;
        let file_size = file.metadata()?.len();

        if file_size < HEADER_SIZE + FOOTER_SIZE {
            return Err(TickError::Corruption(format!(
                "SSTable {} is too short ({} bytes)",
                path.display(),
                file_size
            )));
        }

        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)?;
        let mut fields = &header[..];

        let magic = fields.copy_to_bytes(MAGIC.len());
        if magic.as_ref() != MAGIC {
            return Err(TickError::Storage(format!(
                "{} is not an SSTable (magic {:?})",
                path.display(),
                magic.as_ref()
            )));
        }
        let version = fields.get_u16_le();
        if version != VERSION {
            return Err(TickError::Storage(format!(
                "Unsupported SSTable version: {}",
                version
            )));
        }
        let entry_count = fields.get_u64_le();

        file.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;
        let mut footer = [0u8; FOOTER_SIZE as usize];
        file.read_exact(&mut footer)?;
        let mut fields = &footer[..];
        let index_offset = fields.get_u64_le();
        let data_crc = fields.get_u32_le();

        if index_offset < HEADER_SIZE || index_offset > file_size - FOOTER_SIZE {
            return Err(TickError::Corruption(format!(
                "SSTable {} has index offset {} outside the file",
                path.display(),
                index_offset
            )));
        }

        file.seek(SeekFrom::Start(HEADER_SIZE))?;
        let actual_crc = checksum(&mut file, index_offset - HEADER_SIZE)?;
        if actual_crc != data_crc {
            return Err(TickError::Corruption(format!(
                "SSTable {} data checksum mismatch: expected {:#010x}, got {:#010x}",
                path.display(),
                data_crc,
                actual_crc
            )));
        }

        let index_block_size = file_size - FOOTER_SIZE - index_offset;
        let mut index_data = vec![0u8; index_block_size as usize];
        file.seek(SeekFrom::Start(index_offset))?;
        file.read_exact(&mut index_data)?;

        let index = parse_index(&index_data, path)?;
        if index.len() as u64 != entry_count {
            return Err(TickError::Corruption(format!(
                "SSTable {} header counts {} entries, index holds {}",
                path.display(),
                entry_count,
                index.len()
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(BufReader::new(file)),
            index,
            entry_count,
            index_offset,
            file_size,
        })
    }

    /// Get a value by key through the in-memory index
    ///
    /// Returns:
    /// - `Ok(Some(value))`: key found with value
    /// - `Ok(None)`: key found but is a tombstone (deleted)
    /// - `Err(KeyNotFound)`: key not in this SSTable
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let entry = match self.index.get(key) {
            Some(entry) => *entry,
            None => return Err(TickError::KeyNotFound),
        };

        if entry.tombstone {
            return Ok(None);
        }

        let mut file = self.file.lock();
        read_value_at(&mut file, entry.offset)
    }

    /// Entries with keys in `[start, end]`; `None` values are tombstones
    pub fn range(&self, start: &[u8], end: &[u8]) -> Result<Vec<(Vec<u8>, Option<Vec<u8>>)>> {
        if start > end {
            return Ok(Vec::new());
        }
        let mut file = self.file.lock();
        let mut entries = Vec::new();
        for (key, entry) in self
            .index
            .range::<[u8], _>((Bound::Included(start), Bound::Included(end)))
        {
            let value = if entry.tombstone {
                None
            } else {
                read_value_at(&mut file, entry.offset)?
            };
            entries.push((key.clone(), value));
        }
        Ok(entries)
    }

    /// Smallest key at or after `start` with its tombstone flag
    pub fn first_key(&self, start: &[u8]) -> Option<(Vec<u8>, bool)> {
        self.index
            .range::<[u8], _>((Bound::Included(start), Bound::Unbounded))
            .next()
            .map(|(key, entry)| (key.clone(), entry.tombstone))
    }

    /// Keys in `[start, end]` with their tombstone flag, answered from the
    /// in-memory index
    pub fn range_keys(&self, start: &[u8], end: &[u8]) -> Vec<(Vec<u8>, bool)> {
        if start > end {
            return Vec::new();
        }
        self.index
            .range::<[u8], _>((Bound::Included(start), Bound::Included(end)))
            .map(|(key, entry)| (key.clone(), entry.tombstone))
            .collect()
    }

    /// Get entry count
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the minimum key in this SSTable (for range filtering)
    pub fn min_key(&self) -> Option<&[u8]> {
        self.index.keys().next().map(|k| k.as_slice())
    }

    /// Get the maximum key in this SSTable (for range filtering)
    pub fn max_key(&self) -> Option<&[u8]> {
        self.index.keys().next_back().map(|k| k.as_slice())
    }

    /// Quick check if a key might be in this SSTable (range check)
    /// Returns false only if the key is definitely outside [min_key, max_key]
    pub fn might_contain(&self, key: &[u8]) -> bool {
        match (self.min_key(), self.max_key()) {
            (Some(min), Some(max)) => key >= min && key <= max,
            _ => false, // Empty SSTable
        }
    }

    /// Create an iterator over all entries (for compaction, debugging)
    ///
    /// Holds the file lock until dropped.
    pub fn iter(&self) -> Result<SSTableIterator<'_>> {
        SSTableIterator::new(self.file.lock(), self.index_offset)
    }
}

impl std::fmt::Debug for SSTableReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SSTableReader")
            .field("path", &self.path)
            .field("entry_count", &self.entry_count)
            .finish()
    }
}

// =============================================================================
// Private Helpers
// =============================================================================

/// Read the value of the entry starting at `offset`
fn read_value_at(file: &mut BufReader<File>, offset: u64) -> Result<Option<Vec<u8>>> {
    file.seek(SeekFrom::Start(offset))?;
    let mut prefix = [0u8; ENTRY_HEADER_SIZE];
    file.read_exact(&mut prefix)?;
    let header = EntryHeader::decode(&prefix);

    let value_len = match header.value_len {
        Some(len) => len,
        None => return Ok(None),
    };
    file.seek(SeekFrom::Current(header.key_len as i64))?;
    let mut value = vec![0u8; value_len];
    file.read_exact(&mut value)?;
    Ok(Some(value))
}

fn parse_index(mut data: &[u8], path: &Path) -> Result<BTreeMap<Vec<u8>, IndexEntry>> {
    let truncated = || {
        TickError::Corruption(format!("SSTable {} has a truncated index", path.display()))
    };

    let mut index = BTreeMap::new();
    while data.has_remaining() {
        if data.remaining() < INDEX_RECORD_SIZE {
            return Err(truncated());
        }
        let key_len = data.get_u32_le() as usize;
        let offset = data.get_u64_le();
        let tombstone = data.get_u8() != 0;
        if data.remaining() < key_len {
            return Err(truncated());
        }
        let key = data.copy_to_bytes(key_len).to_vec();
        index.insert(key, IndexEntry { offset, tombstone });
    }
    Ok(index)
}

/// CRC32 over the next `len` bytes of `file`
fn checksum(file: &mut File, len: u64) -> Result<u32> {
    let mut hasher = crc32fast::Hasher::new();
    let mut remaining = len;
    let mut buf = vec![0u8; 64 * 1024];
    while remaining > 0 {
        let chunk = remaining.min(buf.len() as u64) as usize;
        file.read_exact(&mut buf[..chunk])?;
        hasher.update(&buf[..chunk]);
        remaining -= chunk as u64;
    }
    Ok(hasher.finalize())
}
