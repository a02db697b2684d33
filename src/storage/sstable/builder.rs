//! SSTable Builder
//!
//! Streams sorted entries into a new table file. The index block is kept in
//! memory and written by [`SSTableBuilder::finish`].

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytes::BufMut;

use crate::error::{Result, TickError};

use super::{encode_entry, SSTable, COUNT_OFFSET, HEADER_SIZE, INDEX_RECORD_SIZE, MAGIC, VERSION};

/// Index record for one written entry
struct IndexRecord {
    key: Vec<u8>,
    offset: u64,
    tombstone: bool,
}

/// Writes a new SSTable; keys must arrive in strictly ascending order
pub struct SSTableBuilder {
    path: PathBuf,
    writer: BufWriter<File>,
    index: Vec<IndexRecord>,
    /// Where the next entry starts
    offset: u64,
    hasher: crc32fast::Hasher,
    /// Reused encoding buffer
    scratch: Vec<u8>,
}

impl SSTableBuilder {
    /// Create the file and write its header
    pub fn new(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        let mut writer = BufWriter::new(file);

        // The count is patched in by `finish`
        let mut header = Vec::with_capacity(HEADER_SIZE as usize);
        header.put_slice(MAGIC);
        header.put_u16_le(VERSION);
        header.put_u64_le(0);
        writer.write_all(&header)?;

        Ok(Self {
            path: path.to_path_buf(),
            writer,
            index: Vec::new(),
            offset: HEADER_SIZE,
            hasher: crc32fast::Hasher::new(),
            scratch: Vec::new(),
        })
    }

    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.append(key, Some(value))
    }

    pub fn add_tombstone(&mut self, key: &[u8]) -> Result<()> {
        self.append(key, None)
    }

    fn append(&mut self, key: &[u8], value: Option<&[u8]>) -> Result<()> {
        if let Some(last) = self.index.last() {
            if key <= last.key.as_slice() {
                return Err(TickError::Storage(format!(
                    "SSTable key {:?} added out of order in {}",
                    key,
                    self.path.display()
                )));
            }
        }

        self.scratch.clear();
        encode_entry(&mut self.scratch, key, value);
        self.writer.write_all(&self.scratch)?;
        self.hasher.update(&self.scratch);

        self.index.push(IndexRecord {
            key: key.to_vec(),
            offset: self.offset,
            tombstone: value.is_none(),
        });
        self.offset += self.scratch.len() as u64;
        Ok(())
    }

    /// Write the index block and footer, then sync the file
    pub fn finish(mut self) -> Result<SSTable> {
        let index_offset = self.offset;

        let index_size: usize = self
            .index
            .iter()
            .map(|record| INDEX_RECORD_SIZE + record.key.len())
            .sum();
        let mut tail = Vec::with_capacity(index_size + super::FOOTER_SIZE as usize);
        for record in &self.index {
            tail.put_u32_le(record.key.len() as u32);
            tail.put_u64_le(record.offset);
            tail.put_u8(u8::from(record.tombstone));
            tail.put_slice(&record.key);
        }
        tail.put_u64_le(index_offset);
        tail.put_u32_le(self.hasher.finalize());
        tail.put_u32_le(0);
        self.writer.write_all(&tail)?;
        self.writer.flush()?;

        let entry_count = self.index.len() as u64;
        let mut file = self
            .writer
            .into_inner()
            .map_err(|e| TickError::Storage(format!("Failed to flush SSTable: {}", e)))?;
        file.seek(SeekFrom::Start(COUNT_OFFSET))?;
        file.write_all(&entry_count.to_le_bytes())?;
        file.sync_all()?;
        let file_size = file.metadata()?.len();

        let mut keys = self.index.into_iter().map(|record| record.key);
        let min_key = keys.next().unwrap_or_default();
        let max_key = keys.next_back().unwrap_or_else(|| min_key.clone());

        tracing::debug!(
            "Built SSTable {} ({} entries, {} bytes)",
            self.path.display(),
            entry_count,
            file_size
        );

        Ok(SSTable {
            path: self.path,
            entry_count,
            min_key,
            max_key,
            file_size,
        })
    }
}
