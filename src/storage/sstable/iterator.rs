//! SSTable Iterator
//!
//! Walks the data block front to back. Used by compaction.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};

use parking_lot::MutexGuard;

use crate::error::Result;

use super::{EntryHeader, ENTRY_HEADER_SIZE, HEADER_SIZE};

/// Entries of one table in key order; holds the table's file lock
pub struct SSTableIterator<'a> {
    file: MutexGuard<'a, BufReader<File>>,
    /// Start of the index block
    end: u64,
    offset: u64,
}

impl<'a> SSTableIterator<'a> {
    pub(super) fn new(mut file: MutexGuard<'a, BufReader<File>>, end: u64) -> Result<Self> {
        file.seek(SeekFrom::Start(HEADER_SIZE))?;
        Ok(Self {
            file,
            end,
            offset: HEADER_SIZE,
        })
    }

    fn read_entry(&mut self) -> Result<(Vec<u8>, Option<Vec<u8>>)> {
        let mut prefix = [0u8; ENTRY_HEADER_SIZE];
        self.file.read_exact(&mut prefix)?;
        let header = EntryHeader::decode(&prefix);

        let mut key = vec![0u8; header.key_len];
        self.file.read_exact(&mut key)?;
        let value = match header.value_len {
            Some(len) => {
                let mut value = vec![0u8; len];
                self.file.read_exact(&mut value)?;
                Some(value)
            }
            None => None,
        };

        self.offset += header.entry_size();
        Ok((key, value))
    }
}

impl Iterator for SSTableIterator<'_> {
    /// `None` values are tombstones
    type Item = Result<(Vec<u8>, Option<Vec<u8>>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.end {
            return None;
        }
        let entry = self.read_entry();
        if entry.is_err() {
            // Nothing after a failed read can be trusted
            self.offset = self.end;
        }
        Some(entry)
    }
}
