//! WAL Reader
//!
//! Handles reading entries from the WAL file.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::Result;

use super::{WalEntry, HEADER_SIZE};

/// Reads entries from the WAL file
pub struct WalReader {
    reader: BufReader<File>,
    /// Offset of the next unread entry
    position: u64,
    file_len: u64,
    /// Set when the file ends inside an entry (torn write)
    partial_tail: bool,
}

impl WalReader {
    /// Open a WAL file for reading
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        Ok(Self {
            reader: BufReader::new(file),
            position: 0,
            file_len,
            partial_tail: false,
        })
    }

    /// Read the next entry from the WAL
    ///
    /// Returns `Ok(None)` at the end of the file, including when the file
    /// ends with an incomplete entry (see [`WalReader::has_partial_tail`]).
    /// A complete entry failing its checksum yields `Err(WalCorruption)`.
    pub fn next_entry(&mut self) -> Result<Option<WalEntry>> {
        let remaining = self.file_len - self.position;
        if remaining == 0 {
            return Ok(None);
        }
        if remaining < HEADER_SIZE as u64 {
            self.partial_tail = true;
            return Ok(None);
        }

        let mut header = [0u8; HEADER_SIZE];
        self.reader.read_exact(&mut header)?;
        let (_, _, len) = WalEntry::parse_header(&header);

        let entry_len = HEADER_SIZE as u64 + len as u64;
        if remaining < entry_len {
            self.partial_tail = true;
            return Ok(None);
        }

        let mut bytes = vec![0u8; entry_len as usize];
        bytes[..HEADER_SIZE].copy_from_slice(&header);
        self.reader.read_exact(&mut bytes[HEADER_SIZE..])?;
        self.position += entry_len;

        WalEntry::deserialize(&bytes).map(Some)
    }

    /// Offset just past the last entry read (valid or not)
    pub fn position(&self) -> u64 {
        self.position
    }

    /// True once the reader hit an incomplete trailing entry
    pub fn has_partial_tail(&self) -> bool {
        self.partial_tail
    }

    /// Iterate over all entries, stopping after the first error
    pub fn entries(self) -> WalIterator {
        WalIterator {
            reader: self,
            done: false,
        }
    }
}

/// Iterator over WAL entries
pub struct WalIterator {
    reader: WalReader,
    done: bool,
}

impl Iterator for WalIterator {
    type Item = Result<WalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
