//! SSTable Module
//!
//! Immutable sorted tables written when committed layers leave memory.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Header (14 bytes)                                       │
//! │   Magic: "TVSS" (4) | Version: u16 (2) | Count: u64 (8) │
//! ├─────────────────────────────────────────────────────────┤
//! │ Data Block                                              │
//! │   [KeyLen: u32][ValLen: u32][Key][Value] per entry      │
//! │   ValLen = u32::MAX marks a tombstone (no value bytes)  │
//! ├─────────────────────────────────────────────────────────┤
//! │ Index Block                                             │
//! │   [KeyLen: u32][Offset: u64][Tombstone: u8][Key]        │
//! ├─────────────────────────────────────────────────────────┤
//! │ Footer (16 bytes)                                       │
//! │   IndexOffset: u64 | DataCRC: u32 | Reserved (4)        │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! The tombstone flag in the index lets key scans skip deleted entries
//! without touching the data block.

mod builder;
mod iterator;
mod reader;

use std::path::PathBuf;

use bytes::{Buf, BufMut};

pub use builder::SSTableBuilder;
pub use iterator::SSTableIterator;
pub use reader::SSTableReader;

pub(crate) const MAGIC: &[u8; 4] = b"TVSS";
pub(crate) const VERSION: u16 = 2;

pub(crate) const HEADER_SIZE: u64 = 14;
pub(crate) const FOOTER_SIZE: u64 = 16;

/// Offset of the entry count inside the header
pub(crate) const COUNT_OFFSET: u64 = 6;

/// Size of the `[KeyLen][ValLen]` prefix of a data entry
pub(crate) const ENTRY_HEADER_SIZE: usize = 8;

/// Fixed part of an index record: KeyLen + Offset + Tombstone
pub(crate) const INDEX_RECORD_SIZE: usize = 13;

const TOMBSTONE_MARKER: u32 = u32::MAX;

/// Length prefix of one data entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EntryHeader {
    pub key_len: usize,
    /// `None` for a tombstone
    pub value_len: Option<usize>,
}

impl EntryHeader {
    pub fn decode(mut bytes: &[u8]) -> Self {
        let key_len = bytes.get_u32_le() as usize;
        let value_len = match bytes.get_u32_le() {
            TOMBSTONE_MARKER => None,
            len => Some(len as usize),
        };
        Self { key_len, value_len }
    }

    /// Bytes the whole entry occupies in the data block
    pub fn entry_size(&self) -> u64 {
        (ENTRY_HEADER_SIZE + self.key_len + self.value_len.unwrap_or(0)) as u64
    }
}

/// Append one data entry to `buf`
pub(crate) fn encode_entry(buf: &mut Vec<u8>, key: &[u8], value: Option<&[u8]>) {
    buf.put_u32_le(key.len() as u32);
    buf.put_u32_le(value.map_or(TOMBSTONE_MARKER, |v| v.len() as u32));
    buf.put_slice(key);
    if let Some(value) = value {
        buf.put_slice(value);
    }
}

/// Metadata of a freshly built table
#[derive(Debug, Clone)]
pub struct SSTable {
    pub path: PathBuf,
    pub entry_count: u64,
    /// Smallest key, empty when the table is empty
    pub min_key: Vec<u8>,
    pub max_key: Vec<u8>,
    pub file_size: u64,
}

impl SSTable {
    /// False when `key` lies outside `[min_key, max_key]`
    pub fn might_contain(&self, key: &[u8]) -> bool {
        self.entry_count > 0 && key >= self.min_key.as_slice() && key <= self.max_key.as_slice()
    }
}
