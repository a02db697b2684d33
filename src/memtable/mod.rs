//! MemTable Module
//!
//! Ordered in-memory table.
//!
//! ## Responsibilities
//! - Buffer a transaction's writes (the write set)
//! - Hold committed writes as an immutable snapshot layer until flushed
//! - Track size for flush triggers
//! - Ordered iteration and range scans for SSTable creation and lookups
//!
//! ## Data Structure Choice
//! BTreeMap wrapped in RwLock:
//! - Ordered keys (required for SSTable generation and range scans)
//! - Committed layers are shared read-only through `Arc`

mod table;

pub use table::{MemTable, MemTableIterator};

/// Entry stored in the MemTable
#[derive(Debug, Clone, PartialEq)]
pub enum MemTableEntry {
    /// A live value
    Value(Vec<u8>),

    /// A tombstone (deleted key)
    Tombstone,
}

impl MemTableEntry {
    pub fn is_tombstone(&self) -> bool {
        matches!(self, MemTableEntry::Tombstone)
    }

    /// The live value, `None` for a tombstone
    pub fn into_value(self) -> Option<Vec<u8>> {
        match self {
            MemTableEntry::Value(value) => Some(value),
            MemTableEntry::Tombstone => None,
        }
    }
}
