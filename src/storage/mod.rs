//! Storage Module
//!
//! Persistent storage layer using SSTable-like format.
//!
//! ## Responsibilities
//! - Persist committed data to disk in sorted format
//! - Point lookups and range scans over immutable tables
//! - Full compaction of all tables into one
//!
//! Readers are reference counted: a snapshot keeps every table it was built
//! from readable even after compaction replaced it.

mod manager;
mod sstable;

pub use manager::StorageManager;
pub use sstable::{SSTable, SSTableBuilder, SSTableIterator, SSTableReader};
