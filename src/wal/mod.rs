//! Write-Ahead Log
//!
//! Every commit is appended here as one checksummed entry before it becomes
//! visible. On open, the log is replayed and then truncated once its
//! contents are safely in an SSTable.
//!
//! ## Entry Layout
//! ```text
//! ┌─────────┬─────────┬─────────┬──────────────────────────┐
//! │ LSN (8) │ CRC (4) │ Len (4) │ Data (Len bytes)         │
//! └─────────┴─────────┴─────────┴──────────────────────────┘
//! ```
//! `Data` is the bincode-encoded list of operations of one commit and the
//! CRC covers the LSN plus `Data`. A commit replays whole or not at all.
//! LSNs keep increasing across truncations of an open log.

mod entry;
mod reader;
mod recovery;
mod writer;

pub use entry::{Operation, WalEntry, HEADER_SIZE};
pub use reader::{WalIterator, WalReader};
pub use recovery::{RecoveryResult, WalRecovery};
pub use writer::WalWriter;
