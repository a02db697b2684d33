//! Error types for tickvault

use thiserror::Error;

use crate::types::SeriesId;

pub type Result<T> = std::result::Result<T, TickError>;

#[derive(Debug, Error)]
pub enum TickError {
    // -------------------------------------------------------------------------
    // Caller Errors
    // -------------------------------------------------------------------------
    #[error("Timeseries not found: {0}")]
    SeriesNotFound(SeriesId),

    /// The call is not allowed in the current state (e.g. an insert through
    /// a read-only transaction)
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Store Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAL corruption detected: {0}")]
    WalCorruption(String),

    #[error("WAL write failed: {0}")]
    WalWrite(String),

    #[error("Storage error: {0}")]
    Storage(String),

    /// Stored bytes do not decode (bad checksum, malformed segment, etc.)
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// Returned by a single SSTable lookup; never escapes the store
    #[error("Key not found")]
    KeyNotFound,

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An earlier operation of the transaction hit a storage failure; its
    /// writes were discarded
    #[error("Transaction {0} aborted after a storage failure")]
    TransactionAborted(u64),
}

impl TickError {
    /// Errors raised by the backing store. The transaction that observed one
    /// must be abandoned and retried by the caller.
    pub fn is_storage_failure(&self) -> bool {
        !matches!(
            self,
            TickError::SeriesNotFound(_)
                | TickError::InvalidOperation(_)
                | TickError::Config(_)
                | TickError::KeyNotFound
        )
    }
}
