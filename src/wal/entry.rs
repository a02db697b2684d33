//! WAL Entry definitions
//!
//! Defines the structure of individual WAL log entries.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TickError};

/// Entry header: LSN (8) + CRC (4) + Len (4)
pub const HEADER_SIZE: usize = 16;

/// A single entry in the WAL: the writes of one committed transaction
#[derive(Debug, Clone, PartialEq)]
pub struct WalEntry {
    /// Log Sequence Number - monotonically increasing
    pub lsn: u64,

    /// The operations of the transaction, in application order
    pub operations: Vec<Operation>,

    /// Timestamp (unix millis) when entry was created
    pub timestamp: u64,
}

/// Operations that can be logged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    /// Put a key-value pair
    Put { key: Vec<u8>, value: Vec<u8> },

    /// Delete a key
    Delete { key: Vec<u8> },
}

#[derive(Serialize)]
struct BodyRef<'a> {
    operations: &'a [Operation],
    timestamp: u64,
}

#[derive(Deserialize)]
struct Body {
    operations: Vec<Operation>,
    timestamp: u64,
}

impl WalEntry {
    /// Create an entry stamped with the current time
    pub fn new(lsn: u64, operations: Vec<Operation>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        Self {
            lsn,
            operations,
            timestamp,
        }
    }

    /// Serialize to `[LSN][CRC][Len][Data]`
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let data = bincode::serialize(&BodyRef {
            operations: &self.operations,
            timestamp: self.timestamp,
        })
        .map_err(|e| TickError::Serialization(e.to_string()))?;

        let len = u32::try_from(data.len()).map_err(|_| {
            TickError::WalWrite(format!("WAL entry of {} bytes is too large", data.len()))
        })?;
        let crc = Self::compute_crc(self.lsn, &data);

        let mut bytes = Vec::with_capacity(HEADER_SIZE + data.len());
        bytes.extend_from_slice(&self.lsn.to_le_bytes());
        bytes.extend_from_slice(&crc.to_le_bytes());
        bytes.extend_from_slice(&len.to_le_bytes());
        bytes.extend_from_slice(&data);
        Ok(bytes)
    }

    /// Deserialize one entry from the start of `bytes`, verifying its CRC
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(TickError::WalCorruption(format!(
                "Entry truncated: {} bytes, header needs {}",
                bytes.len(),
                HEADER_SIZE
            )));
        }

        let (lsn, crc, len) = Self::parse_header(&bytes[..HEADER_SIZE]);
        let end = HEADER_SIZE + len as usize;
        if bytes.len() < end {
            return Err(TickError::WalCorruption(format!(
                "Entry truncated: {} bytes, expected {}",
                bytes.len(),
                end
            )));
        }

        let data = &bytes[HEADER_SIZE..end];
        let actual = Self::compute_crc(lsn, data);
        if actual != crc {
            return Err(TickError::WalCorruption(format!(
                "CRC mismatch at LSN {}: expected {:#010x}, got {:#010x}",
                lsn, crc, actual
            )));
        }

        let body: Body = bincode::deserialize(data)
            .map_err(|e| TickError::WalCorruption(format!("Undecodable entry at LSN {}: {}", lsn, e)))?;

        Ok(Self {
            lsn,
            operations: body.operations,
            timestamp: body.timestamp,
        })
    }

    /// Split a header into (lsn, crc, data length)
    pub(crate) fn parse_header(header: &[u8]) -> (u64, u32, u32) {
        let mut lsn = [0u8; 8];
        lsn.copy_from_slice(&header[0..8]);
        let mut crc = [0u8; 4];
        crc.copy_from_slice(&header[8..12]);
        let mut len = [0u8; 4];
        len.copy_from_slice(&header[12..16]);
        (
            u64::from_le_bytes(lsn),
            u32::from_le_bytes(crc),
            u32::from_le_bytes(len),
        )
    }

    /// CRC32 over the LSN and the data block
    pub fn compute_crc(lsn: u64, data: &[u8]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&lsn.to_le_bytes());
        hasher.update(data);
        hasher.finalize()
    }
}
