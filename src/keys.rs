//! Store key encoding
//!
//! ## Key Layout
//! ```text
//! Series header:  ┌──────────────────────┐
//!                 │ SeriesId (16)        │
//!                 └──────────────────────┘
//! Segment:        ┌──────────────────────┬──────────────────────────┐
//!                 │ SeriesId (16)        │ Start timestamp (8, BE)  │
//!                 └──────────────────────┴──────────────────────────┘
//! ```
//!
//! Byte order equals logical order: a series header sorts directly before
//! that series' segments, segments of one series are contiguous and ordered
//! by start timestamp. The timestamp field stores the tick count with its
//! sign bit flipped so negative ticks sort before positive ones.
//!
//! The flip is part of the on-disk format: ticks are signed, and a plain
//! big-endian `i64` would sort every negative start after every positive
//! one. For non-negative ticks the field differs from the raw count only in
//! its top bit.

use crate::error::{Result, TickError};
use crate::types::{SeriesId, Timestamp};

/// Size of a series header key
pub const SERIES_KEY_SIZE: usize = SeriesId::SIZE;

/// Size of a segment key
pub const SEGMENT_KEY_SIZE: usize = SeriesId::SIZE + 8;

const SIGN_BIT: u64 = 1 << 63;

/// Order-preserving big-endian encoding of a timestamp
pub fn encode_timestamp(timestamp: Timestamp) -> [u8; 8] {
    ((timestamp.ticks() as u64) ^ SIGN_BIT).to_be_bytes()
}

/// Inverse of [`encode_timestamp`]
pub fn decode_timestamp(bytes: [u8; 8]) -> Timestamp {
    Timestamp::new((u64::from_be_bytes(bytes) ^ SIGN_BIT) as i64)
}

/// Key of the header record of a series
pub fn series_key(series: &SeriesId) -> Vec<u8> {
    series.as_bytes().to_vec()
}

/// Smallest key sorting after every key of `series`, `None` for the last id
pub fn next_series_key(series: &SeriesId) -> Option<Vec<u8>> {
    u128::from_be_bytes(*series.as_bytes())
        .checked_add(1)
        .map(|next| next.to_be_bytes().to_vec())
}

/// Store key of one segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentKey {
    pub series: SeriesId,
    pub start: Timestamp,
}

impl SegmentKey {
    pub fn new(series: SeriesId, start: Timestamp) -> Self {
        Self { series, start }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut key = Vec::with_capacity(SEGMENT_KEY_SIZE);
        key.extend_from_slice(self.series.as_bytes());
        key.extend_from_slice(&encode_timestamp(self.start));
        key
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SEGMENT_KEY_SIZE {
            return Err(TickError::Corruption(format!(
                "Segment key has {} bytes, expected {}",
                bytes.len(),
                SEGMENT_KEY_SIZE
            )));
        }
        let mut id = [0u8; 16];
        id.copy_from_slice(&bytes[..16]);
        let mut ts = [0u8; 8];
        ts.copy_from_slice(&bytes[16..]);
        Ok(Self {
            series: SeriesId::from_bytes(id),
            start: decode_timestamp(ts),
        })
    }

    /// Inclusive key range covering every segment of `series`
    pub fn series_range(series: &SeriesId) -> (Vec<u8>, Vec<u8>) {
        (
            SegmentKey::new(*series, Timestamp::MIN).encode(),
            SegmentKey::new(*series, Timestamp::MAX).encode(),
        )
    }
}

/// A decoded store key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKey {
    Series(SeriesId),
    Segment(SegmentKey),
}

impl StoreKey {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        match bytes.len() {
            SERIES_KEY_SIZE => {
                let mut id = [0u8; 16];
                id.copy_from_slice(bytes);
                Ok(StoreKey::Series(SeriesId::from_bytes(id)))
            }
            SEGMENT_KEY_SIZE => SegmentKey::decode(bytes).map(StoreKey::Segment),
            other => Err(TickError::Corruption(format!(
                "Unrecognized key of {} bytes",
                other
            ))),
        }
    }
}
