//! Value codecs
//!
//! ## Segment Value Format
//! ```text
//! ┌───────────┬──────────────────────────────────────────────┐
//! │ Count (4) │ Point × Count                                │
//! │           │ ┌──────────────┬───────────┬───────────────┐ │
//! │           │ │Timestamp (8) │ Flags (8) │ Value (8, f64)│ │
//! │           │ └──────────────┴───────────┴───────────────┘ │
//! └───────────┴──────────────────────────────────────────────┘
//! ```
//! All fields little-endian.
//!
//! ## Series Header Format
//! ```text
//! ┌──────────────────────┐
//! │ Segment capacity (4) │
//! └──────────────────────┘
//! ```

use bytes::{Buf, BufMut};

use crate::error::{Result, TickError};
use crate::segment::Segment;
use crate::types::{Point, Timestamp};

/// Size of the point-count prefix
pub const COUNT_SIZE: usize = 4;

/// Encode a segment into its stored representation
pub fn encode_segment<const N: usize>(segment: &Segment<Point, N>) -> Vec<u8> {
    let mut buf = Vec::with_capacity(COUNT_SIZE + segment.len() * Point::ENCODED_SIZE);
    buf.put_u32_le(segment.len() as u32);
    for point in segment {
        buf.put_i64_le(point.timestamp.ticks());
        buf.put_u64_le(point.flags);
        buf.put_f64_le(point.value);
    }
    buf
}

/// Decode a stored segment, validating size and ordering
pub fn decode_segment<const N: usize>(mut bytes: &[u8]) -> Result<Segment<Point, N>> {
    if bytes.remaining() < COUNT_SIZE {
        return Err(TickError::Corruption(
            "Segment value shorter than its count field".to_string(),
        ));
    }
    let count = bytes.get_u32_le() as usize;
    if count > N {
        return Err(TickError::Corruption(format!(
            "Segment value holds {} points, capacity is {}",
            count, N
        )));
    }
    if bytes.remaining() != count * Point::ENCODED_SIZE {
        return Err(TickError::Corruption(format!(
            "Segment value has {} payload bytes, expected {}",
            bytes.remaining(),
            count * Point::ENCODED_SIZE
        )));
    }

    let mut points = Vec::with_capacity(count);
    for _ in 0..count {
        let timestamp = Timestamp::new(bytes.get_i64_le());
        let flags = bytes.get_u64_le();
        let value = bytes.get_f64_le();
        points.push(Point {
            timestamp,
            flags,
            value,
        });
    }
    Segment::from_vec(points)
}

/// Encode the header record of a series
pub fn encode_series_header(capacity: usize) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4);
    buf.put_u32_le(capacity as u32);
    buf
}

/// Decode the header record of a series, returning its segment capacity
pub fn decode_series_header(mut bytes: &[u8]) -> Result<usize> {
    if bytes.remaining() != 4 {
        return Err(TickError::Corruption(format!(
            "Series header has {} bytes, expected 4",
            bytes.remaining()
        )));
    }
    Ok(bytes.get_u32_le() as usize)
}
