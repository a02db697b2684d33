//! Core value types: timestamps, series identifiers and points.

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

use crate::error::TickError;

// =============================================================================
// Timestamp
// =============================================================================

/// A 64-bit tick count; the ordering key of every point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(i64);

impl Timestamp {
    pub const MIN: Timestamp = Timestamp(i64::MIN);
    pub const MAX: Timestamp = Timestamp(i64::MAX);

    pub const fn new(ticks: i64) -> Self {
        Self(ticks)
    }

    pub const fn ticks(self) -> i64 {
        self.0
    }
}

impl From<i64> for Timestamp {
    fn from(ticks: i64) -> Self {
        Self(ticks)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// SeriesId
// =============================================================================

/// 128-bit identifier partitioning points into series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeriesId(Uuid);

impl SeriesId {
    /// Size of the raw identifier in bytes
    pub const SIZE: usize = 16;

    /// Generate a random identifier
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    pub const fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }

    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for SeriesId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for SeriesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SeriesId {
    type Err = TickError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| TickError::InvalidOperation(format!("Invalid series id '{}': {}", s, e)))
    }
}

// =============================================================================
// Point
// =============================================================================

/// A single timeseries value.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub timestamp: Timestamp,
    pub flags: u64,
    pub value: f64,
}

impl Point {
    /// Encoded size: timestamp (8) + flags (8) + value (8)
    pub const ENCODED_SIZE: usize = 24;

    pub fn new(timestamp: impl Into<Timestamp>, flags: u64, value: f64) -> Self {
        Self {
            timestamp: timestamp.into(),
            flags,
            value,
        }
    }
}
