//! # tickvault
//!
//! An embedded, segmented time-series store with:
//! - Fixed-capacity sorted segments with forward-cascading overflow
//! - Per-series segment catalogues and cursors for insert, lookup and scans
//! - Single-writer/multi-reader transactions with snapshot isolation
//! - Write-Ahead Logging (WAL) and SSTables underneath for durability
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Engine                               │
//! │            (Single Writer / Multi Reader gate)               │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                      Transaction                             │
//! │        (pinned snapshot + private write set)                 │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │   Cursor    │   ...    │   Cursor    │
//!   └──────┬──────┘          └──────┬──────┘
//!          └────────────┬───────────┘
//!                       ▼
//!               ┌──────────────┐      ┌─────────────┐
//!               │ SeriesIndex  │─────►│   Segment   │
//!               └──────┬───────┘      └─────────────┘
//!                      ▼
//!   ┌─────────────────────────────────────────────┐
//!   │                   Store                     │
//!   │   WAL (append)  │  MemTable layers │ SSTables│
//!   └─────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use tickvault::{Engine, EngineOptions, SeriesId, TransactionMode};
//!
//! # fn main() -> tickvault::Result<()> {
//! let engine: Engine = Engine::open(EngineOptions::new("./ticks"))?;
//! let series = SeriesId::new_v4();
//!
//! let tx = engine.begin_transaction(TransactionMode::ReadWrite)?;
//! {
//!     let mut cursor = tx.open_timeseries(series)?;
//!     for t in 0..1000 {
//!         cursor.insert(t, 0, t as f64)?;
//!     }
//!     cursor.close()?;
//! }
//! tx.commit()?;
//!
//! let tx = engine.begin_transaction(TransactionMode::ReadOnly)?;
//! let cursor = tx.open_timeseries(series)?;
//! let mut sum = 0.0;
//! cursor.for_each(|point| sum += point.value)?;
//! # Ok(())
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;

pub mod codec;
pub mod keys;
pub mod segment;
pub mod types;

pub mod memtable;
pub mod storage;
pub mod store;
pub mod wal;

pub mod cursor;
pub mod engine;
pub mod index;
pub mod transaction;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::{Config, WalSyncStrategy};
pub use cursor::Cursor;
pub use engine::{Engine, EngineOptions, EngineStats, DEFAULT_SEGMENT_SIZE};
pub use error::{Result, TickError};
pub use segment::{InsertOutcome, SearchResult, Segment, SegmentItem};
pub use transaction::{Transaction, TransactionMode};
pub use types::{Point, SeriesId, Timestamp};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of tickvault
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
