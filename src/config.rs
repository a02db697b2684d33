//! Database configuration
//!
//! ```text
//! {data_dir}/
//!   ├── wal.log      commits not yet in an SSTable
//!   └── sstables/    sstable_NNNNNN.sst
//! ```

use std::path::PathBuf;

/// Settings of one database directory
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,

    /// Initialize an empty database when `data_dir` holds none; otherwise
    /// opening such a directory fails with a `Config` error
    pub create: bool,

    /// When the WAL is fsynced
    pub wal_sync_strategy: WalSyncStrategy,

    /// Committed bytes kept in memory before they are written to an SSTable
    pub memtable_size_limit: usize,

    /// SSTable count above which all tables are compacted into one
    pub max_sstables: usize,
}

/// WAL fsync policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalSyncStrategy {
    /// Every commit is durable when it returns
    EveryWrite,

    /// fsync once `count` commits accumulated; a crash may lose up to
    /// `count - 1` of them
    EveryNEntries { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./tickvault_data"),
            create: true,
            wal_sync_strategy: WalSyncStrategy::EveryWrite,
            memtable_size_limit: 64 * 1024 * 1024,
            max_sstables: 8,
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for [`Config`], starting from the defaults
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    pub fn create(mut self, create: bool) -> Self {
        self.config.create = create;
        self
    }

    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.wal_sync_strategy = strategy;
        self
    }

    /// Memtable size limit in bytes
    pub fn memtable_size_limit(mut self, size: usize) -> Self {
        self.config.memtable_size_limit = size;
        self
    }

    pub fn max_sstables(mut self, count: usize) -> Self {
        self.config.max_sstables = count;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
