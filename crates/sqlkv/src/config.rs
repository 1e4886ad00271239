//! Store configuration

use std::time::Duration;

/// Table used when none is configured
pub const DEFAULT_TABLE: &str = "data";

/// How long a connection waits on another holder's lock before failing
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Number of keys fetched per page while iterating
pub const DEFAULT_ITER_BATCH: usize = 256;

/// Options for opening a [`crate::SqliteKv`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvConfig {
    /// Table holding the entries; stores naming different tables in one
    /// file are independent namespaces.
    pub table: String,
    /// SQLite busy timeout applied to the connection
    pub timeout: Duration,
    /// Page size for key iteration (at least 1)
    pub iter_batch: usize,
}

impl Default for KvConfig {
    fn default() -> Self {
        Self {
            table: DEFAULT_TABLE.to_string(),
            timeout: DEFAULT_TIMEOUT,
            iter_batch: DEFAULT_ITER_BATCH,
        }
    }
}

impl KvConfig {
    /// Default configuration
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_iter_batch(mut self, iter_batch: usize) -> Self {
        self.iter_batch = iter_batch.max(1);
        self
    }
}
