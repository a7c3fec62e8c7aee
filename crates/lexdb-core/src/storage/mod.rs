//! Storage driver abstraction (`spec.md` §6).
//!
//! `lexdb` treats the embedded analytical store as an external collaborator:
//! transactional tables, columnar scan, parquet bulk-load, regex and ASCII
//! folding are all assumed capabilities rather than reimplemented here. The
//! [`StorageDriver`] trait names that boundary; [`DuckDbDriver`] is the only
//! implementation, backed by the `duckdb` crate (bundled, so no system
//! `DuckDB` install is required).

pub mod bootstrap;
mod duckdb_driver;
mod retry;

use std::path::Path;

pub use duckdb_driver::Connection;

use crate::config::RetryConfig;
use crate::error::Result;

/// The storage driver contract the rest of `lexdb` is written against.
///
/// A single connection is owned by a single worker for its lifetime
/// (`spec.md` §5); there is no internal pooling. Read-only connections may
/// be opened freely for concurrent query workers; write connections must be
/// serialized by the caller (one writer per database file).
pub trait StorageDriver: Send + Sync {
    /// Opens a connection to the database at `path`, retrying transient
    /// failures (e.g. lock contention) per the driver's retry policy.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::StorageUnavailable`] once retries are
    /// exhausted.
    fn open(&self, path: &Path, read_only: bool) -> Result<Connection>;
}

/// `DuckDB`-backed [`StorageDriver`].
pub struct DuckDbDriver {
    retry: RetryConfig,
}

impl DuckDbDriver {
    /// Builds a driver with the given connection-open retry policy.
    #[must_use]
    pub fn new(retry: RetryConfig) -> Self {
        Self { retry }
    }
}

impl Default for DuckDbDriver {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl StorageDriver for DuckDbDriver {
    fn open(&self, path: &Path, read_only: bool) -> Result<Connection> {
        if path.as_os_str() == ":memory:" {
            return Connection::open_in_memory();
        }
        Connection::open(path, read_only, &self.retry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_opens_in_memory_database() {
        let driver = DuckDbDriver::default();
        let conn = driver.open(Path::new(":memory:"), false).unwrap();
        conn.execute_batch("CREATE TABLE t (x INTEGER);").unwrap();
    }

    #[test]
    fn driver_opens_persistent_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("driver_test.db");
        let driver = DuckDbDriver::default();
        let conn = driver.open(&path, false).unwrap();
        conn.execute_batch("CREATE TABLE t (x INTEGER);").unwrap();
    }
}
