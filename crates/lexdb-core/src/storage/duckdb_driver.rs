//! `DuckDB`-backed [`Connection`], the concrete storage driver behind
//! everything in `lexdb` (`spec.md` §6).

use std::path::Path;

use duckdb::AccessMode;

use crate::config::RetryConfig;
use crate::error::{Error, Result};

use super::retry;

/// A single connection to a `DuckDB` database file (or `:memory:`).
///
/// Read-only connections are used by query workers; a single writer
/// connection per database file serializes index maintenance (`spec.md`
/// §5 — the storage driver does not attempt multi-writer coordination).
pub struct Connection {
    inner: duckdb::Connection,
}

impl Connection {
    /// Opens a connection at `path`, retrying on transient failures per
    /// `retry_cfg`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if every retry attempt fails.
    pub fn open(path: &Path, read_only: bool, retry_cfg: &RetryConfig) -> Result<Self> {
        let path_str = path.to_string_lossy().to_string();

        let inner = retry::with_retry(&path_str, retry_cfg, || {
            let mut cfg = duckdb::Config::default();
            if read_only {
                cfg = cfg
                    .access_mode(AccessMode::ReadOnly)
                    .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)?;
            }
            duckdb::Connection::open_with_flags(path, cfg)
                .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)
        })?;

        Ok(Self { inner })
    }

    /// Opens an in-memory database. Always succeeds or returns immediately
    /// (no retry loop, since there is no file-lock contention to wait out).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if `DuckDB` fails to allocate the database.
    pub fn open_in_memory() -> Result<Self> {
        let inner = duckdb::Connection::open_in_memory()
            .map_err(|e| Error::Storage(format!("failed to open in-memory database: {e}")))?;
        Ok(Self { inner })
    }

    /// Direct access to the underlying driver connection, for modules that
    /// need `DuckDB`-specific query building (`prepare`, `query_row`, …).
    #[must_use]
    pub fn raw(&self) -> &duckdb::Connection {
        &self.inner
    }

    /// Executes a batch of statements (may contain multiple `;`-separated
    /// statements; `DuckDB` wraps the batch in an implicit transaction).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on failure.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.inner
            .execute_batch(sql)
            .map_err(|e| Error::Storage(e.to_string()))
    }

    /// Bulk-loads a parquet file into `table` via `DuckDB`'s `read_parquet`
    /// table function (`spec.md` §4.2, §6). The file path is bound as a
    /// parameter rather than interpolated into the SQL string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BulkLoadFailure`] on failure, carrying the path and
    /// destination table for diagnosis.
    pub fn bulk_load_parquet(&self, table: &str, path: &Path) -> Result<()> {
        let sql = format!("INSERT INTO {table} SELECT * FROM read_parquet(?);");
        self.inner
            .execute(&sql, [path.to_string_lossy().as_ref()])
            .map(|_| ())
            .map_err(|e| Error::BulkLoadFailure {
                path: path.display().to_string(),
                table: table.to_string(),
                source: Box::new(e),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory_succeeds() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (x INTEGER);").unwrap();
    }

    #[test]
    fn open_with_retry_succeeds_for_fresh_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conn_test.db");
        let retry_cfg = RetryConfig {
            max_retry: 3,
            initial_sleep_ms: 0,
            backoff_multiplier: 1.0,
        };
        let conn = Connection::open(&path, false, &retry_cfg).unwrap();
        conn.execute_batch("CREATE TABLE t (x INTEGER);").unwrap();
    }
}
