//! Cross-process-safe, once-per-process database initialization.
//!
//! Two independent guards protect schema creation: an `fs2` exclusive file
//! lock (cross-process) and a process-local "ran once" set (avoids repeating
//! the file lock dance for every connection opened by the same process).
//! Schema DDL itself stays idempotent (`CREATE TABLE IF NOT EXISTS`) so a
//! concurrent, unguarded caller can never see it half-applied.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use fs2::FileExt;
use once_cell::sync::Lazy;

use crate::error::{Error, Result};

static BOOTSTRAPPED: Lazy<Mutex<HashSet<String>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Runs `init` against `path` at most once per process, under an exclusive
/// cross-process file lock keyed on `path` (skipped for `:memory:`, which is
/// always process-local).
///
/// `init` must be idempotent: on a fresh process sharing a database file
/// with one that already bootstrapped it, this still runs `init` again, and
/// `init`'s own `IF NOT EXISTS` DDL is what makes that safe. This is the
/// resolution of `spec.md` §9's open question on concurrent multi-process
/// `update_index`: a file-level advisory lock around schema bootstrap, not
/// around every write.
pub fn once<F>(path: &Path, init: F) -> Result<()>
where
    F: FnOnce() -> Result<()>,
{
    let key = path.to_string_lossy().to_string();

    if key == ":memory:" {
        return init();
    }

    {
        let seen = BOOTSTRAPPED.lock().unwrap();
        if seen.contains(&key) {
            return Ok(());
        }
    }

    let lock_path = path.with_extension("lock");
    let lock_file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(Error::Io)?;

    lock_file
        .lock_exclusive()
        .map_err(|e| Error::Storage(format!("failed to lock {}: {e}", lock_path.display())))?;

    let result = init();

    let _ = FileExt::unlock(&lock_file);

    result?;

    BOOTSTRAPPED.lock().unwrap().insert(key);
    Ok(())
}
