//! Connection-open retry loop (`spec.md` §5): exponential backoff up to
//! `max_retry` attempts, surfacing the last error as
//! [`crate::error::Error::StorageUnavailable`] if every attempt fails.

use std::thread::sleep;
use std::time::Duration;

use tracing::warn;

use crate::config::RetryConfig;
use crate::error::{Error, Result};

/// Retries `open` up to `cfg.max_retry` times, sleeping
/// `cfg.initial_sleep_ms * cfg.backoff_multiplier^attempt` between attempts.
///
/// `open` should return a driver-specific error boxed as
/// `Box<dyn std::error::Error + Send + Sync>`; this function only owns the
/// retry/backoff policy, not the meaning of failure.
pub fn with_retry<T, F>(path: &str, cfg: &RetryConfig, mut open: F) -> Result<T>
where
    F: FnMut() -> std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>,
{
    let mut sleep_ms = cfg.initial_sleep_ms as f64;
    let mut last_err = None;

    for attempt in 1..=cfg.max_retry {
        match open() {
            Ok(conn) => return Ok(conn),
            Err(e) => {
                if attempt < cfg.max_retry {
                    warn!(
                        path,
                        attempt, max_retry = cfg.max_retry, "connection attempt failed, retrying"
                    );
                    sleep(Duration::from_millis(sleep_ms.round() as u64));
                    sleep_ms *= cfg.backoff_multiplier;
                }
                last_err = Some(e);
            }
        }
    }

    Err(Error::StorageUnavailable {
        path: path.to_string(),
        attempts: cfg.max_retry,
        source: last_err.unwrap_or_else(|| "no attempts were made".into()),
    })
}
