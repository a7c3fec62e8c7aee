//! Process-wide `lexdb` configuration.
//!
//! This covers the knobs that are genuinely process config — ingest/scoring
//! batch sizes, retry policy, worker thread count — as opposed to per-index
//! `settings` (tokenization, `k1`/`b`), which are data persisted inside the
//! index namespace itself (see [`crate::settings`]) and therefore never
//! belong here.
//!
//! # Priority (highest to lowest)
//!
//! 1. Runtime overrides (constructed directly in code)
//! 2. Environment variables (`LEXDB_*`)
//! 3. Default values
//!
//! A `lexdb.toml` file is intentionally not part of the priority chain:
//! this is a library, not a standalone service, so configuration is either
//! supplied by the embedding application or read from the environment.

use figment::{
    providers::{Env, Serialized},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to parse configuration from its sources.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// A configuration value failed validation.
    #[error("invalid configuration value for '{key}': {message}")]
    InvalidValue {
        /// Configuration key that failed validation.
        key: String,
        /// Validation error message.
        message: String,
    },
}

/// Retry policy for opening a storage connection (`spec.md` §5).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of connection attempts before giving up.
    pub max_retry: u32,
    /// Initial sleep between attempts, in milliseconds.
    pub initial_sleep_ms: u64,
    /// Multiplier applied to the sleep duration after each failed attempt.
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retry: 30,
            initial_sleep_ms: 100,
            backoff_multiplier: 1.0,
        }
    }
}

/// Batch sizing for ingest and index maintenance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Rows per parquet shard when staging an upload (`spec.md` §4.2).
    pub ingest_rows_per_shard: usize,
    /// Staged rows tokenized per `update_index` step (`spec.md` §4.3).
    pub index_build_batch: usize,
    /// `termid`s scored per batch during score precomputation (`spec.md` §4.3 step 7).
    pub score_batch: usize,
    /// Queries staged per search batch (`spec.md` §4.5).
    pub search_batch: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            ingest_rows_per_shard: 30_000,
            index_build_batch: 10_000,
            score_batch: 10_000,
            search_batch: 30,
        }
    }
}

/// Scoring-batch memory bound (`spec.md` §3 invariant 5).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// A term appearing in more documents than this is treated as an
    /// effective stopword and excluded from `scores`.
    pub max_df: u64,
    /// Default per-term posting-list pruning bound for query scoring
    /// (`spec.md` §4.5 `top_k_token`).
    pub default_top_k_token: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_df: 100_000,
            default_top_k_token: 30_000,
        }
    }
}

/// Worker pool sizing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    /// Number of worker threads used for parallel query batches and shard
    /// fan-out. `0` lets `rayon` pick based on available parallelism.
    pub threads: usize,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self { threads: 0 }
    }
}

/// Top-level `lexdb` process configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LexConfig {
    /// Connection-open retry policy.
    pub retry: RetryConfig,
    /// Ingest and index-maintenance batch sizes.
    pub batch: BatchConfig,
    /// Scoring limits.
    pub limits: LimitsConfig,
    /// Worker pool sizing.
    pub workers: WorkersConfig,
}

impl LexConfig {
    /// Loads configuration from defaults layered with `LEXDB_*` environment
    /// variables (e.g. `LEXDB_BATCH_INGEST_ROWS_PER_SHARD=5000`).
    ///
    /// # Errors
    ///
    /// Returns an error if an environment variable cannot be parsed into its
    /// target type.
    pub fn load() -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Env::prefixed("LEXDB_").split("_").lowercase(false));

        figment
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any value is out of its admissible range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_retry == 0 {
            return Err(ConfigError::InvalidValue {
                key: "retry.max_retry".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        if self.batch.ingest_rows_per_shard == 0 {
            return Err(ConfigError::InvalidValue {
                key: "batch.ingest_rows_per_shard".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        if self.batch.index_build_batch == 0 || self.batch.score_batch == 0 {
            return Err(ConfigError::InvalidValue {
                key: "batch.index_build_batch / batch.score_batch".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        if self.limits.max_df == 0 {
            return Err(ConfigError::InvalidValue {
                key: "limits.max_df".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = LexConfig::default();
        assert_eq!(cfg.retry.max_retry, 30);
        assert_eq!(cfg.retry.initial_sleep_ms, 100);
        assert_eq!(cfg.batch.ingest_rows_per_shard, 30_000);
        assert_eq!(cfg.batch.score_batch, 10_000);
        assert_eq!(cfg.limits.max_df, 100_000);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_zero_max_retry() {
        let mut cfg = LexConfig::default();
        cfg.retry.max_retry = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn env_override_applies() {
        std::env::set_var("LEXDB_LIMITS_MAX_DF", "5000");
        let cfg = LexConfig::load().expect("load config");
        assert_eq!(cfg.limits.max_df, 5000);
        std::env::remove_var("LEXDB_LIMITS_MAX_DF");
    }
}
