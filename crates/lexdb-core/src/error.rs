//! Error types for `lexdb`.
//!
//! This module provides a unified error type for every `lexdb` operation.
//! Error codes follow the pattern `LEXDB-XXX` for easy debugging and log
//! correlation.

use thiserror::Error;

/// Result type alias for `lexdb` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in `lexdb` operations.
///
/// `SchemaConflict` and `UnknownTerm` are recoverable and never propagate out
/// of the public API: the former is logged as a warning and the original
/// settings prevail, the latter is silently dropped from a query's term set.
/// Every other variant is surfaced to the caller.
#[derive(Error, Debug)]
pub enum Error {
    /// The storage driver could not open a connection after exhausting its
    /// retry budget (LEXDB-001).
    #[error("[LEXDB-001] could not open database at '{path}' after {attempts} attempts: {source}")]
    StorageUnavailable {
        /// Path to the database file that could not be opened.
        path: String,
        /// Number of connection attempts made before giving up.
        attempts: u32,
        /// Underlying driver error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A transient I/O error was encountered (LEXDB-002). The message
    /// includes actionable guidance since callers may only observe the
    /// `Display` output of the error.
    #[error(
        "[LEXDB-002] transient I/O error: {0}. If this mentions too many open \
         files, raise the per-process open-file limit (e.g. `ulimit -n 4096`)"
    )]
    TransientIO(String),

    /// Caller attempted to change a setting on an index whose `settings` row
    /// already exists (LEXDB-003). This variant is logged as a warning by the
    /// settings store and never returned to the caller; it is public so
    /// tests can assert on the warning path.
    #[error("[LEXDB-003] settings already pinned for this index; divergent value for '{field}' ignored (kept {kept}, rejected {rejected})")]
    SchemaConflict {
        /// Name of the setting that differed.
        field: String,
        /// The value already persisted and in effect.
        kept: String,
        /// The value the caller tried to write instead.
        rejected: String,
    },

    /// A query term is absent from `dict` (LEXDB-004). Silent: the term is
    /// dropped from scoring, the remaining terms still produce a hit.
    #[error("[LEXDB-004] unknown term '{0}' ignored")]
    UnknownTerm(String),

    /// Caller input was invalid and cannot be interpreted (LEXDB-005).
    #[error("[LEXDB-005] invalid input: {0}")]
    InvalidInput(String),

    /// A parquet bulk-load failed (LEXDB-006). Carries the offending path
    /// and the statement that triggered the load for diagnosis.
    #[error("[LEXDB-006] bulk load of '{path}' into table '{table}' failed: {source}")]
    BulkLoadFailure {
        /// Parquet file that failed to load.
        path: String,
        /// Destination table.
        table: String,
        /// Underlying driver error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Generic storage-driver failure not covered by a more specific variant
    /// (LEXDB-007).
    #[error("[LEXDB-007] storage error: {0}")]
    Storage(String),

    /// Index invariant violated or index operation failed (LEXDB-008).
    #[error("[LEXDB-008] index error: {0}")]
    Index(String),

    /// Configuration error (LEXDB-009).
    #[error("[LEXDB-009] configuration error: {0}")]
    Config(String),

    /// A caller-supplied filter expression failed validation (LEXDB-010).
    #[error("[LEXDB-010] invalid filter expression: {0}")]
    InvalidFilter(String),

    /// IO error not specific to the storage driver (LEXDB-011).
    #[error("[LEXDB-011] IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error (LEXDB-012). Indicates a broken invariant; please
    /// report if encountered.
    #[error("[LEXDB-012] internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns the error code (e.g., `"LEXDB-001"`).
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::StorageUnavailable { .. } => "LEXDB-001",
            Self::TransientIO(_) => "LEXDB-002",
            Self::SchemaConflict { .. } => "LEXDB-003",
            Self::UnknownTerm(_) => "LEXDB-004",
            Self::InvalidInput(_) => "LEXDB-005",
            Self::BulkLoadFailure { .. } => "LEXDB-006",
            Self::Storage(_) => "LEXDB-007",
            Self::Index(_) => "LEXDB-008",
            Self::Config(_) => "LEXDB-009",
            Self::InvalidFilter(_) => "LEXDB-010",
            Self::Io(_) => "LEXDB-011",
            Self::Internal(_) => "LEXDB-012",
        }
    }

    /// Returns `true` if this error kind is expected to be handled silently
    /// by the component that produces it (never surfaced to a caller).
    ///
    /// `search()` drops `UnknownTerm` from a query's term set; the settings
    /// store logs `SchemaConflict` as a warning and keeps the original
    /// value. Every other variant propagates.
    #[must_use]
    pub const fn is_silent(&self) -> bool {
        matches!(self, Self::UnknownTerm(_) | Self::SchemaConflict { .. })
    }
}
