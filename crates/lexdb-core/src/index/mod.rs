//! The BM25 inverted index: `dict`, `docs`, `terms`, `stats`, `scores`
//! (`spec.md` §3, §4.3).
//!
//! Two parallel namespaces share this schema: `idx_docs` indexes
//! `corpus.documents`, `idx_queries` indexes `corpus.queries`. Which one a
//! given call operates on is selected by [`Namespace`].

pub mod builder;
pub mod delete;

use crate::error::Result;
use crate::storage::Connection;

/// Which corpus namespace an index operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Documents,
    Queries,
}

impl Namespace {
    /// Schema name for this namespace's inverted index tables.
    #[must_use]
    pub fn index_schema(self) -> &'static str {
        match self {
            Self::Documents => "idx_docs",
            Self::Queries => "idx_queries",
        }
    }

    /// Source table in the `corpus` schema this namespace is built from.
    #[must_use]
    pub fn source_table(self) -> &'static str {
        match self {
            Self::Documents => "documents",
            Self::Queries => "queries",
        }
    }

    /// Name of the text column read from the source table. Documents are
    /// indexed over every caller field concatenated (handled by the
    /// builder); queries have a single fixed `query` column.
    #[must_use]
    pub fn text_column(self) -> Option<&'static str> {
        match self {
            Self::Documents => None,
            Self::Queries => Some("query"),
        }
    }
}

/// Idempotently creates `ns`'s `dict`/`docs`/`terms`/`stats`/`scores`
/// tables (`spec.md` §3).
///
/// # Errors
///
/// Returns an error on a storage failure.
pub fn create_schema(conn: &Connection, ns: Namespace) -> Result<()> {
    let schema = ns.index_schema();
    conn.execute_batch(&format!(
        "CREATE SCHEMA IF NOT EXISTS {schema};
         CREATE TABLE IF NOT EXISTS {schema}.dict (
             term VARCHAR PRIMARY KEY,
             termid BIGINT UNIQUE NOT NULL
         );
         CREATE TABLE IF NOT EXISTS {schema}.docs (
             bm25id BIGINT PRIMARY KEY,
             length BIGINT NOT NULL
         );
         CREATE TABLE IF NOT EXISTS {schema}.terms (
             termid BIGINT NOT NULL,
             bm25id BIGINT NOT NULL,
             tf INTEGER NOT NULL,
             PRIMARY KEY (termid, bm25id)
         );
         CREATE TABLE IF NOT EXISTS {schema}.stats (
             num_docs BIGINT NOT NULL,
             avgdl DOUBLE NOT NULL
         );
         CREATE TABLE IF NOT EXISTS {schema}.scores (
             termid BIGINT NOT NULL,
             bm25id BIGINT NOT NULL,
             score REAL NOT NULL,
             PRIMARY KEY (termid, bm25id)
         );"
    ))
}

/// Smoothed inverse document frequency (`spec.md` §4.3,
/// Lucene/BM25+ smoothing): `ln((N − df + 0.5) / (df + 0.5) + 1)`.
#[must_use]
pub fn idf(num_docs: f64, df: f64) -> f64 {
    ((num_docs - df + 0.5) / (df + 0.5) + 1.0).ln()
}

/// Precomputed BM25 contribution of a single `(term, doc)` pair
/// (`spec.md` §4.3).
#[must_use]
pub fn bm25_score(idf: f64, tf: f64, doc_len: f64, avgdl: f64, k1: f64, b: f64) -> f64 {
    let denom = tf + k1 * (1.0 - b + b * doc_len / avgdl);
    idf * tf * (k1 + 1.0) / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idf_decreases_as_df_grows() {
        let a = idf(1000.0, 1.0);
        let b = idf(1000.0, 500.0);
        assert!(a > b);
    }

    #[test]
    fn idf_is_never_negative_for_reasonable_df() {
        assert!(idf(1000.0, 999.0) >= 0.0);
    }

    #[test]
    fn bm25_score_increases_with_tf_then_saturates() {
        let low = bm25_score(2.0, 1.0, 10.0, 10.0, 1.5, 0.75);
        let high = bm25_score(2.0, 5.0, 10.0, 10.0, 1.5, 0.75);
        assert!(high > low);
        assert!(high < 2.0 * (1.5 + 1.0));
    }

    #[test]
    fn bm25_score_penalizes_longer_documents() {
        let short = bm25_score(2.0, 2.0, 5.0, 10.0, 1.5, 0.75);
        let long = bm25_score(2.0, 2.0, 20.0, 10.0, 1.5, 0.75);
        assert!(short > long);
    }

    #[test]
    fn namespace_maps_to_correct_schema_and_source() {
        assert_eq!(Namespace::Documents.index_schema(), "idx_docs");
        assert_eq!(Namespace::Documents.source_table(), "documents");
        assert_eq!(Namespace::Queries.index_schema(), "idx_queries");
        assert_eq!(Namespace::Queries.text_column(), Some("query"));
    }
}
