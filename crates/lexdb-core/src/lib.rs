//! # lexdb
//!
//! A persistent BM25 full-text search engine built atop an embedded
//! analytical store (`DuckDB`). It ingests a corpus of documents (each with
//! a caller-chosen primary key and an arbitrary set of text fields), builds
//! an inverted index with stored per-term BM25 weights, and answers ranked
//! top-k text queries. It also indexes a parallel corpus of *queries* for
//! query-to-query retrieval and query-expansion graph search.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use lexdb_core::{DocumentInput, Index};
//!
//! let index = Index::open("./my_index.db")?;
//! index.upload_documents(
//!     &[DocumentInput { id: "1".to_string(), fields: [("text".to_string(), "hello world".to_string())].into_iter().collect() }],
//!     &["text".to_string()],
//! )?;
//! let hits = index.search_documents(&["hello".to_string()], 10, None, None, None)?;
//! # Ok::<(), lexdb_core::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod corpus;
pub mod error;
pub mod graph;
pub mod index;
pub mod search;
pub mod settings;
pub mod shard;
pub mod storage;
pub mod tokenizer;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub use corpus::{DocumentRow as DocumentInput, InteractionEdge, QueryRow as QueryInput};
pub use error::{Error, Result};
pub use graph::{graph_search, GraphSearchOptions};
pub use index::Namespace;
pub use search::{Condition, Filter, Hit, SearchOptions, Value};
pub use settings::IndexSettings;
pub use shard::search_shards;

use config::LexConfig;
use index::builder::update_index;
use storage::{Connection, DuckDbDriver, StorageDriver};
use tokenizer::Tokenizer;

/// A single `lexdb` database file: the `corpus` namespace plus its two
/// index namespaces (`idx_docs`, `idx_queries`).
///
/// Holds one writer connection for the process lifetime (`spec.md` §5: a
/// single writer connection per database file); concurrent read-only
/// query workers each open their own connection via [`Self::search_shards`]
/// or [`shard::search_shards`] against other files.
pub struct Index {
    path: PathBuf,
    conn: Connection,
    config: LexConfig,
}

impl Index {
    /// Opens or creates the database at `path`, running its `:memory:` or
    /// on-disk bootstrap exactly once per process per file (`spec.md` §5).
    ///
    /// Process-wide configuration (batch sizes, retry policy) is loaded
    /// from `LEXDB_*` environment variables layered over defaults
    /// ([`LexConfig::load`]).
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if the connection cannot be
    /// opened after retries, or [`Error::Config`] if the environment
    /// supplies an unparsable configuration value.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = LexConfig::load().map_err(|e| Error::Config(e.to_string()))?;
        config.validate().map_err(|e| Error::Config(e.to_string()))?;
        Self::open_with_config(path, config)
    }

    /// Opens the database at `path` with an explicit [`LexConfig`],
    /// bypassing environment-variable loading.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if the connection cannot be
    /// opened after retries.
    pub fn open_with_config<P: AsRef<Path>>(path: P, config: LexConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let driver = DuckDbDriver::new(config.retry);
        let conn = driver.open(&path, false)?;

        // Schema creation is idempotent (`CREATE ... IF NOT EXISTS`), but
        // still runs under `storage::bootstrap`'s cross-process file lock:
        // the spec's open question on concurrent multi-process writers names
        // a file-level advisory lock as an acceptable implementer's choice
        // (`spec.md` §9), and bootstrap is the one moment before the single-
        // writer assumption takes over where two processes could otherwise
        // race on `CREATE SCHEMA`.
        storage::bootstrap::once(&path, || {
            corpus::schema::create_schema(&conn)?;
            index::create_schema(&conn, Namespace::Documents)?;
            index::create_schema(&conn, Namespace::Queries)
        })?;

        Ok(Self { path, conn, config })
    }

    /// The path this index was opened against.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the pinned tokenization/scoring settings for `ns`, if any have
    /// been written yet.
    ///
    /// # Errors
    ///
    /// Returns an error on a storage failure.
    pub fn settings(&self, ns: Namespace) -> Result<Option<IndexSettings>> {
        settings::load(&self.conn, ns.index_schema())
    }

    fn tokenizer_for(&self, ns: Namespace, settings: &IndexSettings) -> Result<(IndexSettings, Tokenizer)> {
        let pinned = settings::pin(&self.conn, ns.index_schema(), settings)?;
        let tokenizer = Tokenizer::from_settings(&pinned)?;
        Ok((pinned, tokenizer))
    }

    /// Inserts or upserts `documents`, then incrementally rebuilds
    /// `idx_docs` to cover the newly-indexable rows (`spec.md` §6
    /// `upload_documents`).
    ///
    /// `text_fields` names which of the caller's fields are concatenated
    /// and tokenized; other fields are stored but not indexed. Settings are
    /// pinned on first call and rejected-but-logged on subsequent divergent
    /// calls (`spec.md` §3 invariant 4).
    ///
    /// # Errors
    ///
    /// Returns an error on a storage failure, or [`Error::InvalidInput`] if
    /// `text_fields` is empty or names an invalid column.
    pub fn upload_documents(&self, documents: &[DocumentInput], text_fields: &[String]) -> Result<usize> {
        self.upload_documents_with_settings(documents, text_fields, &IndexSettings::default(), &HashMap::new())
    }

    /// As [`Self::upload_documents`], but with explicit `settings` (used
    /// only on the very first upload to this namespace; later divergent
    /// values are rejected per `spec.md` §3 invariant 4) and explicit
    /// column `dtypes` for newly-seen fields.
    ///
    /// # Errors
    ///
    /// See [`Self::upload_documents`].
    pub fn upload_documents_with_settings(
        &self,
        documents: &[DocumentInput],
        text_fields: &[String],
        settings: &IndexSettings,
        dtypes: &HashMap<String, String>,
    ) -> Result<usize> {
        corpus::insert_documents(&self.conn, documents, dtypes, self.config.batch.ingest_rows_per_shard)?;
        let (pinned, tokenizer) = self.tokenizer_for(Namespace::Documents, settings)?;
        update_index(
            &self.conn,
            Namespace::Documents,
            text_fields,
            &tokenizer,
            &pinned,
            &self.config.batch,
            &self.config.limits,
        )
    }

    /// Inserts or upserts `queries` and `documents_queries` edges, then
    /// incrementally rebuilds `idx_queries` (`spec.md` §6 `upload_queries`).
    ///
    /// # Errors
    ///
    /// Returns an error on a storage failure.
    pub fn upload_queries(&self, queries: &[QueryInput], documents_queries: &[InteractionEdge]) -> Result<usize> {
        self.upload_queries_with_settings(queries, documents_queries, &IndexSettings::default())
    }

    /// As [`Self::upload_queries`], but with explicit `settings` for the
    /// `idx_queries` namespace.
    ///
    /// # Errors
    ///
    /// See [`Self::upload_queries`].
    pub fn upload_queries_with_settings(
        &self,
        queries: &[QueryInput],
        documents_queries: &[InteractionEdge],
        settings: &IndexSettings,
    ) -> Result<usize> {
        corpus::insert_queries(&self.conn, queries, self.config.batch.ingest_rows_per_shard)?;
        if !documents_queries.is_empty() {
            corpus::insert_documents_queries(&self.conn, documents_queries)?;
        }
        let (pinned, tokenizer) = self.tokenizer_for(Namespace::Queries, settings)?;
        update_index(
            &self.conn,
            Namespace::Queries,
            &[],
            &tokenizer,
            &pinned,
            &self.config.batch,
            &self.config.limits,
        )
    }

    /// Removes `ids` from `idx_docs` and `corpus.documents`, in the order
    /// `spec.md` §4.4 requires (`spec.md` §6 `delete_documents`).
    ///
    /// # Errors
    ///
    /// Returns an error on a storage failure.
    pub fn delete_documents(&self, ids: &[String]) -> Result<()> {
        index::delete::delete(&self.conn, Namespace::Documents, ids)
    }

    /// Ranked top-k search over `idx_docs` (`spec.md` §6 `search_documents`,
    /// §4.5).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFilter`] if `filter` names an invalid column,
    /// or an error on a storage failure.
    pub fn search_documents(
        &self,
        queries: &[String],
        top_k: usize,
        top_k_token: Option<u64>,
        filter: Option<Filter>,
        order_by: Option<String>,
    ) -> Result<Vec<Vec<Hit>>> {
        let settings = self.settings(Namespace::Documents)?.unwrap_or_default();
        let tokenizer = Tokenizer::from_settings(&settings)?;
        let opts = SearchOptions {
            top_k,
            top_k_token: top_k_token.or(Some(self.config.limits.default_top_k_token)),
            filter,
            order_by,
        };
        search::search(&self.conn, Namespace::Documents, queries, &tokenizer, &opts)
    }

    /// Ranked top-k search over `idx_queries` (`spec.md` §6
    /// `search_queries`).
    ///
    /// # Errors
    ///
    /// Returns an error on a storage failure.
    pub fn search_queries(&self, queries: &[String], top_k: usize, top_k_token: Option<u64>) -> Result<Vec<Vec<Hit>>> {
        let settings = self.settings(Namespace::Queries)?.unwrap_or_default();
        let tokenizer = Tokenizer::from_settings(&settings)?;
        let opts = SearchOptions {
            top_k,
            top_k_token: top_k_token.or(Some(self.config.limits.default_top_k_token)),
            filter: None,
            order_by: None,
        };
        search::search(&self.conn, Namespace::Queries, queries, &tokenizer, &opts)
    }

    /// Two-hop query→query→document retrieval (`spec.md` §6 `graph_search`,
    /// §4.6).
    ///
    /// # Errors
    ///
    /// Returns an error on a storage failure or an invalid `filter`.
    pub fn graph_search(
        &self,
        queries: &[String],
        top_k: usize,
        top_k_token: Option<u64>,
        filter: Option<Filter>,
    ) -> Result<Vec<Vec<Hit>>> {
        let settings = self.settings(Namespace::Queries)?.unwrap_or_default();
        let tokenizer = Tokenizer::from_settings(&settings)?;
        let opts = GraphSearchOptions {
            top_k,
            top_k_token: top_k_token.or(Some(self.config.limits.default_top_k_token)),
            neighbour_limit: self.config.batch.search_batch.max(100),
            filter,
        };
        graph::graph_search(&self.conn, queries, &tokenizer, &opts)
    }

    /// Raw connection access for callers that need direct `DuckDB` queries
    /// not exposed by this API (e.g. ad hoc corpus inspection).
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}
