//! Query planner / scorer (`spec.md` §4.5): tokenize queries, resolve to
//! `termid`s, gather pruned candidates, accumulate per-document BM25 sums,
//! order, project, and truncate to `top_k`.
//!
//! [`search`] is namespace-generic so the same pipeline serves both
//! `search_documents` (over `idx_docs`) and `search_queries` (over
//! `idx_queries`, `spec.md` §6); [`crate::graph`] builds on top of it for the
//! two-hop graph-expansion variant.

pub mod batching;
pub mod filter;
pub mod scorer;

use std::collections::BTreeMap;

use crate::corpus::schema::existing_columns;
use crate::error::Result;
use crate::index::Namespace;
use crate::storage::Connection;
use crate::tokenizer::Tokenizer;

pub use filter::{Condition, Filter, Value};

/// One ranked result (`spec.md` §4.5: "a hit is `{id, score, <user
/// fields>}`").
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    /// The caller-chosen primary key.
    pub id: String,
    /// The dense integer id this row was assigned in the index. Used as the
    /// deterministic tie-break for equal scores (`spec.md` §4.5 step 5) and
    /// by [`crate::shard`] to break ties across shards.
    pub bm25id: i64,
    /// The summed BM25 score across the query's matched terms.
    pub score: f64,
    /// User-supplied columns (document fields, or the query text for the
    /// queries namespace), rendered as their `VARCHAR` cast.
    pub fields: BTreeMap<String, Option<String>>,
}

/// Parameters shared by `search_documents`, `search_queries`, and
/// `graph_search` (`spec.md` §4.5, §6).
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Maximum hits returned per query. `0` returns an empty list
    /// (`spec.md` §8 boundary behavior).
    pub top_k: usize,
    /// Per-term posting-list pruning bound (`spec.md` §4.5 `top_k_token`).
    /// `None` means exact (unbounded) scoring.
    pub top_k_token: Option<u64>,
    /// Optional post-filter over joined `documents`/`queries` columns.
    pub filter: Option<Filter>,
    /// Optional `ORDER BY` substitution (`spec.md` §4.5 step 5); defaults to
    /// `score DESC` with ascending `bm25id` as a deterministic tie-break.
    pub order_by: Option<String>,
}

impl SearchOptions {
    #[must_use]
    pub fn top_k(top_k: usize) -> Self {
        Self {
            top_k,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_top_k_token(mut self, top_k_token: u64) -> Self {
        self.top_k_token = Some(top_k_token);
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    #[must_use]
    pub fn with_order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }
}

/// Runs the full query protocol from `spec.md` §4.5 against `ns` and returns
/// one hit list per input query, in input order.
///
/// Empty `queries`, `top_k == 0`, or a query composed entirely of unknown
/// terms/stopwords all produce empty hit lists rather than an error
/// (`spec.md` §8 boundary behaviors).
///
/// # Errors
///
/// Returns [`crate::error::Error::InvalidFilter`] if `opts.filter` names an
/// invalid column, or an error on a storage failure.
pub fn search(
    conn: &Connection,
    ns: Namespace,
    queries: &[String],
    tokenizer: &Tokenizer,
    opts: &SearchOptions,
) -> Result<Vec<Vec<Hit>>> {
    if queries.is_empty() || opts.top_k == 0 {
        return Ok(vec![Vec::new(); queries.len()]);
    }

    let schema = ns.index_schema();
    let source = format!("corpus.{}", ns.source_table());

    let resolved = batching::resolve_queries(conn, schema, queries, tokenizer)?;
    let staged = batching::StagedBatch::stage(conn, schema, &resolved)?;

    let filter_sql = opts.filter.as_ref().map(Filter::to_sql).transpose()?;
    let project_fields = project_fields(conn, ns)?;
    let top_k_token = opts.top_k_token.unwrap_or(u64::MAX);

    let rows = scorer::score_batch(
        conn,
        schema,
        &source,
        &staged,
        top_k_token,
        filter_sql.as_deref(),
        opts.order_by.as_deref(),
        &project_fields,
    )?;

    Ok(batching::group_hits(queries.len(), rows, opts.top_k))
}

/// The set of source-table columns projected onto a hit, in the order
/// `spec.md` §4.5 step 6 calls "user fields": every `documents` column
/// except `id`/`bm25id` for [`Namespace::Documents`]; just `query` for
/// [`Namespace::Queries`].
pub(crate) fn project_fields(conn: &Connection, ns: Namespace) -> Result<Vec<String>> {
    match ns {
        Namespace::Queries => Ok(vec!["query".to_string()]),
        Namespace::Documents => {
            let mut cols: Vec<String> = existing_columns(conn, "corpus", "documents")?
                .into_iter()
                .filter(|c| c != "id" && c != "bm25id")
                .collect();
            cols.sort();
            Ok(cols)
        }
    }
}
