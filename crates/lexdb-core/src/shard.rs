//! Multi-shard search (`spec.md` §4.7): fan a query batch out across
//! independent database files, run [`crate::search::search`] on each in
//! parallel, then merge the per-shard hit lists back into one ranked list
//! per query.
//!
//! There is no cross-shard IDF normalization (`spec.md` §4.7 Non-goals):
//! each shard's `dict`/`stats` are local to its own file, so the same term
//! can carry a different score across shards. The merge step only
//! re-sorts and truncates; it never rescales.

use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::config::RetryConfig;
use crate::error::Result;
use crate::index::Namespace;
use crate::search::{Hit, SearchOptions};
use crate::storage::{DuckDbDriver, StorageDriver};
use crate::tokenizer::Tokenizer;

/// Runs `queries` against every file in `shard_paths` and merges the
/// results.
///
/// Each shard is opened read-only on its own connection (`spec.md` §6: a
/// single connection is owned by a single worker) so shards score fully in
/// parallel; the merge step is sequential and re-sorts the concatenated
/// hits by `score DESC, bm25id ASC` before truncating to `opts.top_k`.
///
/// # Errors
///
/// Returns an error if any shard fails to open or score. A failure in one
/// shard aborts the whole search rather than silently dropping that
/// shard's contribution.
pub fn search_shards(
    shard_paths: &[PathBuf],
    ns: Namespace,
    queries: &[String],
    tokenizer: &Tokenizer,
    opts: &SearchOptions,
) -> Result<Vec<Vec<Hit>>> {
    if queries.is_empty() || opts.top_k == 0 || shard_paths.is_empty() {
        return Ok(vec![Vec::new(); queries.len()]);
    }

    // Each shard needs the full candidate set before the merge truncates,
    // so shards are queried at `opts.top_k` and re-truncated after merging
    // (a shard that individually ranks lower overall could still contain
    // the true top result for a given query).
    let per_shard_opts = SearchOptions {
        top_k: opts.top_k,
        top_k_token: opts.top_k_token,
        filter: opts.filter.clone(),
        order_by: opts.order_by.clone(),
    };

    let driver = DuckDbDriver::new(RetryConfig::default());

    let per_shard_results: Vec<Vec<Vec<Hit>>> = shard_paths
        .par_iter()
        .map(|path| search_one_shard(&driver, path, ns, queries, tokenizer, &per_shard_opts))
        .collect::<Result<Vec<_>>>()?;

    let mut merged: Vec<Vec<Hit>> = vec![Vec::new(); queries.len()];
    for shard_hits in per_shard_results {
        for (i, hits) in shard_hits.into_iter().enumerate() {
            merged[i].extend(hits);
        }
    }

    for hits in &mut merged {
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.bm25id.cmp(&b.bm25id))
        });
        hits.truncate(opts.top_k);
    }

    Ok(merged)
}

fn search_one_shard(
    driver: &DuckDbDriver,
    path: &Path,
    ns: Namespace,
    queries: &[String],
    tokenizer: &Tokenizer,
    opts: &SearchOptions,
) -> Result<Vec<Vec<Hit>>> {
    let conn = driver.open(path, true)?;
    crate::search::search(&conn, ns, queries, tokenizer, opts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BatchConfig, LimitsConfig};
    use crate::corpus::{self, DocumentRow};
    use crate::index::builder::update_index;
    use crate::index::create_schema;
    use crate::settings::IndexSettings;
    use std::collections::HashMap;

    fn build_shard(path: &Path, docs: &[(&str, &str)]) {
        let driver = DuckDbDriver::default();
        let conn = driver.open(path, false).unwrap();
        let settings = IndexSettings::default();
        let tokenizer = Tokenizer::from_settings(&settings).unwrap();
        create_schema(&conn, Namespace::Documents).unwrap();
        corpus::schema::create_schema(&conn).unwrap();

        let rows: Vec<DocumentRow> = docs
            .iter()
            .map(|(id, text)| DocumentRow {
                id: (*id).to_string(),
                fields: [("text".to_string(), (*text).to_string())].into_iter().collect(),
            })
            .collect();
        corpus::insert_documents(&conn, &rows, &HashMap::new(), 1000).unwrap();
        update_index(
            &conn,
            Namespace::Documents,
            &["text".to_string()],
            &tokenizer,
            &settings,
            &BatchConfig::default(),
            &LimitsConfig::default(),
        )
        .unwrap();
    }

    #[test]
    fn merges_and_re_sorts_across_shards() {
        let dir = tempfile::tempdir().unwrap();
        let shard_a = dir.path().join("a.db");
        let shard_b = dir.path().join("b.db");
        build_shard(&shard_a, &[("a1", "hello world"), ("a2", "world peace")]);
        build_shard(&shard_b, &[("b1", "hello hello hello")]);

        let settings = IndexSettings::default();
        let tokenizer = Tokenizer::from_settings(&settings).unwrap();

        let hits = search_shards(
            &[shard_a, shard_b],
            Namespace::Documents,
            &["hello".to_string()],
            &tokenizer,
            &SearchOptions::top_k(10),
        )
        .unwrap();

        assert_eq!(hits[0].len(), 2);
        // b1 repeats "hello" three times in a one-term document, driving a
        // higher BM25 score than a1's single occurrence in a two-term doc.
        assert_eq!(hits[0][0].id, "b1");
        assert_eq!(hits[0][1].id, "a1");
    }

    #[test]
    fn empty_shard_list_yields_empty_results() {
        let settings = IndexSettings::default();
        let tokenizer = Tokenizer::from_settings(&settings).unwrap();
        let hits = search_shards(
            &[],
            Namespace::Documents,
            &["hello".to_string()],
            &tokenizer,
            &SearchOptions::top_k(10),
        )
        .unwrap();
        assert_eq!(hits, vec![Vec::new()]);
    }
}
