//! `update_index`: the nine-stage incremental build pipeline that turns
//! newly-inserted `corpus` rows into `dict`/`docs`/`terms`/`stats`/`scores`
//! postings (`spec.md` §4.3).
//!
//! Stages 3 onward run against two transient helpers populated by stages 1
//! and 2 in Rust (tokenization happens here, not in SQL): a parquet-staged
//! postings file and a `new_ids` temp table mapping each newly-indexed
//! source id to the `bm25id` it is assigned in this run. Everything after
//! that id assignment — dict growth, term postings, corpus stats, score
//! precomputation, and the `bm25id` back-fill into `corpus` — is plain SQL,
//! matching how the original system pushed as much of the heavy lifting as
//! possible onto the database rather than the host language.
use std::collections::HashMap;

use tracing::debug;

use crate::config::{BatchConfig, LimitsConfig};
use crate::corpus::{schema::is_valid_identifier, staging};
use crate::error::{Error, Result};
use crate::settings::IndexSettings;
use crate::storage::Connection;
use crate::tokenizer::Tokenizer;

use super::Namespace;

/// Runs the full incremental index build for `ns` and returns the number of
/// source rows that were newly indexed (rows whose `bm25id` was already
/// assigned from a prior run are left untouched).
///
/// # Errors
///
/// Returns an error on a storage failure, or [`Error::InvalidInput`] if
/// `text_fields` is empty for [`Namespace::Documents`] or names a field that
/// is not a valid column identifier.
pub fn update_index(
    conn: &Connection,
    ns: Namespace,
    text_fields: &[String],
    tokenizer: &Tokenizer,
    settings: &IndexSettings,
    batch: &BatchConfig,
    limits: &LimitsConfig,
) -> Result<usize> {
    super::create_schema(conn, ns)?;
    let schema = ns.index_schema();

    // Stage 1: gather indexable rows (those without a bm25id yet).
    let text_expr = text_expression(ns, text_fields)?;
    let source = format!("corpus.{}", ns.source_table());
    let rows = fetch_unindexed(conn, &source, &text_expr)?;

    if rows.is_empty() {
        debug!(schema, "no unindexed rows found; update_index is a no-op");
        return Ok(0);
    }

    // Stage 2: tokenize every row, in memory chunks of `index_build_batch`
    // to bound peak memory on large uploads.
    let mut lengths: Vec<(String, i64)> = Vec::with_capacity(rows.len());
    let mut posting_ids: Vec<String> = Vec::new();
    let mut posting_terms: Vec<String> = Vec::new();
    let mut posting_tfs: Vec<i64> = Vec::new();

    for chunk in rows.chunks(batch.index_build_batch.max(1)) {
        for (id, text) in chunk {
            let tokens = tokenizer.tokenize(text);
            lengths.push((id.clone(), tokens.len() as i64));

            let mut counts: HashMap<&str, i64> = HashMap::new();
            for t in &tokens {
                *counts.entry(t.as_str()).or_insert(0) += 1;
            }
            for (term, tf) in counts {
                posting_ids.push(id.clone());
                posting_terms.push(term.to_string());
                posting_tfs.push(tf);
            }
        }
    }

    let stage = staging::StagingDir::new()?;

    // Stage 3: dict growth. New terms get dense, monotone termids starting
    // just past the current max.
    let terms_path = stage.file_path(0);
    staging::write_tokens(&terms_path, &posting_terms)?;
    conn.raw()
        .execute(
            &format!(
                "INSERT INTO {schema}.dict (term, termid)
                 SELECT new.term,
                        (SELECT COALESCE(MAX(termid), -1) FROM {schema}.dict)
                            + ROW_NUMBER() OVER (ORDER BY new.term)
                 FROM (SELECT DISTINCT token AS term FROM read_parquet(?)) new
                 WHERE new.term NOT IN (SELECT term FROM {schema}.dict);"
            ),
            [terms_path.to_string_lossy().as_ref()],
        )
        .map_err(|e| Error::Storage(e.to_string()))?;

    // Stage 4: bm25id assignment for newly-indexed rows, staged in a temp
    // table so later stages can join source ids to their new bm25id without
    // touching `corpus` until the final back-fill (stage 8).
    let lengths_path = stage.file_path(1);
    let (len_ids, len_values): (Vec<String>, Vec<i64>) = lengths.iter().cloned().unzip();
    staging::write_lengths(&lengths_path, &len_ids, &len_values)?;

    conn.raw()
        .execute(
            &format!(
                "CREATE OR REPLACE TEMP TABLE new_ids AS
                 SELECT new.id AS id, new.length AS length,
                        (SELECT COALESCE(MAX(bm25id), -1) FROM {schema}.docs)
                            + ROW_NUMBER() OVER (ORDER BY new.id) AS bm25id
                 FROM (SELECT id, length FROM read_parquet(?)) new;"
            ),
            [lengths_path.to_string_lossy().as_ref()],
        )
        .map_err(|e| Error::Storage(e.to_string()))?;

    conn.execute_batch(&format!(
        "INSERT INTO {schema}.docs (bm25id, length)
         SELECT bm25id, length FROM new_ids;"
    ))?;

    // Stage 5: term postings, joining the staged (id, token, tf) rows
    // against the dict (term -> termid) and new_ids (id -> bm25id).
    let postings_path = stage.file_path(2);
    staging::write_postings(&postings_path, &posting_ids, &posting_terms, &posting_tfs)?;

    conn.raw()
        .execute(
            &format!(
                "INSERT INTO {schema}.terms (termid, bm25id, tf)
                 SELECT d.termid, n.bm25id, p.tf
                 FROM read_parquet(?) p
                 JOIN {schema}.dict d ON d.term = p.token
                 JOIN new_ids n ON n.id = p.id
                 ON CONFLICT (termid, bm25id) DO UPDATE SET tf = EXCLUDED.tf;"
            ),
            [postings_path.to_string_lossy().as_ref()],
        )
        .map_err(|e| Error::Storage(e.to_string()))?;

    // Stage 6: corpus-wide stats, recomputed from scratch — cheap relative
    // to stage 7 and avoids drift from incremental running sums.
    conn.execute_batch(&format!(
        "DELETE FROM {schema}.stats;
         INSERT INTO {schema}.stats (num_docs, avgdl)
         SELECT count(*), COALESCE(avg(length), 0.0) FROM {schema}.docs;"
    ))?;

    // Stage 7: score precomputation. Every termid is recomputed, not just
    // the newly-touched ones, because a single new document shifts `avgdl`
    // and `num_docs` for the whole index — the accepted trade-off is a full
    // rescore on every build, batched to bound memory.
    precompute_scores(conn, schema, settings, batch, limits)?;

    // Stage 8: back-fill bm25id into the source table.
    conn.execute_batch(&format!(
        "UPDATE {source} SET bm25id = new_ids.bm25id
         FROM new_ids WHERE {source}.id = new_ids.id;"
    ))?;

    // Stage 9: cleanup. `new_ids` is session-scoped and harmless to leave,
    // but dropping it keeps a long-lived connection's catalog small; the
    // parquet staging directory is removed by `StagingDir`'s `Drop`.
    conn.execute_batch("DROP TABLE IF EXISTS new_ids;")?;

    Ok(rows.len())
}

fn precompute_scores(
    conn: &Connection,
    schema: &str,
    settings: &IndexSettings,
    batch: &BatchConfig,
    limits: &LimitsConfig,
) -> Result<()> {
    let mut stmt = conn
        .raw()
        .prepare(&format!("SELECT termid FROM {schema}.dict ORDER BY termid"))
        .map_err(|e| Error::Storage(e.to_string()))?;
    let termids: Vec<i64> = stmt
        .query_map([], |r| r.get::<_, i64>(0))
        .map_err(|e| Error::Storage(e.to_string()))?
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| Error::Storage(e.to_string()))?;

    for chunk in termids.chunks(batch.score_batch.max(1)) {
        let list = chunk
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(",");
        if list.is_empty() {
            continue;
        }

        conn.execute_batch(&format!(
            "DELETE FROM {schema}.scores WHERE termid IN ({list});
             INSERT INTO {schema}.scores (termid, bm25id, score)
             SELECT t.termid, t.bm25id,
                    CAST(
                        ln((s.num_docs - df.doc_freq + 0.5) / (df.doc_freq + 0.5) + 1)
                        * t.tf * ({k1} + 1)
                        / (t.tf + {k1} * (1 - {b} + {b} * d.length / s.avgdl))
                    AS REAL)
             FROM {schema}.terms t
             JOIN {schema}.docs d ON d.bm25id = t.bm25id
             CROSS JOIN {schema}.stats s
             JOIN (
                 SELECT termid, count(*) AS doc_freq
                 FROM {schema}.terms
                 WHERE termid IN ({list})
                 GROUP BY termid
             ) df ON df.termid = t.termid
             WHERE t.termid IN ({list}) AND df.doc_freq <= {max_df};",
            k1 = settings.k1,
            b = settings.b,
            max_df = limits.max_df,
        ))?;
    }

    Ok(())
}

fn fetch_unindexed(conn: &Connection, source: &str, text_expr: &str) -> Result<Vec<(String, String)>> {
    let sql = format!("SELECT id, {text_expr} AS _search FROM {source} WHERE bm25id IS NULL");
    let mut stmt = conn.raw().prepare(&sql).map_err(|e| Error::Storage(e.to_string()))?;
    stmt.query_map([], |r| {
        Ok((
            r.get::<_, String>(0)?,
            r.get::<_, Option<String>>(1)?.unwrap_or_default(),
        ))
    })
    .map_err(|e| Error::Storage(e.to_string()))?
    .collect::<std::result::Result<_, _>>()
    .map_err(|e| Error::Storage(e.to_string()))
}

/// SQL expression producing the text to tokenize for each source row.
/// Queries always index their single `query` column; documents index the
/// concatenation of every field the caller named.
fn text_expression(ns: Namespace, text_fields: &[String]) -> Result<String> {
    match ns {
        Namespace::Queries => Ok("COALESCE(query, '')".to_string()),
        Namespace::Documents => {
            if text_fields.is_empty() {
                return Err(Error::InvalidInput(
                    "at least one text field must be named to build idx_docs".to_string(),
                ));
            }
            for field in text_fields {
                if !is_valid_identifier(field) {
                    return Err(Error::InvalidInput(format!(
                        "'{field}' is not a valid column identifier"
                    )));
                }
            }
            let parts: Vec<String> = text_fields
                .iter()
                .map(|f| format!("COALESCE({f}, '')"))
                .collect();
            Ok(format!("CONCAT_WS(' ', {})", parts.join(", ")))
        }
    }
}
