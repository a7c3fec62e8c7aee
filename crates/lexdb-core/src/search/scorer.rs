//! Candidate gather, accumulate, order, and project (`spec.md` §4.5 steps
//! 3-7): the join-based SQL executed once per staged query batch.
//!
//! `top_k_token` bounds each term's contribution to a single window-function
//! pass over `scores` (`spec.md` §4.5: "a WAND-style approximation rather
//! than exact top-k"), so a common term's millions of postings never have to
//! be summed in full; accumulation then sums the pruned per-term scores per
//! `(group_id, bm25id)` and the final projection joins back onto the source
//! table for the caller's requested fields.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::storage::Connection;

use super::batching::StagedBatch;
use super::Hit;

/// Runs the candidate-gather/accumulate/order/project pipeline for one
/// staged batch and returns flat `(group_id, Hit)` pairs in per-group score
/// order (grouping and top-k truncation happen in
/// [`super::batching::group_hits`]).
///
/// # Errors
///
/// Returns [`Error::InvalidFilter`] if `filter_sql` was not validated by
/// [`super::filter::Filter::to_sql`], or an error on a storage failure.
#[allow(clippy::too_many_arguments)]
pub fn score_batch(
    conn: &Connection,
    schema: &str,
    source: &str,
    staged: &StagedBatch<'_>,
    top_k_token: u64,
    filter_sql: Option<&str>,
    order_by: Option<&str>,
    project_fields: &[String],
) -> Result<Vec<(i64, Hit)>> {
    let order_expr = order_by.unwrap_or("a.score DESC, a.bm25id ASC");
    let where_clause = filter_sql
        .map(|f| format!("WHERE {f}"))
        .unwrap_or_default();

    let project_cols = project_fields
        .iter()
        .map(|f| format!(", CAST(d.{f} AS VARCHAR) AS {f}"))
        .collect::<String>();

    let sql = format!(
        "WITH pruned AS (
             SELECT termid, bm25id, score FROM (
                 SELECT termid, bm25id, score,
                        ROW_NUMBER() OVER (PARTITION BY termid ORDER BY score DESC, bm25id ASC) AS rn
                 FROM {schema}.scores
                 WHERE termid IN (
                     SELECT DISTINCT termid FROM {schema}.queries_staging WHERE run_hash = ?
                 )
             ) ranked WHERE rn <= ?
         ),
         accumulated AS (
             SELECT qs.group_id AS group_id, p.bm25id AS bm25id, SUM(p.score) AS score
             FROM {schema}.queries_staging qs
             JOIN pruned p ON p.termid = qs.termid
             WHERE qs.run_hash = ?
             GROUP BY qs.group_id, p.bm25id
         )
         SELECT a.group_id, a.bm25id, a.score, d.id{project_cols}
         FROM accumulated a
         JOIN {source} d ON d.bm25id = a.bm25id
         {where_clause}
         ORDER BY a.group_id, {order_expr};"
    );

    let run_hash = staged.run_hash();
    let mut stmt = conn.raw().prepare(&sql).map_err(|e| Error::Storage(e.to_string()))?;

    let rows = stmt
        .query_map(
            duckdb::params![run_hash, top_k_token, run_hash],
            |r| -> std::result::Result<(i64, i64, f64, String, Vec<Option<String>>), duckdb::Error> {
                let group_id: i64 = r.get(0)?;
                let bm25id: i64 = r.get(1)?;
                let score: f64 = r.get(2)?;
                let id: String = r.get(3)?;
                let mut fields = Vec::with_capacity(project_fields.len());
                for i in 0..project_fields.len() {
                    fields.push(r.get::<_, Option<String>>(4 + i)?);
                }
                Ok((group_id, bm25id, score, id, fields))
            },
        )
        .map_err(|e| Error::Storage(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Storage(e.to_string()))?;

    Ok(rows
        .into_iter()
        .map(|(group_id, bm25id, score, id, field_values)| {
            let fields: BTreeMap<String, Option<String>> = project_fields
                .iter()
                .cloned()
                .zip(field_values)
                .collect();
            (
                group_id,
                Hit {
                    id,
                    bm25id,
                    score,
                    fields,
                },
            )
        })
        .collect())
}
