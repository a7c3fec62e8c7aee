//! Graph search (`spec.md` §4.6): a one-hop query→query→document random
//! walk. An input query is first scored against the **queries** index to
//! find similar historical queries, then those neighbours are joined onto
//! `documents_queries` (observed relevance edges); for each document the
//! neighbour's BM25 similarity is weighted by the edge score and summed.
//!
//! This reuses [`crate::search::search`] for the first hop verbatim (same
//! `top_k_token` pruning applies there, per spec) and only the second hop —
//! the edge join and re-aggregation — is new SQL.

use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use crate::corpus::staging::StagingDir;
use crate::error::{Error, Result};
use crate::index::Namespace;
use crate::search::{self, batching, Filter, Hit, SearchOptions};
use crate::storage::Connection;
use crate::tokenizer::Tokenizer;

/// Parameters for [`graph_search`]. `neighbour_limit` bounds how many
/// similar historical queries feed the second hop per input query — the
/// first-hop analogue of `top_k_token`, since without a bound a query with
/// many near-duplicate historical neighbours would pull in their entire
/// edge sets.
#[derive(Debug, Clone)]
pub struct GraphSearchOptions {
    pub top_k: usize,
    pub top_k_token: Option<u64>,
    pub neighbour_limit: usize,
    pub filter: Option<Filter>,
}

impl Default for GraphSearchOptions {
    fn default() -> Self {
        Self {
            top_k: 10,
            top_k_token: None,
            neighbour_limit: 100,
            filter: None,
        }
    }
}

/// Runs the two-hop graph search described in `spec.md` §4.6 and returns one
/// hit list per input query, in input order.
///
/// # Errors
///
/// Returns an error on a storage failure or an invalid `filter`.
pub fn graph_search(
    conn: &Connection,
    queries: &[String],
    query_tokenizer: &Tokenizer,
    opts: &GraphSearchOptions,
) -> Result<Vec<Vec<Hit>>> {
    if queries.is_empty() || opts.top_k == 0 {
        return Ok(vec![Vec::new(); queries.len()]);
    }

    // Hop 1: input query -> similar historical queries (`spec.md` §4.6,
    // reusing the same scorer as `search_queries`).
    let hop1_opts = SearchOptions {
        top_k: opts.neighbour_limit,
        top_k_token: opts.top_k_token,
        filter: None,
        order_by: None,
    };
    let neighbours = search::search(conn, Namespace::Queries, queries, query_tokenizer, &hop1_opts)?;

    let mut group_ids = Vec::new();
    let mut query_ids = Vec::new();
    let mut neighbour_scores = Vec::new();
    for (group_id, hits) in neighbours.iter().enumerate() {
        for hit in hits {
            group_ids.push(group_id as i64);
            query_ids.push(hit.id.clone());
            neighbour_scores.push(hit.score);
        }
    }

    if group_ids.is_empty() {
        return Ok(vec![Vec::new(); queries.len()]);
    }

    let staging = StagingDir::new()?;
    let path = staging.file_path(0);
    write_neighbours(&path, &group_ids, &query_ids, &neighbour_scores)?;

    conn.raw()
        .execute(
            "CREATE OR REPLACE TEMP TABLE graph_staging AS
             SELECT group_id, query_id, neighbour_score FROM read_parquet(?);",
            [path.to_string_lossy().as_ref()],
        )
        .map_err(|e| Error::Storage(e.to_string()))?;

    // Hop 2: neighbour queries -> documents via observed edges, weighted by
    // neighbour similarity (`spec.md` §4.6: "sum neighbour_score *
    // edge_score").
    let filter_sql = opts.filter.as_ref().map(Filter::to_sql).transpose()?;
    let where_clause = filter_sql.map(|f| format!("WHERE {f}")).unwrap_or_default();
    let project_fields = search::project_fields(conn, Namespace::Documents)?;
    let project_cols = project_fields
        .iter()
        .map(|f| format!(", CAST(d.{f} AS VARCHAR) AS {f}"))
        .collect::<String>();

    let sql = format!(
        "WITH weighted AS (
             SELECT gs.group_id AS group_id, dq.document_id AS doc_id,
                    SUM(gs.neighbour_score * dq.score) AS score
             FROM graph_staging gs
             JOIN corpus.documents_queries dq ON dq.query_id = gs.query_id
             GROUP BY gs.group_id, dq.document_id
         )
         SELECT w.group_id, d.bm25id, w.score, d.id{project_cols}
         FROM weighted w
         JOIN corpus.documents d ON d.id = w.doc_id
         {where_clause}
         ORDER BY w.group_id, w.score DESC, d.bm25id ASC;"
    );

    let mut stmt = conn.raw().prepare(&sql).map_err(|e| Error::Storage(e.to_string()))?;
    let rows = stmt
        .query_map([], |r| {
            let group_id: i64 = r.get(0)?;
            let bm25id: Option<i64> = r.get(1)?;
            let score: f64 = r.get(2)?;
            let id: String = r.get(3)?;
            let mut fields = Vec::with_capacity(project_fields.len());
            for i in 0..project_fields.len() {
                fields.push(r.get::<_, Option<String>>(4 + i)?);
            }
            Ok((group_id, bm25id.unwrap_or(-1), score, id, fields))
        })
        .map_err(|e| Error::Storage(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Storage(e.to_string()))?;

    conn.execute_batch("DROP TABLE IF EXISTS graph_staging;")?;

    let flat: Vec<(i64, Hit)> = rows
        .into_iter()
        .map(|(group_id, bm25id, score, id, field_values)| {
            let fields = project_fields.iter().cloned().zip(field_values).collect();
            (group_id, Hit { id, bm25id, score, fields })
        })
        .collect();

    Ok(batching::group_hits(queries.len(), flat, opts.top_k))
}

fn write_neighbours(
    path: &std::path::Path,
    group_ids: &[i64],
    query_ids: &[String],
    scores: &[f64],
) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("group_id", DataType::Int64, false),
        Field::new("query_id", DataType::Utf8, false),
        Field::new("neighbour_score", DataType::Float64, false),
    ]));

    let group_id_array: ArrayRef = Arc::new(Int64Array::from(group_ids.to_vec()));
    let query_id_array: ArrayRef = Arc::new(StringArray::from(query_ids.to_vec()));
    let score_array: ArrayRef = Arc::new(Float64Array::from(scores.to_vec()));

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![group_id_array, query_id_array, score_array],
    )
    .map_err(|e| Error::BulkLoadFailure {
        path: path.display().to_string(),
        table: "<staging>".to_string(),
        source: Box::new(e),
    })?;

    let file = std::fs::File::create(path).map_err(Error::Io)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer =
        ArrowWriter::try_new(file, schema, Some(props)).map_err(|e| Error::BulkLoadFailure {
            path: path.display().to_string(),
            table: "<staging>".to_string(),
            source: Box::new(e),
        })?;
    writer.write(&batch).map_err(|e| Error::BulkLoadFailure {
        path: path.display().to_string(),
        table: "<staging>".to_string(),
        source: Box::new(e),
    })?;
    writer.close().map_err(|e| Error::BulkLoadFailure {
        path: path.display().to_string(),
        table: "<staging>".to_string(),
        source: Box::new(e),
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BatchConfig, LimitsConfig};
    use crate::corpus::{self, DocumentRow, InteractionEdge, QueryRow};
    use crate::index::builder::update_index;
    use crate::settings::IndexSettings;
    use crate::storage::{DuckDbDriver, StorageDriver};
    use std::collections::HashMap;
    use std::path::Path;

    fn conn() -> Connection {
        DuckDbDriver::default()
            .open(Path::new(":memory:"), false)
            .unwrap()
    }

    #[test]
    fn known_query_surfaces_linked_documents_proportional_to_edge_weight() {
        let conn = conn();
        let settings = IndexSettings::default();
        let tokenizer = Tokenizer::from_settings(&settings).unwrap();

        let docs = vec![
            DocumentRow {
                id: "d1".to_string(),
                fields: [("text".to_string(), "rust programming".to_string())]
                    .into_iter()
                    .collect(),
            },
            DocumentRow {
                id: "d2".to_string(),
                fields: [("text".to_string(), "python programming".to_string())]
                    .into_iter()
                    .collect(),
            },
        ];
        corpus::insert_documents(&conn, &docs, &HashMap::new(), 1000).unwrap();
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

        corpus::insert_queries(
            &conn,
            &[QueryRow {
                id: "q1".to_string(),
                query: "rust language".to_string(),
            }],
            1000,
        )
        .unwrap();
        update_index(
            &conn,
            Namespace::Queries,
            &[],
            &tokenizer,
            &settings,
            &BatchConfig::default(),
            &LimitsConfig::default(),
        )
        .unwrap();

        corpus::insert_documents_queries(
            &conn,
            &[
                InteractionEdge {
                    document_id: "d1".to_string(),
                    query_id: "q1".to_string(),
                    score: 1.0,
                },
                InteractionEdge {
                    document_id: "d2".to_string(),
                    query_id: "q1".to_string(),
                    score: 0.1,
                },
            ],
        )
        .unwrap();

        let hits = graph_search(
            &conn,
            &["rust language".to_string()],
            &tokenizer,
            &GraphSearchOptions::default(),
        )
        .unwrap();

        assert_eq!(hits[0][0].id, "d1");
        assert!(hits[0][0].score > hits[0].get(1).map_or(0.0, |h| h.score));
    }

    #[test]
    fn empty_queries_yield_empty_results() {
        let conn = conn();
        let settings = IndexSettings::default();
        let tokenizer = Tokenizer::from_settings(&settings).unwrap();
        let hits = graph_search(&conn, &[], &tokenizer, &GraphSearchOptions::default()).unwrap();
        assert!(hits.is_empty());
    }
}
