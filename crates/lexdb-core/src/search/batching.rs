//! Query-batch staging (`spec.md` §4.5, §5): input queries are tokenized in
//! Rust, resolved to `termid`s against `dict`, and staged into a side table
//! keyed by a per-run 256-bit `run_hash` so the join-based scoring SQL in
//! [`super::scorer`] runs once per batch rather than once per query.
//!
//! `run_hash` isolates concurrent runs against the same connection/file and
//! is cleaned up unconditionally: [`StagedBatch`] drops its rows in its
//! `Drop` impl, mirroring [`crate::corpus::staging::StagingDir`]'s RAII
//! cleanup of its parquet files.

use crate::corpus::staging::StagingDir;
use crate::error::{Error, Result};
use crate::storage::Connection;
use crate::tokenizer::Tokenizer;

use super::Hit;

/// One resolved query in a batch: its position (used to key results back to
/// the caller's input order) and the `termid`s its tokens resolved to.
/// Terms absent from `dict` are dropped (`spec.md` §7 `UnknownTerm`: silent,
/// the remaining terms still produce a hit).
pub struct ResolvedQuery {
    pub group_id: i64,
    pub termids: Vec<i64>,
}

/// Tokenizes and resolves every query in `queries` against `schema.dict`.
///
/// # Errors
///
/// Returns an error on a storage failure.
pub fn resolve_queries(
    conn: &Connection,
    schema: &str,
    queries: &[String],
    tokenizer: &Tokenizer,
) -> Result<Vec<ResolvedQuery>> {
    let mut stmt = conn
        .raw()
        .prepare(&format!("SELECT termid FROM {schema}.dict WHERE term = ?"))
        .map_err(|e| Error::Storage(e.to_string()))?;

    queries
        .iter()
        .enumerate()
        .map(|(i, query)| {
            let tokens = tokenizer.tokenize(query);
            let mut termids = Vec::with_capacity(tokens.len());
            for token in &tokens {
                match stmt.query_row([token.as_str()], |r| r.get::<_, i64>(0)) {
                    Ok(termid) => termids.push(termid),
                    Err(duckdb::Error::QueryReturnedNoRows) => {
                        // UnknownTerm: silently dropped per spec.md §7.
                    }
                    Err(e) => return Err(Error::Storage(e.to_string())),
                }
            }
            Ok(ResolvedQuery {
                group_id: i as i64,
                termids,
            })
        })
        .collect()
}

/// A staged batch of `(group_id, termid)` pairs, backing the scorer's
/// join-based candidate gather. Rows are removed from `queries_staging` when
/// this value is dropped.
pub struct StagedBatch<'a> {
    conn: &'a Connection,
    schema: String,
    run_hash: String,
}

impl<'a> StagedBatch<'a> {
    /// Creates `schema.queries_staging` if needed and stages `resolved`'s
    /// `(group_id, termid)` pairs under a fresh `run_hash`.
    ///
    /// # Errors
    ///
    /// Returns an error on a storage failure.
    pub fn stage(conn: &'a Connection, schema: &str, resolved: &[ResolvedQuery]) -> Result<Self> {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {schema}.queries_staging (
                 group_id BIGINT,
                 termid BIGINT,
                 run_hash VARCHAR
             );"
        ))?;

        let dir = StagingDir::new()?;
        let run_hash = dir.run_hash.clone();

        let mut group_ids = Vec::new();
        let mut termids = Vec::new();
        for rq in resolved {
            for termid in &rq.termids {
                group_ids.push(rq.group_id);
                termids.push(*termid);
            }
        }

        if !group_ids.is_empty() {
            let path = dir.file_path(0);
            write_staging_rows(&path, &group_ids, &termids, &run_hash)?;
            conn.raw()
                .execute(
                    &format!(
                        "INSERT INTO {schema}.queries_staging (group_id, termid, run_hash)
                         SELECT group_id, termid, run_hash FROM read_parquet(?);"
                    ),
                    [path.to_string_lossy().as_ref()],
                )
                .map_err(|e| Error::Storage(e.to_string()))?;
        }

        Ok(Self {
            conn,
            schema: schema.to_string(),
            run_hash,
        })
    }

    #[must_use]
    pub fn run_hash(&self) -> &str {
        &self.run_hash
    }
}

impl Drop for StagedBatch<'_> {
    fn drop(&mut self) {
        let _ = self.conn.execute_batch(&format!(
            "DELETE FROM {}.queries_staging WHERE run_hash = '{}';",
            self.schema, self.run_hash
        ));
    }
}

fn write_staging_rows(
    path: &std::path::Path,
    group_ids: &[i64],
    termids: &[i64],
    run_hash: &str,
) -> Result<()> {
    use std::sync::Arc;

    use arrow::array::{ArrayRef, Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;
    use parquet::arrow::ArrowWriter;
    use parquet::basic::Compression;
    use parquet::file::properties::WriterProperties;

    let schema = Arc::new(Schema::new(vec![
        Field::new("group_id", DataType::Int64, false),
        Field::new("termid", DataType::Int64, false),
        Field::new("run_hash", DataType::Utf8, false),
    ]));

    let group_id_array: ArrayRef = Arc::new(Int64Array::from(group_ids.to_vec()));
    let termid_array: ArrayRef = Arc::new(Int64Array::from(termids.to_vec()));
    let run_hash_array: ArrayRef = Arc::new(StringArray::from(vec![run_hash; group_ids.len()]));

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![group_id_array, termid_array, run_hash_array],
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

/// Groups flat scored rows (one per `(group_id, id)`) back into one [`Hit`]
/// list per input query, in input order, truncated to `top_k`.
#[must_use]
pub fn group_hits(num_queries: usize, mut rows: Vec<(i64, Hit)>, top_k: usize) -> Vec<Vec<Hit>> {
    let mut groups: Vec<Vec<Hit>> = vec![Vec::new(); num_queries];
    rows.sort_by_key(|(group_id, _)| *group_id);
    for (group_id, hit) in rows.drain(..) {
        if let Some(group) = groups.get_mut(group_id as usize) {
            group.push(hit);
        }
    }
    for group in &mut groups {
        group.truncate(top_k);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::IndexSettings;
    use crate::storage::{DuckDbDriver, StorageDriver};
    use std::path::Path;

    fn conn() -> Connection {
        DuckDbDriver::default()
            .open(Path::new(":memory:"), false)
            .unwrap()
    }

    #[test]
    fn unknown_terms_are_dropped_not_errored() {
        let conn = conn();
        conn.execute_batch(
            "CREATE SCHEMA idx_docs;
             CREATE TABLE idx_docs.dict (term VARCHAR PRIMARY KEY, termid BIGINT);
             INSERT INTO idx_docs.dict VALUES ('hello', 0);",
        )
        .unwrap();

        let settings = IndexSettings::default();
        let tokenizer = Tokenizer::from_settings(&settings).unwrap();
        let resolved = resolve_queries(
            &conn,
            "idx_docs",
            &["hello galaxy".to_string()],
            &tokenizer,
        )
        .unwrap();

        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].termids, vec![0]);
    }

    #[test]
    fn group_hits_preserves_input_order_and_truncates() {
        let hit = |id: &str, score: f64| Hit {
            id: id.to_string(),
            bm25id: 0,
            score,
            fields: Default::default(),
        };
        let rows = vec![
            (1, hit("b", 1.0)),
            (0, hit("a", 2.0)),
            (0, hit("c", 1.0)),
        ];
        let grouped = group_hits(2, rows, 1);
        assert_eq!(grouped[0].len(), 1);
        assert_eq!(grouped[0][0].id, "a");
        assert_eq!(grouped[1].len(), 1);
        assert_eq!(grouped[1][0].id, "b");
    }
}
