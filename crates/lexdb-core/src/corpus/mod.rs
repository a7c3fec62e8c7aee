//! The `corpus` namespace: `documents`, `queries`, `documents_queries`
//! (`spec.md` §3, §4.2).
//!
//! This is the caller-facing source of truth. The index namespaces
//! (`idx_docs`, `idx_queries`, see [`crate::index`]) are derived from it and
//! rebuilt incrementally by `update_index`.

pub mod schema;
pub mod staging;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use crate::error::{Error, Result};
use crate::storage::Connection;

/// A caller-supplied document: an id plus an arbitrary, sparse set of text
/// fields. A `BTreeMap` keeps column order deterministic across a batch.
#[derive(Debug, Clone, Default)]
pub struct DocumentRow {
    pub id: String,
    pub fields: BTreeMap<String, String>,
}

/// A caller-supplied query row (`spec.md` §3 `queries(id, bm25id, query)`).
#[derive(Debug, Clone)]
pub struct QueryRow {
    pub id: String,
    pub query: String,
}

/// An observed document↔query interaction edge.
#[derive(Debug, Clone)]
pub struct InteractionEdge {
    pub document_id: String,
    pub query_id: String,
    pub score: f64,
}

/// Inserts or upserts documents into `corpus.documents`, evolving the schema
/// to add any new fields (`spec.md` §4.2).
///
/// Rows are staged to parquet in chunks of `batch_rows` and bulk-loaded with
/// a single `INSERT … SELECT … ON CONFLICT` per chunk; existing ids are
/// updated only on the fields supplied, `bm25id` is left untouched.
///
/// # Errors
///
/// Returns [`Error::Storage`] or [`Error::BulkLoadFailure`] on failure.
pub fn insert_documents(
    conn: &Connection,
    rows: &[DocumentRow],
    dtypes: &HashMap<String, String>,
    batch_rows: usize,
) -> Result<()> {
    schema::create_schema(conn)?;

    if rows.is_empty() {
        return Ok(());
    }

    let mut all_fields: Vec<String> = rows
        .iter()
        .flat_map(|r| r.fields.keys().cloned())
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();
    all_fields.sort();

    schema::ensure_columns(conn, "corpus", "documents", &all_fields, dtypes)?;

    for chunk in rows.chunks(batch_rows.max(1)) {
        let staging = staging::StagingDir::new()?;
        let path = staging.file_path(0);
        write_document_chunk(&path, chunk, &all_fields)?;
        upsert_documents_from_parquet(conn, &path, &all_fields)?;
    }

    Ok(())
}

/// Inserts or upserts rows into `corpus.queries` (`spec.md` §4.2
/// `insert_queries`).
///
/// # Errors
///
/// Returns [`Error::Storage`] or [`Error::BulkLoadFailure`] on failure.
pub fn insert_queries(conn: &Connection, rows: &[QueryRow], batch_rows: usize) -> Result<()> {
    schema::create_schema(conn)?;

    if rows.is_empty() {
        return Ok(());
    }

    for chunk in rows.chunks(batch_rows.max(1)) {
        let staging = staging::StagingDir::new()?;
        let path = staging.file_path(0);
        write_query_chunk(&path, chunk)?;

        conn.raw()
            .execute(
                "INSERT INTO corpus.queries (id, query)
                 SELECT id, query FROM read_parquet(?)
                 ON CONFLICT (id) DO UPDATE SET query = EXCLUDED.query;",
                [path.to_string_lossy().as_ref()],
            )
            .map_err(|e| Error::BulkLoadFailure {
                path: path.display().to_string(),
                table: "corpus.queries".to_string(),
                source: Box::new(e),
            })?;
    }

    Ok(())
}

/// Records document↔query interaction edges, auto-inserting any query id
/// that is not yet present in `corpus.queries` with an empty `query` text
/// (`spec.md` §4.2 `insert_documents_queries`: "missing queries are
/// auto-inserted into `queries`").
///
/// # Errors
///
/// Returns [`Error::Storage`] or [`Error::BulkLoadFailure`] on failure.
pub fn insert_documents_queries(conn: &Connection, edges: &[InteractionEdge]) -> Result<()> {
    schema::create_schema(conn)?;

    if edges.is_empty() {
        return Ok(());
    }

    let missing_queries: Vec<QueryRow> = {
        let mut seen = std::collections::BTreeSet::new();
        edges
            .iter()
            .filter(|e| seen.insert(e.query_id.clone()))
            .map(|e| QueryRow {
                id: e.query_id.clone(),
                query: String::new(),
            })
            .collect()
    };

    // Auto-insert queries that don't exist yet; existing ones are untouched
    // because `ON CONFLICT DO NOTHING` never overwrites a real query string
    // with this placeholder.
    let staging = staging::StagingDir::new()?;
    let path = staging.file_path(0);
    write_query_chunk(&path, &missing_queries)?;
    conn.raw()
        .execute(
            "INSERT INTO corpus.queries (id, query)
             SELECT id, query FROM read_parquet(?)
             ON CONFLICT (id) DO NOTHING;",
            [path.to_string_lossy().as_ref()],
        )
        .map_err(|e| Error::BulkLoadFailure {
            path: path.display().to_string(),
            table: "corpus.queries".to_string(),
            source: Box::new(e),
        })?;

    let edges_staging = staging::StagingDir::new()?;
    let edges_path = edges_staging.file_path(0);
    write_edges_chunk(&edges_path, edges)?;
    conn.raw()
        .execute(
            "INSERT INTO corpus.documents_queries (document_id, query_id, score)
             SELECT document_id, query_id, score FROM read_parquet(?)
             ON CONFLICT (document_id, query_id) DO UPDATE SET score = EXCLUDED.score;",
            [edges_path.to_string_lossy().as_ref()],
        )
        .map_err(|e| Error::BulkLoadFailure {
            path: edges_path.display().to_string(),
            table: "corpus.documents_queries".to_string(),
            source: Box::new(e),
        })?;

    Ok(())
}

/// Deletes rows from `corpus.documents` by id. This is the final step of
/// the deletion protocol (`spec.md` §4.4 step 6) — callers must delete the
/// corresponding index rows first via [`crate::index::delete`].
///
/// # Errors
///
/// Returns [`Error::Storage`] on failure.
pub fn delete_by_ids(conn: &Connection, ids: &[String]) -> Result<()> {
    if ids.is_empty() {
        return Ok(());
    }

    let staging = staging::StagingDir::new()?;
    let path = staging.file_path(0);
    staging::write_ids(&path, ids)?;

    conn.raw()
        .execute(
            "DELETE FROM corpus.documents
             WHERE id IN (SELECT id FROM read_parquet(?));",
            [path.to_string_lossy().as_ref()],
        )
        .map_err(|e| Error::Storage(e.to_string()))?;

    Ok(())
}

fn upsert_documents_from_parquet(conn: &Connection, path: &std::path::Path, fields: &[String]) -> Result<()> {
    let mut columns = vec!["id".to_string()];
    columns.extend(fields.iter().cloned());
    let column_list = columns.join(", ");
    let update_list = fields
        .iter()
        .map(|f| format!("{f} = EXCLUDED.{f}"))
        .collect::<Vec<_>>()
        .join(", ");

    let sql = if fields.is_empty() {
        format!(
            "INSERT INTO corpus.documents ({column_list})
             SELECT {column_list} FROM read_parquet(?)
             ON CONFLICT (id) DO NOTHING;"
        )
    } else {
        format!(
            "INSERT INTO corpus.documents ({column_list})
             SELECT {column_list} FROM read_parquet(?)
             ON CONFLICT (id) DO UPDATE SET {update_list};"
        )
    };

    conn.raw()
        .execute(&sql, [path.to_string_lossy().as_ref()])
        .map_err(|e| Error::BulkLoadFailure {
            path: path.display().to_string(),
            table: "corpus.documents".to_string(),
            source: Box::new(e),
        })?;

    Ok(())
}

fn write_document_chunk(
    path: &std::path::Path,
    rows: &[DocumentRow],
    fields: &[String],
) -> Result<()> {
    let mut arrow_fields = vec![Field::new("id", DataType::Utf8, false)];
    arrow_fields.extend(fields.iter().map(|f| Field::new(f, DataType::Utf8, true)));
    let schema = Arc::new(Schema::new(arrow_fields));

    let mut columns: Vec<ArrayRef> = vec![Arc::new(StringArray::from(
        rows.iter().map(|r| r.id.clone()).collect::<Vec<_>>(),
    ))];

    for field in fields {
        let values: Vec<Option<String>> = rows.iter().map(|r| r.fields.get(field).cloned()).collect();
        columns.push(Arc::new(StringArray::from(values)));
    }

    write_parquet(path, schema, columns)
}

fn write_query_chunk(path: &std::path::Path, rows: &[QueryRow]) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("query", DataType::Utf8, false),
    ]));
    let ids: ArrayRef = Arc::new(StringArray::from(
        rows.iter().map(|r| r.id.clone()).collect::<Vec<_>>(),
    ));
    let queries: ArrayRef = Arc::new(StringArray::from(
        rows.iter().map(|r| r.query.clone()).collect::<Vec<_>>(),
    ));
    write_parquet(path, schema, vec![ids, queries])
}

fn write_edges_chunk(path: &std::path::Path, edges: &[InteractionEdge]) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("document_id", DataType::Utf8, false),
        Field::new("query_id", DataType::Utf8, false),
        Field::new("score", DataType::Float64, false),
    ]));
    let docs: ArrayRef = Arc::new(StringArray::from(
        edges.iter().map(|e| e.document_id.clone()).collect::<Vec<_>>(),
    ));
    let queries: ArrayRef = Arc::new(StringArray::from(
        edges.iter().map(|e| e.query_id.clone()).collect::<Vec<_>>(),
    ));
    let scores: ArrayRef = Arc::new(Float64Array::from(
        edges.iter().map(|e| e.score).collect::<Vec<_>>(),
    ));
    write_parquet(path, schema, vec![docs, queries, scores])
}

fn write_parquet(path: &std::path::Path, schema: Arc<Schema>, columns: Vec<ArrayRef>) -> Result<()> {
    let batch = RecordBatch::try_new(schema.clone(), columns).map_err(|e| Error::BulkLoadFailure {
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
    use crate::storage::{DuckDbDriver, StorageDriver};
    use std::path::Path;

    fn conn() -> Connection {
        DuckDbDriver::default()
            .open(Path::new(":memory:"), false)
            .unwrap()
    }

    fn doc(id: &str, fields: &[(&str, &str)]) -> DocumentRow {
        DocumentRow {
            id: id.to_string(),
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn insert_then_reinsert_upserts_supplied_fields_only() {
        let conn = conn();
        let rows = vec![doc("1", &[("title", "hello"), ("text", "world")])];
        insert_documents(&conn, &rows, &HashMap::new(), 1000).unwrap();

        let updated = vec![doc("1", &[("title", "updated")])];
        insert_documents(&conn, &updated, &HashMap::new(), 1000).unwrap();

        let title: String = conn
            .raw()
            .query_row("SELECT title FROM corpus.documents WHERE id = '1'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(title, "updated");

        let text: String = conn
            .raw()
            .query_row("SELECT text FROM corpus.documents WHERE id = '1'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(text, "world");
    }

    #[test]
    fn insert_documents_queries_auto_inserts_missing_queries() {
        let conn = conn();
        let rows = vec![doc("1", &[("title", "hello")])];
        insert_documents(&conn, &rows, &HashMap::new(), 1000).unwrap();

        insert_documents_queries(
            &conn,
            &[InteractionEdge {
                document_id: "1".to_string(),
                query_id: "q1".to_string(),
                score: 0.9,
            }],
        )
        .unwrap();

        let count: i64 = conn
            .raw()
            .query_row("SELECT count(*) FROM corpus.queries WHERE id = 'q1'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn delete_by_ids_removes_rows() {
        let conn = conn();
        let rows = vec![doc("1", &[]), doc("2", &[])];
        insert_documents(&conn, &rows, &HashMap::new(), 1000).unwrap();

        delete_by_ids(&conn, &["1".to_string()]).unwrap();

        let count: i64 = conn
            .raw()
            .query_row("SELECT count(*) FROM corpus.documents", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
