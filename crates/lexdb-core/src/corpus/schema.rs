//! DDL for the `corpus` namespace and schema evolution (`spec.md` §4.2).

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::storage::Connection;

/// Idempotently creates the `corpus` schema and its three tables.
///
/// # Errors
///
/// Returns [`Error::Storage`] on a `DuckDB` failure.
pub fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE SCHEMA IF NOT EXISTS corpus;
         CREATE TABLE IF NOT EXISTS corpus.documents (
             id VARCHAR PRIMARY KEY,
             bm25id BIGINT
         );
         CREATE UNIQUE INDEX IF NOT EXISTS corpus_documents_bm25id
             ON corpus.documents (bm25id);
         CREATE TABLE IF NOT EXISTS corpus.queries (
             id VARCHAR PRIMARY KEY,
             bm25id BIGINT,
             query VARCHAR
         );
         CREATE UNIQUE INDEX IF NOT EXISTS corpus_queries_bm25id
             ON corpus.queries (bm25id);
         CREATE TABLE IF NOT EXISTS corpus.documents_queries (
             document_id VARCHAR,
             query_id VARCHAR,
             score DOUBLE,
             PRIMARY KEY (document_id, query_id)
         );",
    )
}

/// Returns the set of column names currently present on `schema.table`.
///
/// # Errors
///
/// Returns [`Error::Storage`] on a `DuckDB` failure.
pub fn existing_columns(conn: &Connection, schema: &str, table: &str) -> Result<HashSet<String>> {
    let mut stmt = conn
        .raw()
        .prepare(
            "SELECT column_name FROM information_schema.columns
             WHERE table_schema = ? AND table_name = ?",
        )
        .map_err(|e| Error::Storage(e.to_string()))?;

    let rows = stmt
        .query_map([schema, table], |row| row.get::<_, String>(0))
        .map_err(|e| Error::Storage(e.to_string()))?;

    rows.collect::<std::result::Result<HashSet<String>, _>>()
        .map_err(|e| Error::Storage(e.to_string()))
}

/// `ALTER TABLE ADD COLUMN` types a caller's `dtypes` map may name
/// (`SPEC_FULL.md` §3). Anything outside this list is rejected rather than
/// spliced into DDL.
const ALLOWED_DTYPES: [&str; 4] = ["BIGINT", "DOUBLE", "BOOLEAN", "TEXT"];

/// Adds any of `fields` not already present on `schema.table` as `TEXT`
/// columns, unless `dtypes` names a different type for that field
/// (`spec.md` §4.2: "previously unseen fields cause `ALTER TABLE ADD
/// COLUMN`"; `SPEC_FULL.md` §3 restricts the named type to
/// `{BIGINT, DOUBLE, BOOLEAN, TEXT}`).
///
/// # Errors
///
/// Returns [`Error::Storage`] on a `DuckDB` failure, or
/// [`Error::InvalidInput`] if a field name is not a valid identifier or a
/// `dtypes` entry names a type outside the allow-list.
pub fn ensure_columns(
    conn: &Connection,
    schema: &str,
    table: &str,
    fields: &[String],
    dtypes: &std::collections::HashMap<String, String>,
) -> Result<()> {
    let present = existing_columns(conn, schema, table)?;

    for field in fields {
        if present.contains(field) {
            continue;
        }
        if !is_valid_identifier(field) {
            return Err(Error::InvalidInput(format!(
                "'{field}' is not a valid column identifier"
            )));
        }
        let dtype = match dtypes.get(field) {
            Some(dtype) => {
                let upper = dtype.to_ascii_uppercase();
                if !ALLOWED_DTYPES.contains(&upper.as_str()) {
                    return Err(Error::InvalidInput(format!(
                        "'{dtype}' is not a permitted column type (expected one of {ALLOWED_DTYPES:?})"
                    )));
                }
                upper
            }
            None => "TEXT".to_string(),
        };
        conn.execute_batch(&format!(
            "ALTER TABLE {schema}.{table} ADD COLUMN IF NOT EXISTS {field} {dtype};"
        ))?;
    }

    Ok(())
}

pub(crate) fn is_valid_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
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

    #[test]
    fn create_schema_is_idempotent() {
        let conn = conn();
        create_schema(&conn).unwrap();
        create_schema(&conn).unwrap();
    }

    #[test]
    fn ensure_columns_adds_missing_field() {
        let conn = conn();
        create_schema(&conn).unwrap();
        ensure_columns(
            &conn,
            "corpus",
            "documents",
            &["title".to_string(), "text".to_string()],
            &std::collections::HashMap::new(),
        )
        .unwrap();

        let cols = existing_columns(&conn, "corpus", "documents").unwrap();
        assert!(cols.contains("title"));
        assert!(cols.contains("text"));
    }

    #[test]
    fn ensure_columns_is_idempotent() {
        let conn = conn();
        create_schema(&conn).unwrap();
        let fields = vec!["title".to_string()];
        ensure_columns(&conn, "corpus", "documents", &fields, &Default::default()).unwrap();
        ensure_columns(&conn, "corpus", "documents", &fields, &Default::default()).unwrap();
    }

    #[test]
    fn rejects_invalid_identifier() {
        let conn = conn();
        create_schema(&conn).unwrap();
        let result = ensure_columns(
            &conn,
            "corpus",
            "documents",
            &["bad; DROP TABLE documents".to_string()],
            &Default::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn rejects_dtype_outside_allow_list() {
        let conn = conn();
        create_schema(&conn).unwrap();
        let dtypes: std::collections::HashMap<String, String> =
            [("title".to_string(), "VARCHAR(255); DROP TABLE documents".to_string())]
                .into_iter()
                .collect();
        let result = ensure_columns(&conn, "corpus", "documents", &["title".to_string()], &dtypes);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn accepts_dtype_from_allow_list_case_insensitively() {
        let conn = conn();
        create_schema(&conn).unwrap();
        let dtypes: std::collections::HashMap<String, String> =
            [("views".to_string(), "bigint".to_string())].into_iter().collect();
        ensure_columns(&conn, "corpus", "documents", &["views".to_string()], &dtypes).unwrap();
        assert!(existing_columns(&conn, "corpus", "documents").unwrap().contains("views"));
    }
}
