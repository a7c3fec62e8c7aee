//! Deletion protocol (`spec.md` §4.4): remove a set of document ids from the
//! index, then from the corpus, in the order invariant 1 requires.
//!
//! Steps 2-4 (scores/terms/docs) must run before step 5 (stats); step 6
//! (corpus.documents) must run last. `avgdl` drift from the deleted rows is
//! accepted as stale until the next `update_index` (`spec.md` §4.4).

use crate::corpus;
use crate::error::{Error, Result};
use crate::storage::Connection;

use super::Namespace;

/// Runs the full deletion protocol for `ids` against `ns`'s index and source
/// tables.
///
/// # Errors
///
/// Returns an error on a storage failure. Unknown ids (not present in the
/// source table, or present but never indexed) are silently skipped.
pub fn delete(conn: &Connection, ns: Namespace, ids: &[String]) -> Result<()> {
    if ids.is_empty() {
        return Ok(());
    }

    let schema = ns.index_schema();
    let source = format!("corpus.{}", ns.source_table());

    let staging = corpus::staging::StagingDir::new()?;
    let ids_path = staging.file_path(0);
    corpus::staging::write_ids(&ids_path, ids)?;

    conn.raw()
        .execute(
            &format!(
                "CREATE OR REPLACE TEMP TABLE delete_ids AS
                 SELECT bm25id FROM {source}
                 WHERE id IN (SELECT id FROM read_parquet(?))
                   AND bm25id IS NOT NULL;"
            ),
            [ids_path.to_string_lossy().as_ref()],
        )
        .map_err(|e| Error::Storage(e.to_string()))?;

    // Steps 2-4: scores, then terms, then docs, in that order (invariant 3
    // requires every scores row to have a matching terms row; deleting terms
    // first would leave scores pointing at nothing, if briefly).
    conn.execute_batch(&format!(
        "DELETE FROM {schema}.scores WHERE bm25id IN (SELECT bm25id FROM delete_ids);
         DELETE FROM {schema}.terms WHERE bm25id IN (SELECT bm25id FROM delete_ids);
         DELETE FROM {schema}.docs WHERE bm25id IN (SELECT bm25id FROM delete_ids);"
    ))?;

    // Step 5: stats recomputed from the post-delete docs table.
    conn.execute_batch(&format!(
        "DELETE FROM {schema}.stats;
         INSERT INTO {schema}.stats (num_docs, avgdl)
         SELECT count(*), COALESCE(avg(length), 0.0) FROM {schema}.docs;"
    ))?;

    conn.execute_batch("DROP TABLE IF EXISTS delete_ids;")?;

    // Step 6: corpus row removal happens last, after every index table has
    // forgotten the bm25id (invariant 1).
    corpus::delete_by_ids(conn, ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BatchConfig, LimitsConfig};
    use crate::corpus::DocumentRow;
    use crate::index::builder::update_index;
    use crate::settings::IndexSettings;
    use crate::storage::{DuckDbDriver, StorageDriver};
    use crate::tokenizer::Tokenizer;
    use std::collections::HashMap;
    use std::path::Path;

    fn conn() -> Connection {
        DuckDbDriver::default()
            .open(Path::new(":memory:"), false)
            .unwrap()
    }

    fn doc(id: &str, text: &str) -> DocumentRow {
        DocumentRow {
            id: id.to_string(),
            fields: [("text".to_string(), text.to_string())].into_iter().collect(),
        }
    }

    fn index_three(conn: &Connection) -> IndexSettings {
        let settings = IndexSettings::default();
        let tokenizer = Tokenizer::from_settings(&settings).unwrap();
        let rows = vec![
            doc("1", "hello world"),
            doc("2", "world peace"),
            doc("3", "hello peace"),
        ];
        corpus::insert_documents(conn, &rows, &HashMap::new(), 1000).unwrap();
        update_index(
            conn,
            Namespace::Documents,
            &["text".to_string()],
            &tokenizer,
            &settings,
            &BatchConfig::default(),
            &LimitsConfig::default(),
        )
        .unwrap();
        settings
    }

    #[test]
    fn delete_removes_scores_terms_docs_and_corpus_row() {
        let conn = conn();
        index_three(&conn);

        delete(&conn, Namespace::Documents, &["2".to_string()]).unwrap();

        let corpus_count: i64 = conn
            .raw()
            .query_row("SELECT count(*) FROM corpus.documents", [], |r| r.get(0))
            .unwrap();
        assert_eq!(corpus_count, 2);

        let docs_count: i64 = conn
            .raw()
            .query_row("SELECT count(*) FROM idx_docs.docs", [], |r| r.get(0))
            .unwrap();
        assert_eq!(docs_count, 2);

        let num_docs: i64 = conn
            .raw()
            .query_row("SELECT num_docs FROM idx_docs.stats", [], |r| r.get(0))
            .unwrap();
        assert_eq!(num_docs, 2);
    }

    #[test]
    fn insert_delete_round_trip_empties_every_index_table() {
        let conn = conn();
        index_three(&conn);

        delete(
            &conn,
            Namespace::Documents,
            &["1".to_string(), "2".to_string(), "3".to_string()],
        )
        .unwrap();

        for table in ["scores", "terms", "docs"] {
            let count: i64 = conn
                .raw()
                .query_row(&format!("SELECT count(*) FROM idx_docs.{table}"), [], |r| {
                    r.get(0)
                })
                .unwrap();
            assert_eq!(count, 0, "{table} should be empty");
        }

        let num_docs: i64 = conn
            .raw()
            .query_row("SELECT num_docs FROM idx_docs.stats", [], |r| r.get(0))
            .unwrap();
        assert_eq!(num_docs, 0);
    }

    #[test]
    fn unknown_id_is_a_silent_no_op() {
        let conn = conn();
        index_three(&conn);
        delete(&conn, Namespace::Documents, &["does-not-exist".to_string()]).unwrap();

        let corpus_count: i64 = conn
            .raw()
            .query_row("SELECT count(*) FROM corpus.documents", [], |r| r.get(0))
            .unwrap();
        assert_eq!(corpus_count, 3);
    }

    #[test]
    fn empty_id_list_is_a_no_op() {
        let conn = conn();
        index_three(&conn);
        delete(&conn, Namespace::Documents, &[]).unwrap();

        let corpus_count: i64 = conn
            .raw()
            .query_row("SELECT count(*) FROM corpus.documents", [], |r| r.get(0))
            .unwrap();
        assert_eq!(corpus_count, 3);
    }
}
