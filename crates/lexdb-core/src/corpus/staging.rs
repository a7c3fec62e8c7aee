//! Parquet staging for bulk loads (`spec.md` §4.2, §5).
//!
//! Every ingest and search path funnels rows through a run-scoped temporary
//! directory: write snappy-compressed parquet, bulk-load it with a single
//! `INSERT … SELECT`, then let the directory's `Drop` remove everything, on
//! every exit path including panics and early returns.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{ArrayRef, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use rand::RngCore;
use tempfile::TempDir;

use crate::error::{Error, Result};

/// A run-scoped staging directory. Dropped (and removed from disk) at the
/// end of the call that created it, regardless of how that call exits.
pub struct StagingDir {
    dir: TempDir,
    /// 256-bit random hash identifying this run, hex-encoded (`spec.md` §5,
    /// §6 — isolates concurrent runs' staged rows and parquet filenames).
    pub run_hash: String,
}

impl StagingDir {
    /// Creates a new staging directory under the system temp root.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the directory cannot be created.
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("lexdb-")
            .tempdir()
            .map_err(Error::Io)?;

        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let run_hash = bytes.iter().map(|b| format!("{b:02x}")).collect();

        Ok(Self { dir, run_hash })
    }

    /// Path to the staging directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path for the `index`-th parquet file of this run.
    #[must_use]
    pub fn file_path(&self, index: usize) -> PathBuf {
        self.dir
            .path()
            .join(format!("{}-{index}.parquet", self.run_hash))
    }
}

/// Writes `(id, token, tf)` postings to a snappy-compressed parquet file,
/// the staged form consumed by the index builder's tokenize stage
/// (`spec.md` §4.3 step 2).
///
/// # Errors
///
/// Returns [`Error::BulkLoadFailure`] if the file cannot be written.
pub fn write_postings(
    path: &Path,
    ids: &[String],
    tokens: &[String],
    tfs: &[i64],
) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("token", DataType::Utf8, false),
        Field::new("tf", DataType::Int64, false),
    ]));

    let id_array: ArrayRef = Arc::new(StringArray::from(ids.to_vec()));
    let token_array: ArrayRef = Arc::new(StringArray::from(tokens.to_vec()));
    let tf_array: ArrayRef = Arc::new(Int64Array::from(tfs.to_vec()));

    write_batch(path, schema, vec![id_array, token_array, tf_array])
}

/// Writes `(id, length)` rows to parquet — document/query lengths staged
/// ahead of the `docs` table bulk-load (`spec.md` §4.3 step 4).
///
/// # Errors
///
/// Returns [`Error::BulkLoadFailure`] if the file cannot be written.
pub fn write_lengths(path: &Path, ids: &[String], lengths: &[i64]) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("length", DataType::Int64, false),
    ]));

    let id_array: ArrayRef = Arc::new(StringArray::from(ids.to_vec()));
    let length_array: ArrayRef = Arc::new(Int64Array::from(lengths.to_vec()));

    write_batch(path, schema, vec![id_array, length_array])
}

/// Writes a single column of token strings to parquet, staged ahead of a
/// `dict` upsert (`spec.md` §4.3 step 3).
///
/// # Errors
///
/// Returns [`Error::BulkLoadFailure`] if the file cannot be written.
pub fn write_tokens(path: &Path, tokens: &[String]) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![Field::new("token", DataType::Utf8, false)]));
    let token_array: ArrayRef = Arc::new(StringArray::from(tokens.to_vec()));
    write_batch(path, schema, vec![token_array])
}

/// Writes a single column of string ids to parquet, the shape used for
/// staged document-id deletion batches (`spec.md` §4.4 step 1).
///
/// # Errors
///
/// Returns [`Error::BulkLoadFailure`] if the file cannot be written.
pub fn write_ids(path: &Path, ids: &[String]) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Utf8, false)]));
    let id_array: ArrayRef = Arc::new(StringArray::from(ids.to_vec()));
    write_batch(path, schema, vec![id_array])
}

fn write_batch(path: &Path, schema: Arc<Schema>, columns: Vec<ArrayRef>) -> Result<()> {
    let batch = RecordBatch::try_new(schema.clone(), columns).map_err(|e| {
        Error::BulkLoadFailure {
            path: path.display().to_string(),
            table: "<staging>".to_string(),
            source: Box::new(e),
        }
    })?;

    let file = File::create(path).map_err(Error::Io)?;
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

    #[test]
    fn staging_dir_is_removed_on_drop() {
        let path = {
            let staging = StagingDir::new().unwrap();
            let p = staging.path().to_path_buf();
            assert!(p.exists());
            p
        };
        assert!(!path.exists());
    }

    #[test]
    fn run_hash_is_64_hex_chars() {
        let staging = StagingDir::new().unwrap();
        assert_eq!(staging.run_hash.len(), 64);
        assert!(staging.run_hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn two_runs_get_distinct_hashes() {
        let a = StagingDir::new().unwrap();
        let b = StagingDir::new().unwrap();
        assert_ne!(a.run_hash, b.run_hash);
    }

    #[test]
    fn writes_postings_parquet_file() {
        let staging = StagingDir::new().unwrap();
        let path = staging.file_path(0);
        write_postings(
            &path,
            &["1".to_string(), "1".to_string()],
            &["hello".to_string(), "world".to_string()],
            &[1, 1],
        )
        .unwrap();
        assert!(path.exists());
    }
}
