//! Persistence for [`super::IndexSettings`]: one row per index namespace,
//! written once (`spec.md` §3 invariant 4, §7 `SchemaConflict`).

use tracing::warn;

use crate::error::Result;
use crate::storage::Connection;

use super::{IndexSettings, StemmerName, StopwordsSetting};

fn ensure_schema(conn: &Connection, ns: &str) -> Result<()> {
    conn.execute_batch(&format!(
        "CREATE SCHEMA IF NOT EXISTS {ns};
         CREATE TABLE IF NOT EXISTS {ns}.settings (
             k1 DOUBLE NOT NULL,
             b DOUBLE NOT NULL,
             stemmer VARCHAR NOT NULL,
             stopwords_ref VARCHAR NOT NULL,
             ignore_regex VARCHAR NOT NULL,
             strip_accents BOOLEAN NOT NULL,
             lower BOOLEAN NOT NULL
         );
         CREATE TABLE IF NOT EXISTS {ns}.stopwords (word VARCHAR);"
    ))
}

/// Reads the pinned settings for `ns`, if any have been written yet.
///
/// # Errors
///
/// Returns an error on a storage failure (not on "no settings yet", which is
/// `Ok(None)`).
pub fn load(conn: &Connection, ns: &str) -> Result<Option<IndexSettings>> {
    ensure_schema(conn, ns)?;

    let row = conn.raw().query_row(
        &format!(
            "SELECT k1, b, stemmer, stopwords_ref, ignore_regex, strip_accents, lower
             FROM {ns}.settings LIMIT 1"
        ),
        [],
        |r| {
            Ok((
                r.get::<_, f64>(0)?,
                r.get::<_, f64>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, String>(4)?,
                r.get::<_, bool>(5)?,
                r.get::<_, bool>(6)?,
            ))
        },
    );

    let (k1, b, stemmer, stopwords_ref, ignore, strip_accents, lower) = match row {
        Ok(row) => row,
        Err(duckdb::Error::QueryReturnedNoRows) => return Ok(None),
        Err(e) => return Err(crate::error::Error::Storage(e.to_string())),
    };

    let stemmer = StemmerName::parse(&stemmer).unwrap_or_default();
    let stopwords = if stopwords_ref == "custom" {
        let mut stmt = conn
            .raw()
            .prepare(&format!("SELECT word FROM {ns}.stopwords"))
            .map_err(|e| crate::error::Error::Storage(e.to_string()))?;
        let words = stmt
            .query_map([], |r| r.get::<_, String>(0))
            .map_err(|e| crate::error::Error::Storage(e.to_string()))?
            .collect::<std::result::Result<std::collections::HashSet<String>, _>>()
            .map_err(|e| crate::error::Error::Storage(e.to_string()))?;
        StopwordsSetting::Custom(words)
    } else if let Some(lang) = stopwords_ref.strip_prefix("lang:") {
        StopwordsSetting::Language(lang.to_string())
    } else {
        StopwordsSetting::None
    };

    Ok(Some(IndexSettings {
        k1,
        b,
        stemmer,
        stopwords,
        ignore,
        strip_accents,
        lower,
    }))
}

/// Pins `settings` as the permanent settings for `ns` if none exist yet;
/// otherwise compares against the stored settings and returns the stored
/// ones, logging a warning for every field that diverges (`spec.md` §3
/// invariant 4). The caller always gets back the settings actually in
/// effect — never what it asked for if that differs from what's pinned.
///
/// # Errors
///
/// Returns an error on a storage failure.
pub fn pin(conn: &Connection, ns: &str, settings: &IndexSettings) -> Result<IndexSettings> {
    ensure_schema(conn, ns)?;

    match load(conn, ns)? {
        Some(existing) => {
            for (field, kept, rejected) in settings.diff(&existing) {
                warn!(ns, field, kept, rejected, "settings already pinned for this index; divergent value ignored");
            }
            Ok(existing)
        }
        None => {
            let stopwords_ref = match &settings.stopwords {
                StopwordsSetting::None => "none".to_string(),
                StopwordsSetting::Language(lang) => format!("lang:{lang}"),
                StopwordsSetting::Custom(_) => "custom".to_string(),
            };

            conn.raw()
                .execute(
                    &format!(
                        "INSERT INTO {ns}.settings
                         (k1, b, stemmer, stopwords_ref, ignore_regex, strip_accents, lower)
                         VALUES (?, ?, ?, ?, ?, ?, ?)"
                    ),
                    duckdb::params![
                        settings.k1,
                        settings.b,
                        settings.stemmer.as_str(),
                        stopwords_ref,
                        settings.ignore,
                        settings.strip_accents,
                        settings.lower,
                    ],
                )
                .map_err(|e| crate::error::Error::Storage(e.to_string()))?;

            if let StopwordsSetting::Custom(words) = &settings.stopwords {
                let mut stmt = conn
                    .raw()
                    .prepare(&format!("INSERT INTO {ns}.stopwords (word) VALUES (?)"))
                    .map_err(|e| crate::error::Error::Storage(e.to_string()))?;
                for word in words {
                    stmt.execute([word])
                        .map_err(|e| crate::error::Error::Storage(e.to_string()))?;
                }
            }

            Ok(settings.clone())
        }
    }
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
    fn first_pin_persists_settings() {
        let conn = conn();
        let settings = IndexSettings::default();
        let pinned = pin(&conn, "idx_docs", &settings).unwrap();
        assert_eq!(pinned, settings);

        let loaded = load(&conn, "idx_docs").unwrap().unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn second_pin_with_divergent_k1_keeps_original() {
        let conn = conn();
        let first = IndexSettings::default();
        pin(&conn, "idx_docs", &first).unwrap();

        let mut second = IndexSettings::default();
        second.k1 = 2.0;
        let effective = pin(&conn, "idx_docs", &second).unwrap();

        assert_eq!(effective.k1, 1.5);
    }

    #[test]
    fn custom_stopwords_round_trip() {
        let conn = conn();
        let mut settings = IndexSettings::default();
        settings.stopwords =
            StopwordsSetting::Custom(["le".to_string(), "la".to_string()].into_iter().collect());
        pin(&conn, "idx_docs", &settings).unwrap();

        let loaded = load(&conn, "idx_docs").unwrap().unwrap();
        match loaded.stopwords {
            StopwordsSetting::Custom(words) => {
                assert_eq!(words.len(), 2);
                assert!(words.contains("le"));
            }
            other => panic!("expected Custom stopwords, got {other:?}"),
        }
    }

    #[test]
    fn no_settings_yet_returns_none() {
        let conn = conn();
        assert!(load(&conn, "idx_docs").unwrap().is_none());
    }
}
