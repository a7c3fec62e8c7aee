//! Per-index settings: tokenization and BM25 parameters pinned once at an
//! index's first write (`spec.md` §3 invariant 4, §6).
//!
//! Unlike [`crate::config`], which covers process-wide knobs such as batch
//! sizes and retry policy, everything here is persisted data: once an index
//! has a `settings` row, later divergent writes are rejected (logged, not
//! raised) rather than applied. See [`crate::index::builder`] for where that
//! enforcement happens.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

mod store;
mod stopwords;

pub use store::{load, pin};

/// Stemming algorithm applied to each token (`spec.md` §6).
///
/// `Porter` names the classic English Porter stemmer specifically, kept
/// distinct from `English` (Snowball's improved English stemmer) for callers
/// porting settings from the original system, where `"porter"` was the
/// default. Both currently resolve to the same Snowball English
/// implementation; see [`crate::tokenizer::stem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StemmerName {
    /// No stemming; tokens pass through unchanged.
    None,
    Porter,
    Arabic,
    Basque,
    Catalan,
    Danish,
    Dutch,
    English,
    Finnish,
    French,
    German,
    Greek,
    Hindi,
    Hungarian,
    Indonesian,
    Irish,
    Italian,
    Lithuanian,
    Nepali,
    Norwegian,
    Portuguese,
    Romanian,
    Russian,
    Serbian,
    Spanish,
    Swedish,
    Tamil,
    Turkish,
}

impl Default for StemmerName {
    /// The original system's default was `"porter"`.
    fn default() -> Self {
        Self::Porter
    }
}

impl StemmerName {
    /// Lowercase name matching `spec.md` §6's `stemmer` enumeration, used as
    /// the on-disk representation in `settings.stemmer`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Porter => "porter",
            Self::Arabic => "arabic",
            Self::Basque => "basque",
            Self::Catalan => "catalan",
            Self::Danish => "danish",
            Self::Dutch => "dutch",
            Self::English => "english",
            Self::Finnish => "finnish",
            Self::French => "french",
            Self::German => "german",
            Self::Greek => "greek",
            Self::Hindi => "hindi",
            Self::Hungarian => "hungarian",
            Self::Indonesian => "indonesian",
            Self::Irish => "irish",
            Self::Italian => "italian",
            Self::Lithuanian => "lithuanian",
            Self::Nepali => "nepali",
            Self::Norwegian => "norwegian",
            Self::Portuguese => "portuguese",
            Self::Romanian => "romanian",
            Self::Russian => "russian",
            Self::Serbian => "serbian",
            Self::Spanish => "spanish",
            Self::Swedish => "swedish",
            Self::Tamil => "tamil",
            Self::Turkish => "turkish",
        }
    }

    /// Parses the on-disk representation produced by [`Self::as_str`].
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "none" => Self::None,
            "porter" => Self::Porter,
            "arabic" => Self::Arabic,
            "basque" => Self::Basque,
            "catalan" => Self::Catalan,
            "danish" => Self::Danish,
            "dutch" => Self::Dutch,
            "english" => Self::English,
            "finnish" => Self::Finnish,
            "french" => Self::French,
            "german" => Self::German,
            "greek" => Self::Greek,
            "hindi" => Self::Hindi,
            "hungarian" => Self::Hungarian,
            "indonesian" => Self::Indonesian,
            "irish" => Self::Irish,
            "italian" => Self::Italian,
            "lithuanian" => Self::Lithuanian,
            "nepali" => Self::Nepali,
            "norwegian" => Self::Norwegian,
            "portuguese" => Self::Portuguese,
            "romanian" => Self::Romanian,
            "russian" => Self::Russian,
            "serbian" => Self::Serbian,
            "spanish" => Self::Spanish,
            "swedish" => Self::Swedish,
            "tamil" => Self::Tamil,
            "turkish" => Self::Turkish,
            _ => return None,
        })
    }
}

/// How stopwords are filtered for an index (`spec.md` §6, Open Question
/// resolution in §8): a caller-supplied non-empty list is persisted verbatim
/// as a custom table; a bare language name selects a built-in list; absence
/// of both disables the stage entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopwordsSetting {
    /// No stopword filtering.
    None,
    /// A built-in list selected by language name (e.g. `"english"`).
    Language(String),
    /// A caller-supplied list, persisted as-is.
    Custom(HashSet<String>),
}

impl Default for StopwordsSetting {
    fn default() -> Self {
        Self::None
    }
}

impl StopwordsSetting {
    /// Resolves this setting to the actual word set used at tokenization
    /// time, or `None` if no filtering applies.
    ///
    /// Only `english` has a built-in list in this implementation; any other
    /// language name resolves to no filtering, with a one-time warning,
    /// rather than silently indexing an empty stopword set as if it were
    /// intentional.
    #[must_use]
    pub fn resolve(&self) -> Option<HashSet<String>> {
        match self {
            Self::None => Option::None,
            Self::Custom(words) if words.is_empty() => Option::None,
            Self::Custom(words) => Some(words.clone()),
            Self::Language(lang) => match lang.to_lowercase().as_str() {
                "english" => Some(stopwords::english()),
                other => {
                    warn!(language = other, "no built-in stopword list for this language; indexing without stopword filtering");
                    Option::None
                }
            },
        }
    }
}

/// Tokenization and scoring settings pinned for the lifetime of an index
/// (`spec.md` §3, §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    /// BM25 term-frequency saturation parameter.
    pub k1: f64,
    /// BM25 length-normalization parameter, in `[0, 1]`.
    pub b: f64,
    /// Stemming algorithm.
    pub stemmer: StemmerName,
    /// Stopword filtering.
    pub stopwords: StopwordsSetting,
    /// Regex matching character spans to delete before whitespace-splitting.
    pub ignore: String,
    /// Whether to ASCII-fold text before lowercasing.
    pub strip_accents: bool,
    /// Whether to lowercase text.
    pub lower: bool,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            k1: 1.5,
            b: 0.75,
            stemmer: StemmerName::default(),
            stopwords: StopwordsSetting::default(),
            ignore: r"(\.|[^a-z])+".to_string(),
            strip_accents: false,
            lower: true,
        }
    }
}

impl IndexSettings {
    /// Compares each field against `existing` and returns the names of
    /// fields that differ. Used by [`crate::index::builder`] to detect
    /// divergent settings on a second `upload` against a pinned index.
    #[must_use]
    pub fn diff(&self, existing: &Self) -> Vec<(&'static str, String, String)> {
        let mut diffs = Vec::new();

        macro_rules! check {
            ($field:ident) => {
                if self.$field != existing.$field {
                    diffs.push((
                        stringify!($field),
                        format!("{:?}", existing.$field),
                        format!("{:?}", self.$field),
                    ));
                }
            };
        }

        check!(k1);
        check!(b);
        check!(stemmer);
        check!(stopwords);
        check!(ignore);
        check!(strip_accents);
        check!(lower);

        diffs
    }
}
