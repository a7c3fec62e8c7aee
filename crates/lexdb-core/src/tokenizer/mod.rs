//! Tokenization and normalization pipeline (`spec.md` §4.1).
//!
//! The pipeline runs the same stages at index time and at query time so
//! recall never drifts between the two: ASCII folding, lowercasing,
//! ignore-regex deletion, whitespace splitting, stopword filtering, and
//! stemming. Settings are pinned once per index (see [`crate::settings`])
//! precisely so this pipeline never needs to change shape after the first
//! write.

mod stem;

use std::collections::HashSet;

use regex::Regex;

use crate::error::{Error, Result};
use crate::settings::IndexSettings;

pub use stem::Stemmer;

/// Turns a text field into an ordered sequence of normalized terms.
///
/// Order is preserved and duplicates are kept (term frequency is computed
/// downstream by counting repeated terms in the returned vector).
pub struct Tokenizer {
    ignore: Regex,
    lower: bool,
    strip_accents: bool,
    stopwords: Option<HashSet<String>>,
    stemmer: Stemmer,
}

impl Tokenizer {
    /// Builds a tokenizer from a pinned index's settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `settings.ignore` is not a valid
    /// regular expression.
    pub fn from_settings(settings: &IndexSettings) -> Result<Self> {
        let ignore = Regex::new(&settings.ignore)
            .map_err(|e| Error::InvalidInput(format!("invalid ignore regex: {e}")))?;

        Ok(Self {
            ignore,
            lower: settings.lower,
            strip_accents: settings.strip_accents,
            stopwords: settings.stopwords.resolve(),
            stemmer: Stemmer::new(settings.stemmer),
        })
    }

    /// Runs the full pipeline over a single text field.
    ///
    /// Empty tokens are discarded at every stage, not just after
    /// whitespace-splitting: a token that stems to the empty string (possible
    /// with aggressive stemmers on very short tokens) is also dropped.
    #[must_use]
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let folded = if self.strip_accents {
            strip_accents(text)
        } else {
            text.to_string()
        };

        let cased = if self.lower {
            folded.to_lowercase()
        } else {
            folded
        };

        let cleaned = self.ignore.replace_all(&cased, " ").into_owned();

        cleaned
            .split_whitespace()
            .filter(|tok| !tok.is_empty())
            .filter(|tok| {
                self.stopwords
                    .as_ref()
                    .is_none_or(|stop| !stop.contains(*tok))
            })
            .filter_map(|tok| {
                let stemmed = self.stemmer.stem(tok);
                if stemmed.is_empty() {
                    None
                } else {
                    Some(stemmed)
                }
            })
            .collect()
    }

    /// Document length after normalization: the number of tokens produced by
    /// [`Self::tokenize`]. A document with empty indexed text has length 0
    /// (`spec.md` §8 boundary behaviors).
    #[must_use]
    pub fn doc_length(&self, text: &str) -> usize {
        self.tokenize(text).len()
    }
}

/// ASCII-folds `text` by Unicode-decomposing and dropping combining marks,
/// e.g. `"café"` → `"cafe"`.
fn strip_accents(text: &str) -> String {
    deunicode::deunicode(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{IndexSettings, StopwordsSetting};

    fn settings(stemmer: crate::settings::StemmerName) -> IndexSettings {
        IndexSettings {
            stemmer,
            ..IndexSettings::default()
        }
    }

    #[test]
    fn splits_on_ignore_class_and_lowercases() {
        let tok = Tokenizer::from_settings(&settings(crate::settings::StemmerName::None)).unwrap();
        assert_eq!(tok.tokenize("Hello, World!"), vec!["hello", "world"]);
    }

    #[test]
    fn empty_text_yields_empty_tokens() {
        let tok = Tokenizer::from_settings(&settings(crate::settings::StemmerName::None)).unwrap();
        assert!(tok.tokenize("").is_empty());
        assert_eq!(tok.doc_length(""), 0);
    }

    #[test]
    fn stopwords_are_removed() {
        let mut s = settings(crate::settings::StemmerName::None);
        s.stopwords = StopwordsSetting::Custom(["the".to_string()].into_iter().collect());
        let tok = Tokenizer::from_settings(&s).unwrap();
        assert_eq!(
            tok.tokenize("the quick brown fox"),
            tok.tokenize("quick brown fox")
        );
    }

    #[test]
    fn tokenization_is_order_preserving_and_duplicate_keeping() {
        let tok = Tokenizer::from_settings(&settings(crate::settings::StemmerName::None)).unwrap();
        assert_eq!(
            tok.tokenize("world hello world"),
            vec!["world", "hello", "world"]
        );
    }

    #[test]
    fn accent_stripping_is_optional() {
        let mut s = settings(crate::settings::StemmerName::None);
        s.strip_accents = true;
        let tok = Tokenizer::from_settings(&s).unwrap();
        assert_eq!(tok.tokenize("café"), vec!["cafe"]);
    }

    #[test]
    fn stemming_reduces_english_plurals() {
        let tok =
            Tokenizer::from_settings(&settings(crate::settings::StemmerName::English)).unwrap();
        assert_eq!(tok.tokenize("running runners"), vec!["run", "runner"]);
    }
}
