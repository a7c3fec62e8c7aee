//! Stemming stage of the tokenizer pipeline, backed by `rust_stemmers`.
//!
//! `rust_stemmers` wraps the Snowball reference stemmers for the major
//! European and a handful of other languages. The settings surface in
//! `spec.md` §6 names a broader set (matching the Python `snowballstemmer`
//! package the original implementation depended on); names outside what
//! `rust_stemmers` ships fall back to no stemming with a one-time warning
//! rather than guessing at a nonexistent crate variant.

use tracing::warn;

use rust_stemmers::Algorithm;

use crate::settings::StemmerName;

/// Runs Snowball-family stemming, or passes tokens through unchanged.
pub struct Stemmer(Option<rust_stemmers::Stemmer>);

impl Stemmer {
    /// Builds a stemmer for the named algorithm. `StemmerName::None` skips
    /// the stage entirely, as does any name `rust_stemmers` does not
    /// implement.
    #[must_use]
    pub fn new(name: StemmerName) -> Self {
        match name.algorithm() {
            Some(algo) => Self(Some(rust_stemmers::Stemmer::create(algo))),
            None => {
                if !matches!(name, StemmerName::None) {
                    warn!(stemmer = ?name, "no Snowball stemmer available for this language; indexing without stemming");
                }
                Self(None)
            }
        }
    }

    /// Stems a single already-lowercased, already-filtered token.
    #[must_use]
    pub fn stem(&self, token: &str) -> String {
        match &self.0 {
            Some(stemmer) => stemmer.stem(token).into_owned(),
            None => token.to_string(),
        }
    }
}

impl StemmerName {
    /// Maps a settings-level stemmer name onto a `rust_stemmers::Algorithm`,
    /// where one exists. `Porter` is treated as an alias for the Snowball
    /// English stemmer (the "Porter" name in the settings enum refers to the
    /// classic English algorithm family, not a separate implementation).
    #[must_use]
    pub fn algorithm(self) -> Option<Algorithm> {
        use StemmerName::{
            Arabic, Danish, Dutch, English, Finnish, French, German, Greek, Hungarian, Italian,
            Norwegian, Porter, Portuguese, Romanian, Russian, Spanish, Swedish, Tamil, Turkish,
        };

        match self {
            Porter | English => Some(Algorithm::English),
            Arabic => Some(Algorithm::Arabic),
            Danish => Some(Algorithm::Danish),
            Dutch => Some(Algorithm::Dutch),
            Finnish => Some(Algorithm::Finnish),
            French => Some(Algorithm::French),
            German => Some(Algorithm::German),
            Greek => Some(Algorithm::Greek),
            Hungarian => Some(Algorithm::Hungarian),
            Italian => Some(Algorithm::Italian),
            Norwegian => Some(Algorithm::Norwegian),
            Portuguese => Some(Algorithm::Portuguese),
            Romanian => Some(Algorithm::Romanian),
            Russian => Some(Algorithm::Russian),
            Spanish => Some(Algorithm::Spanish),
            Swedish => Some(Algorithm::Swedish),
            Tamil => Some(Algorithm::Tamil),
            Turkish => Some(Algorithm::Turkish),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_passes_through() {
        let stemmer = Stemmer::new(StemmerName::None);
        assert_eq!(stemmer.stem("running"), "running");
    }

    #[test]
    fn english_stems_plurals() {
        let stemmer = Stemmer::new(StemmerName::English);
        assert_eq!(stemmer.stem("runners"), "runner");
    }

    #[test]
    fn porter_aliases_english() {
        let stemmer = Stemmer::new(StemmerName::Porter);
        assert_eq!(stemmer.stem("runners"), "runner");
    }

    #[test]
    fn unsupported_language_falls_back_to_passthrough() {
        let stemmer = Stemmer::new(StemmerName::Basque);
        assert_eq!(stemmer.stem("running"), "running");
    }
}
