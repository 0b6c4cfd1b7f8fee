//! Stop-word language guessing used to pick a voice per sentence.

use serde::{Deserialize, Serialize};
use std::fmt;

const FRENCH_WORDS: &[&str] = &[
    "le", "la", "les", "de", "des", "un", "une", "et", "est", "dans", "pour", "que", "qui", "par",
    "avec",
];

const ENGLISH_WORDS: &[&str] = &[
    "the", "and", "of", "to", "in", "is", "that", "for", "it", "with", "as", "was", "on", "are",
];

/// Languages the guesser can tell apart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    French,
    English,
}

impl Language {
    /// ISO 639-1 code, as understood by both speech engines.
    pub fn code(self) -> &'static str {
        match self {
            Self::French => "fr",
            Self::English => "en",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        let primary = code.split(['-', '_']).next().unwrap_or_default();
        match primary.to_ascii_lowercase().as_str() {
            "fr" => Some(Self::French),
            "en" => Some(Self::English),
            _ => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

fn count_matches(padded: &str, words: &[&str]) -> usize {
    words
        .iter()
        .filter(|word| padded.contains(&format!(" {} ", word)))
        .count()
}

/// Guess the language of one sentence.
///
/// Each stop word counts once when it appears as a space-delimited word. The
/// language with strictly more hits wins; ties fall back to French.
pub fn guess(sentence: &str) -> Language {
    let padded = format!(" {} ", sentence.to_lowercase());
    let french = count_matches(&padded, FRENCH_WORDS);
    let english = count_matches(&padded, ENGLISH_WORDS);

    if english > french {
        Language::English
    } else {
        Language::French
    }
}

/// Language hint for a whole document, shown before reading starts.
pub fn guess_document(text: &str) -> Language {
    guess(&text.split_whitespace().collect::<Vec<_>>().join(" "))
}
