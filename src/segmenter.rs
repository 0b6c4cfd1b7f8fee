//! Sentence segmentation for read-aloud playback.
//!
//! Text is cut after every run of `.`, `!` or `?`. Each sentence keeps its
//! terminator run so the backends can still hear the intonation cue.

use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;

lazy_static! {
    static ref TERMINATOR_RUN: Regex = Regex::new(r"[.!?]+").expect("valid terminator regex");
}

/// One punctuation-delimited unit of text, trimmed, terminator included.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Sentence(String);

impl Sentence {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The trailing punctuation character, if the sentence has one.
    pub fn terminator(&self) -> Option<char> {
        self.0.chars().last().filter(|c| matches!(c, '.' | '!' | '?'))
    }
}

impl fmt::Display for Sentence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Sentence {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Split `text` into sentences in source order.
///
/// Spans that are empty once trimmed are dropped along with their
/// terminator run. A trailing span without any terminator is kept as the last
/// sentence, so text with no punctuation at all comes back as one sentence.
pub fn split(text: &str) -> Vec<Sentence> {
    let mut sentences = Vec::new();
    let mut cursor = 0;

    for run in TERMINATOR_RUN.find_iter(text) {
        let body = text[cursor..run.start()].trim();
        if !body.is_empty() {
            sentences.push(Sentence(format!("{}{}", body, run.as_str())));
        }
        cursor = run.end();
    }

    let tail = text[cursor..].trim();
    if !tail.is_empty() {
        sentences.push(Sentence(tail.to_string()));
    }

    sentences
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn texts(sentences: &[Sentence]) -> Vec<&str> {
        sentences.iter().map(Sentence::as_str).collect()
    }

    #[test]
    fn keeps_terminator_runs() {
        let sentences = split("Bonjour. Comment allez-vous ?! Très bien...");
        assert_eq!(
            texts(&sentences),
            vec!["Bonjour.", "Comment allez-vous?!", "Très bien..."]
        );
    }

    #[test]
    fn drops_empty_spans() {
        let sentences = split("... Hello.  . ! World?");
        assert_eq!(texts(&sentences), vec!["Hello.", "World?"]);
    }

    #[test]
    fn unterminated_tail_is_kept() {
        assert_eq!(
            texts(&split("First one. and a trailing clause")),
            vec!["First one.", "and a trailing clause"]
        );
        assert_eq!(texts(&split("  no punctuation here ")), vec!["no punctuation here"]);
    }

    #[test]
    fn blank_text_yields_nothing() {
        assert!(split("").is_empty());
        assert!(split("   \n\t ").is_empty());
        assert!(split("?!.").is_empty());
    }

    #[test]
    fn terminator_is_last_punctuation() {
        assert_eq!(Sentence::new("Vraiment ?").terminator(), Some('?'));
        assert_eq!(Sentence::new("Stop!").terminator(), Some('!'));
        assert_eq!(Sentence::new("no end").terminator(), None);
    }

    fn content(text: &str) -> String {
        text.chars()
            .filter(|c| !c.is_whitespace() && !matches!(c, '.' | '!' | '?'))
            .collect()
    }

    proptest! {
        #[test]
        fn preserves_words_in_order(text in "[a-zA-Zé ,;\n.!?]{0,80}") {
            let sentences = split(&text);
            let joined: String = sentences.iter().map(Sentence::as_str).collect();
            prop_assert_eq!(content(&joined), content(&text));
        }

        #[test]
        fn sentences_are_trimmed_and_non_empty(text in "[a-z .!?\t]{0,80}") {
            for sentence in split(&text) {
                let s = sentence.as_str();
                prop_assert!(!s.is_empty());
                prop_assert_eq!(s.trim(), s);
                prop_assert!(!content(s).is_empty());
            }
        }
    }
}
