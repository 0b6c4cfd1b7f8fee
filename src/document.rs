//! PDF text extraction and clean-up for reading aloud.

use std::path::Path;

use lazy_static::lazy_static;
use lopdf::Document;
use regex::Regex;

use crate::error::{ReaderError, Result};

lazy_static! {
    static ref EXCESS_NEWLINES: Regex = Regex::new(r"\n{3,}").expect("valid newline regex");
    static ref HYPHENATED_BREAK: Regex =
        Regex::new(r"(\w+)-\n(\w+)").expect("valid hyphenation regex");
    static ref REPEATED_SPACES: Regex = Regex::new(r" {2,}").expect("valid space regex");
}

fn load(path: &Path) -> Result<Document> {
    Document::load(path).map_err(|e| ReaderError::extraction(path, e))
}

/// Number of pages in the PDF at `path`.
pub fn page_count(path: &Path) -> Result<usize> {
    Ok(load(path)?.get_pages().len())
}

/// Clamp a requested 1-based page range to `[1, total]`.
///
/// Missing bounds default to the first and last page. The end page is never
/// before the start page. `total` must be at least 1.
pub fn resolve_page_range(start: Option<u32>, end: Option<u32>, total: u32) -> (u32, u32) {
    let start = start.unwrap_or(1).clamp(1, total);
    let end = end.unwrap_or(total).clamp(start, total);
    (start, end)
}

/// Extract and clean the text of pages `start..=end` (1-based).
///
/// Pages are joined with a blank line. A page whose text cannot be decoded is
/// skipped with a warning rather than failing the whole document.
pub fn extract(path: &Path, start: Option<u32>, end: Option<u32>) -> Result<String> {
    let document = load(path)?;
    let pages = document.get_pages();
    let total = u32::try_from(pages.len())
        .map_err(|_| ReaderError::extraction(path, "too many pages"))?;
    if total == 0 {
        return Ok(String::new());
    }

    let (start, end) = resolve_page_range(start, end, total);
    tracing::debug!(start, end, total, "Extracting pages");

    let mut text = String::new();
    for page in start..=end {
        match document.extract_text(&[page]) {
            Ok(raw) => {
                let cleaned = clean_text(&raw);
                if !cleaned.trim().is_empty() {
                    text.push_str(&cleaned);
                    text.push_str("\n\n");
                }
            }
            Err(e) => tracing::warn!(page, error = %e, "Skipping unreadable page"),
        }
    }

    Ok(text.trim().to_string())
}

/// Undo the line wrapping of extracted PDF text.
///
/// A line break is kept when the line ends a sentence (`.`, `!`, `?`, `:`) or
/// the next line starts with an uppercase letter; otherwise the two lines are
/// joined with a space. Words hyphenated across a break are glued back
/// together, blank lines stay paragraph breaks, and runs of spaces collapse.
pub fn clean_text(raw: &str) -> String {
    let text = raw.replace("\r\n", "\n");
    let text = EXCESS_NEWLINES.replace_all(&text, "\n\n");
    let text = HYPHENATED_BREAK.replace_all(&text, "$1$2");

    let lines: Vec<&str> = text.split('\n').map(str::trim).collect();
    let mut out = String::with_capacity(text.len());

    for (i, line) in lines.iter().enumerate() {
        out.push_str(line);
        let Some(next) = lines.get(i + 1) else {
            break;
        };

        if line.is_empty() || next.is_empty() {
            out.push('\n');
            continue;
        }

        let ends_sentence = line.ends_with(['.', '!', '?', ':']);
        let next_is_upper = next.chars().next().is_some_and(char::is_uppercase);
        if ends_sentence || next_is_upper {
            out.push('\n');
        } else {
            out.push(' ');
        }
    }

    let out = EXCESS_NEWLINES.replace_all(&out, "\n\n");
    REPEATED_SPACES.replace_all(&out, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn joins_soft_wrapped_lines() {
        let raw = "the quick brown\nfox jumps over\nthe lazy dog.";
        assert_eq!(clean_text(raw), "the quick brown fox jumps over the lazy dog.");
    }

    #[test]
    fn keeps_breaks_after_sentences_and_before_capitals() {
        let raw = "First sentence.\nsecond line\nThird starts here";
        assert_eq!(clean_text(raw), "First sentence.\nsecond line\nThird starts here");
    }

    #[test]
    fn merges_hyphenated_words() {
        assert_eq!(clean_text("extra-\nordinary things"), "extraordinary things");
    }

    #[test]
    fn collapses_blank_lines_and_spaces() {
        let raw = "Para one.\n\n\n\n\nPara   two.";
        assert_eq!(clean_text(raw), "Para one.\n\nPara two.");
    }

    #[test]
    fn page_range_is_clamped() {
        assert_eq!(resolve_page_range(None, None, 10), (1, 10));
        assert_eq!(resolve_page_range(Some(0), Some(99), 10), (1, 10));
        assert_eq!(resolve_page_range(Some(7), Some(3), 10), (7, 7));
        assert_eq!(resolve_page_range(Some(12), None, 10), (10, 10));
        assert_eq!(resolve_page_range(Some(2), Some(4), 10), (2, 4));
    }

    #[test]
    fn missing_file_is_an_extraction_error() {
        let err = page_count(Path::new("/nonexistent/book.pdf")).unwrap_err();
        assert!(matches!(err, ReaderError::Extraction { .. }));
    }

    #[test]
    fn corrupt_file_is_an_extraction_error() {
        let mut file = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        file.write_all(b"this is not a pdf at all").unwrap();

        let err = extract(file.path(), None, None).unwrap_err();
        assert!(matches!(err, ReaderError::Extraction { .. }));
    }
}
