//! Post-processing: deterministic cleanup of raw engine output.
//!
//! ## Why is post-processing necessary?
//!
//! Tesseract's plain-text renderer is faithful but noisy:
//!
//! - every page ends in a form feed (`\x0c`) page terminator
//! - lines carry trailing spaces from the layout analysis
//! - Windows builds emit `\r\n`
//! - column gaps and figure regions turn into long runs of blank lines
//! - zero-width characters leak through from some traineddata sets
//!
//! None of this is content. Stripping it here keeps page texts comparable
//! across platforms and keeps the aggregator's "is this page empty?" check
//! honest: a page that only produced `"\n\x0c"` is empty.
//!
//! ## Rule Order
//!
//! Line endings are normalised first so that the per-line rules see `\n`
//! only; the blank-line collapse runs after trailing whitespace is gone so
//! whitespace-only lines count as blank.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to one page of raw engine output.
///
/// Rules (applied in order):
/// 1. Normalise line endings (CRLF / CR → LF)
/// 2. Remove form-feed page terminators
/// 3. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens, etc.)
/// 4. Trim trailing whitespace per line
/// 5. Collapse 3+ consecutive blank lines down to 2
/// 6. Trim leading and trailing blank space of the page
pub fn clean_page_text(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = remove_form_feeds(&s);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    s.trim().to_string()
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Remove form feeds ────────────────────────────────────────────────

fn remove_form_feeds(input: &str) -> String {
    input.replace('\x0c', "\n")
}

// ── Rule 3: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 4: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").to_string()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalise_line_endings() {
        assert_eq!(normalise_line_endings("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn test_form_feed_removed() {
        assert_eq!(clean_page_text("Hello\n\x0c"), "Hello");
        assert_eq!(clean_page_text("\n\x0c"), "");
    }

    #[test]
    fn test_trim_trailing_whitespace() {
        assert_eq!(
            trim_trailing_whitespace("  hello   \nworld  "),
            "  hello\nworld"
        );
    }

    #[test]
    fn test_collapse_blank_lines() {
        let input = "a\n\n\n\n\n\nb";
        assert_eq!(collapse_blank_lines(input), "a\n\n\nb");
    }

    #[test]
    fn test_whitespace_only_lines_collapse() {
        let input = "a\n   \n\t\n  \n \nb";
        assert_eq!(clean_page_text(input), "a\n\n\nb");
    }

    #[test]
    fn test_remove_invisible() {
        let input = "hello\u{200B}world\u{FEFF}foo\u{00AD}bar";
        assert_eq!(remove_invisible_chars(input), "helloworldfoobar");
    }

    #[test]
    fn test_leading_indent_of_first_line_trimmed() {
        assert_eq!(clean_page_text("\n\n   Invoice\r\n  No. 42  \r\n"), "Invoice\n  No. 42");
    }

    #[test]
    fn test_clean_page_text_full_pipeline() {
        let input = "\u{FEFF}Title   \r\n\r\n\r\n\r\n\r\nBody line\r\n\x0c";
        assert_eq!(clean_page_text(input), "Title\n\n\nBody line");
    }
}
