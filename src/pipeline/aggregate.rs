//! Page Aggregator: ordered page texts → one document string.

use crate::output::PageText;

/// Substituted once, at document level, when no page produced text.
pub const PLACEHOLDER: &str = "[No text detected]";

/// Join page texts in index order.
///
/// With `delimit` set (PDF input, any page count) every page gets a
/// `--- Page N ---` line; otherwise the pages are joined bare. The result
/// is never empty.
///
/// `pages` must already be sorted by index; completion order never reaches
/// this function.
pub fn aggregate(pages: &[PageText], delimit: bool) -> String {
    if pages.iter().all(|p| p.text.trim().is_empty()) {
        return PLACEHOLDER.to_string();
    }

    let joined = if !delimit {
        pages
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    } else {
        pages
            .iter()
            .map(|p| format!("--- Page {} ---\n{}", p.index, p.text))
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    let trimmed = joined.trim();
    if trimmed.is_empty() {
        PLACEHOLDER.to_string()
    } else {
        trimmed.to_string()
    }
}
