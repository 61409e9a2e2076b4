//! Common utilities and helper functions

pub mod retry;

use regex::Regex;
use std::sync::OnceLock;

/// Split scraped chapter markup on paragraph-break tags into clean text
///
/// Sites render paragraphs as text runs separated by `<br>` variants.
/// Fragments are entity-decoded and trimmed; empty ones (consecutive
/// breaks, indentation-only runs) are dropped. Order is preserved.
pub fn split_paragraphs(html: &str) -> String {
    static BR_RE: OnceLock<Regex> = OnceLock::new();

    let re = BR_RE.get_or_init(|| Regex::new(r"<br\s*/?>").expect("Invalid regex pattern"));

    re.split(html)
        .map(|fragment| {
            html_escape::decode_html_entities(fragment)
                .trim()
                .to_string()
        })
        .filter(|fragment| !fragment.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Word count of chapter content
///
/// Character count, not byte count: the stored text is mostly CJK and a
/// byte count would triple it.
pub fn word_count(content: &str) -> i64 {
    content.chars().count() as i64
}
