//! Text normalization shared by queries, entity names, and rule tokens.
//!
//! NFKD-decompose, drop combining marks, lowercase, delete apostrophes,
//! turn every other non-alphanumeric character into a space, and collapse
//! whitespace. Entity `normalized_name` values in a pack are produced by
//! the same function, so exact comparison is meaningful.

use rulebook_config::RouterConfig;
use std::collections::BTreeSet;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

fn is_apostrophe(c: char) -> bool {
    matches!(c, '\'' | '\u{2018}' | '\u{2019}' | '\u{02bc}')
}

/// Normalize free text for matching.
pub fn normalize(text: &str) -> String {
    let mut folded = String::with_capacity(text.len());
    for c in text.nfkd() {
        if is_combining_mark(c) || is_apostrophe(c) {
            continue;
        }
        if c.is_alphanumeric() {
            folded.extend(c.to_lowercase());
        } else {
            folded.push(' ');
        }
    }
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split normalized text into tokens.
pub fn tokenize(normalized: &str) -> Vec<String> {
    normalized.split_whitespace().map(str::to_string).collect()
}

/// Tokens long enough to matter and not in the stopword list.
pub fn keyword_set<'a, I>(tokens: I, router: &RouterConfig) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a String>,
{
    let min_len = router.resolver.min_token_len;
    tokens
        .into_iter()
        .filter(|t| t.chars().count() >= min_len && !router.is_stopword(t))
        .cloned()
        .collect()
}

/// Keyword tokens of an entity's name and body text.
pub fn entity_tokens(normalized_name: &str, body_text: &str, router: &RouterConfig) -> BTreeSet<String> {
    let text = normalize(&format!("{normalized_name} {body_text}"));
    keyword_set(&tokenize(&text), router)
}

/// Whether `phrase` occurs in `normalized` on token boundaries.
pub fn contains_phrase(normalized: &str, phrase: &str) -> bool {
    let phrase = phrase.trim();
    if phrase.is_empty() {
        return false;
    }
    format!(" {normalized} ").contains(&format!(" {phrase} "))
}
