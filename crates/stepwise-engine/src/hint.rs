//! Hint text helpers shared by the cascade, the alias store and the planner.

use regex::Regex;
use std::sync::LazyLock;

/// Words that describe a toggle's widget kind rather than its accessible name.
static TOGGLE_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(checkbox|radio|button|option|select|multiselect)\b").unwrap()
});

static QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"'([^']+)'|"([^"]+)""#).unwrap());

/// Minimum token length for the tokenized fallback.
pub const MIN_TOKEN_LEN: usize = 3;

/// Alias-store key: trimmed, lowercased, inner whitespace collapsed.
pub fn normalize(hint: &str) -> String {
    hint.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Lowercase alphanumeric word tokens of at least [`MIN_TOKEN_LEN`] chars, deduplicated in order.
pub fn tokens(hint: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for token in hint
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= MIN_TOKEN_LEN)
    {
        if !out.iter().any(|t| t == token) {
            out.push(token.to_string());
        }
    }
    out
}

/// Strip widget-kind words ("Terms checkbox" -> "Terms"). Falls back to the
/// trimmed original when nothing else remains.
pub fn strip_toggle_words(hint: &str) -> String {
    let stripped = TOGGLE_WORDS.replace_all(hint, " ");
    let stripped = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    if stripped.is_empty() {
        hint.trim().to_string()
    } else {
        stripped
    }
}

/// First single- or double-quoted span in `text`.
pub fn first_quoted(text: &str) -> Option<String> {
    QUOTED.captures(text).and_then(|caps| {
        caps.get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str().to_string())
    })
}
