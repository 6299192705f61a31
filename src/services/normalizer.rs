// src/services/normalizer.rs

//! Comparison-text normalization.
//!
//! Only artifacts observed to change on every fetch without carrying a real
//! content update are replaced. Anything broader risks hiding real changes.

use std::sync::LazyLock;

use regex::Regex;

const ID_PLACEHOLDER: &str = "[ID]";
const SESSION_PLACEHOLDER: &str = "[SESSION]";
const GENERATED_PLACEHOLDER: &str = "[GENERATED]";
const PAGE_LOAD_PLACEHOLDER: &str = "[PAGE_LOAD]";

/// Every placeholder token the normalizer may emit.
pub const PLACEHOLDERS: [&str; 4] = [
    ID_PLACEHOLDER,
    SESSION_PLACEHOLDER,
    GENERATED_PLACEHOLDER,
    PAGE_LOAD_PLACEHOLDER,
];

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| compile(r"\s+"));
static LONG_HEX: LazyLock<Regex> = LazyLock::new(|| compile(r"(?i)\b[a-f0-9]{32,}\b"));
static SESSION_ID: LazyLock<Regex> = LazyLock::new(|| compile(r"(?i)\bsessionid=[a-f0-9]{16,}"));
static JSESSION_ID: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)\bjsessionid=[a-f0-9]{16,}"));
static GENERATED_AT: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"(?i)generiert am \d{2}\.\d{2}\.\d{4} um \d{2}:\d{2}:\d{2}")
});
static PAGE_LOAD_AT: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)seitenaufruf um \d{2}:\d{2}:\d{2}"));

fn compile(pattern: &str) -> Regex {
    // Patterns are literals in this file; a failure is a programming error.
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid built-in pattern {pattern}: {e}"))
}

/// Collapse whitespace runs into single spaces and trim.
pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

/// Normalize comparison text. Idempotent.
pub fn normalize(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let text = collapse_whitespace(text);
    let text = LONG_HEX.replace_all(&text, ID_PLACEHOLDER);
    let text = SESSION_ID.replace_all(&text, "sessionid=[SESSION]");
    let text = JSESSION_ID.replace_all(&text, "jsessionid=[SESSION]");
    let text = GENERATED_AT.replace_all(&text, GENERATED_PLACEHOLDER);
    let text = PAGE_LOAD_AT.replace_all(&text, PAGE_LOAD_PLACEHOLDER);

    text.into_owned()
}

/// Remove placeholder tokens from normalized text.
pub fn strip_placeholders(text: &str) -> String {
    let mut stripped = text.to_string();
    for placeholder in PLACEHOLDERS {
        stripped = stripped.replace(placeholder, " ");
    }
    collapse_whitespace(&stripped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapses_whitespace() {
        assert_eq!(normalize("  a \n\t b  "), "a b");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn test_replaces_long_hex() {
        let token = "0123456789abcdef0123456789ABCDEF";
        assert_eq!(normalize(&format!("build {token} ok")), "build [ID] ok");
        // 31 characters stay untouched
        assert_eq!(normalize("x 0123456789abcdef0123456789abcde"), "x 0123456789abcdef0123456789abcde");
    }

    #[test]
    fn test_replaces_session_ids() {
        assert_eq!(
            normalize("link?sessionid=0123456789abcdef&x=1"),
            "link?sessionid=[SESSION]&x=1"
        );
        assert_eq!(
            normalize("page;JSESSIONID=ABCDEF0123456789AB"),
            "page;jsessionid=[SESSION]"
        );
    }

    #[test]
    fn test_replaces_generation_timestamps() {
        assert_eq!(
            normalize("Seite generiert am 01.02.2024 um 10:11:12"),
            "Seite [GENERATED]"
        );
        assert_eq!(normalize("Seitenaufruf um 08:00:59 Uhr"), "[PAGE_LOAD] Uhr");
    }

    #[test]
    fn test_is_idempotent() {
        let samples = [
            "Plan   Stand generiert am 01.02.2024 um 10:11:12 sessionid=0123456789abcdef01",
            "id 0123456789abcdef0123456789abcdef0123 und Seitenaufruf um 12:00:00",
            "plain text without artifacts",
        ];
        for sample in samples {
            let once = normalize(sample);
            assert_eq!(normalize(&once), once);
        }
    }

    #[test]
    fn test_strip_placeholders() {
        assert_eq!(strip_placeholders("Stand [GENERATED] Plan"), "Stand Plan");
        assert_eq!(strip_placeholders("x sessionid=[SESSION]"), "x sessionid=");
        assert_eq!(strip_placeholders("[ID]"), "");
    }
}
