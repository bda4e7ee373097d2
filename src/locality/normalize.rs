//! Canonical text forms for locality and person-name columns.
//!
//! City and state values become the join/merge identity of the locality
//! dimension, so their normalization must be idempotent:
//! `normalize_city(&normalize_city(x)) == normalize_city(x)`.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization as _;
use unicode_normalization::char::is_combining_mark;

/// Honorifics removed from person names, long forms before their prefixes.
static HONORIFICS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:srta|sra|sr|senhora|senhor|dra|dr|professora|professor|prof|engenheira|engenheiro|eng|reverenda|reverendo|rev|mrs|mr|miss|ms)\b\.?",
    )
    .expect("honorific pattern is valid")
});

static EDGE_PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\W_]+|[\W_]+$").expect("edge punctuation pattern is valid"));

static INNER_PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.,;:!]+").expect("inner punctuation pattern is valid"));

/// Canonical city name: uppercase, no diacritics, single spaces.
///
/// ```
/// use light_etl::locality::normalize_city;
///
/// assert_eq!(normalize_city("  São   paulo "), "SAO PAULO");
/// ```
pub fn normalize_city(raw: &str) -> String {
    canonical_text(raw)
}

/// Canonical state name or code, same rules as [`normalize_city`].
pub fn normalize_state(raw: &str) -> String {
    canonical_text(raw)
}

/// Cleans a person's name for display.
///
/// Honorifics are removed, punctuation is dropped, diacritics are stripped
/// and repeated words (case-insensitive) keep only their first occurrence,
/// with its original casing. Missing input yields an empty string.
///
/// ```
/// use light_etl::locality::normalize_person_name;
///
/// assert_eq!(normalize_person_name(Some("Dr. João João Silva")), "Joao Silva");
/// assert_eq!(normalize_person_name(None), "");
/// ```
pub fn normalize_person_name(raw: Option<&str>) -> String {
    let Some(raw) = raw else {
        return String::new();
    };

    let text = HONORIFICS.replace_all(raw.trim(), "");
    let text = EDGE_PUNCTUATION.replace_all(&text, "");
    let text = INNER_PUNCTUATION.replace_all(&text, "");
    let text: String = text.nfkd().filter(|c| !is_combining_mark(*c)).collect();

    let mut seen = HashSet::new();
    let mut words = Vec::new();
    for word in text.split_whitespace() {
        if seen.insert(word.to_lowercase()) {
            words.push(word);
        }
    }
    words.join(" ")
}

/// Strips combining marks after canonical decomposition.
pub fn strip_diacritics(text: &str) -> String {
    text.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

fn canonical_text(raw: &str) -> String {
    // Uppercasing can itself produce decomposable characters, so it runs first.
    let stripped = strip_diacritics(&raw.to_uppercase());
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}
