//! Small text helpers shared by the extractor, the name heuristics and the differ.

/// Collapses every run of whitespace into a single space and trims the ends
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Splits text into trimmed, non-empty line units
///
/// These are the paragraph units the text differ aligns against each other.
pub fn split_into_paragraphs(text: &str) -> Vec<&str> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect()
}

/// Returns at most `max_chars` characters of `text`, never splitting a code point
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// True when the text has at least one cased character and all of them are uppercase
pub fn is_upper(text: &str) -> bool {
    let mut cased = false;
    for c in text.chars() {
        if c.is_lowercase() {
            return false;
        }
        if c.is_uppercase() {
            cased = true;
        }
    }
    cased
}

/// True when every word starts with an uppercase letter followed only by lowercase ones
///
/// A "word" is a run of cased characters, so `"Acme-Bio Labs"` is title case
/// while `"ACME Labs"` and `"Acme labs"` are not.
pub fn is_title(text: &str) -> bool {
    let mut cased = false;
    let mut previous_cased = false;
    for c in text.chars() {
        if c.is_uppercase() {
            if previous_cased {
                return false;
            }
            previous_cased = true;
            cased = true;
        } else if c.is_lowercase() {
            if !previous_cased {
                return false;
            }
            previous_cased = true;
            cased = true;
        } else {
            previous_cased = false;
        }
    }
    cased
}

/// File name of a URL or path without directories, query, fragment or extension
///
/// `"/img/portfolio/Acme.png?v=2"` gives `Some("Acme")`. Dot-files keep their name.
pub fn file_stem(src: &str) -> Option<&str> {
    let without_query = src.split(['?', '#']).next().unwrap_or_default();
    let file_name = without_query.rsplit('/').next().unwrap_or_default();
    let stem = match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file_name,
    };
    if stem.is_empty() { None } else { Some(stem) }
}
