//! Small text utilities shared by normalization, contradiction detection,
//! emotion clustering and hardening.
//!
//! Lexicon terms are matched on a padded, lower-cased form of the text so that
//! multi-word terms respect word boundaries.

use std::collections::BTreeSet;

use crate::lexicon::Lexicon;

/// Lower-case `text`, map everything except alphanumerics and apostrophes to
/// spaces, collapse runs of whitespace, and pad with one space on each side.
pub fn padded_lower(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push(' ');
    let mut last_space = true;
    for c in text.chars() {
        let c = match c {
            '\u{2019}' | '\u{2018}' => '\'',
            other => other,
        };
        if c.is_alphanumeric() || c == '\'' {
            for lc in c.to_lowercase() {
                out.push(lc);
            }
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    if !last_space {
        out.push(' ');
    }
    out
}

/// Whether `padded` (from [`padded_lower`]) contains `term` on word boundaries.
pub fn has_term(padded: &str, term: &str) -> bool {
    padded.contains(&format!(" {term} "))
}

/// Number of occurrences of `term` in `padded`, on word boundaries.
pub fn count_term(padded: &str, term: &str) -> usize {
    let needle: Vec<&str> = term.split_whitespace().collect();
    if needle.is_empty() {
        return 0;
    }
    let words: Vec<&str> = padded.split_whitespace().collect();
    words.windows(needle.len()).filter(|w| *w == needle.as_slice()).count()
}

/// Number of distinct `terms` present in `padded`.
pub fn count_hits(padded: &str, terms: &[&str]) -> usize {
    terms.iter().filter(|t| has_term(padded, t)).count()
}

/// Stopword-filtered tokens of at least three characters.
pub fn tokens(text: &str, lexicon: &Lexicon) -> BTreeSet<String> {
    padded_lower(text)
        .split_whitespace()
        .map(|w| w.trim_matches('\''))
        .filter(|w| w.chars().count() >= 3 && !lexicon.stopwords.contains(w))
        .map(String::from)
        .collect()
}

/// Size of the intersection of two token sets.
pub fn overlap(a: &BTreeSet<String>, b: &BTreeSet<String>) -> usize {
    a.intersection(b).count()
}

/// Intersection over union of two token sets (0.0 when both are empty).
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        overlap(a, b) as f64 / union as f64
    }
}

/// Collapse all whitespace runs into single spaces and trim.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate to at most `max` characters, never splitting a code point.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].trim_end().to_string(),
        None => text.to_string(),
    }
}

/// Number of whitespace-separated words.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Heuristic for structured payloads or markup that leaked into free text.
pub fn looks_like_leakage(text: &str) -> bool {
    const MARKERS: [&str; 8] = ["{\"", "\":", "\": ", "</", "<div", "```", "null,", "\\n"];
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return true;
    }
    if (trimmed.starts_with('{') && trimmed.ends_with('}'))
        || (trimmed.starts_with('[') && trimmed.ends_with(']') && trimmed.contains('"'))
    {
        return true;
    }
    MARKERS.iter().any(|m| trimmed.contains(m))
}

/// Whether the text reads like a direct quote: quotation marks or
/// first-person pronouns.
pub fn is_quote_like(text: &str) -> bool {
    if text.contains('"') || text.contains('\u{201c}') || text.contains('\u{201d}') {
        return true;
    }
    let padded = padded_lower(text);
    ["i", "i'm", "i've", "me", "my", "we", "our", "us"]
        .iter()
        .any(|p| has_term(&padded, p))
}

/// Net sentiment: positive term hits minus negative term hits.
pub fn polarity(text: &str, lexicon: &Lexicon) -> i32 {
    let padded = padded_lower(text);
    let pos: usize = lexicon.positive.iter().map(|t| count_term(&padded, t)).sum();
    let neg: usize = lexicon.negative.iter().map(|t| count_term(&padded, t)).sum();
    pos as i32 - neg as i32
}

/// First hex characters of the SHA-256 digest of `data`.
pub fn short_hash(data: &str, len: usize) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    let hex = format!("{:x}", hasher.finalize());
    hex[..len.min(hex.len())].to_string()
}
