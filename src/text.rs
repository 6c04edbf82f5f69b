//! Text utilities shared by the scorer, concept matcher and cache key.
//!
//! Tokens are lowercase runs of Unicode letters and digits; `_` and punctuation split tokens.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeSet;

lazy_static! {
    static ref TOKEN_RE: Regex = Regex::new(r"[\p{L}\p{N}]+").expect("static token pattern");
    static ref WHITESPACE_RE: Regex = Regex::new(r"\s+").expect("static whitespace pattern");
}

const STOP_WORDS: &[&str] = &[
    "a", "about", "all", "an", "and", "any", "are", "as", "at", "be", "by", "can", "do", "does",
    "for", "from", "get", "give", "has", "have", "how", "i", "in", "is", "it", "its", "list",
    "me", "my", "of", "on", "or", "our", "show", "so", "some", "that", "the", "their", "them",
    "there", "these", "this", "those", "to", "us", "was", "we", "were", "what", "when", "where",
    "which", "who", "whose", "why", "will", "with", "you", "your",
];

pub fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.binary_search(&token).is_ok()
}

/// All tokens in order, lowercased (stop words kept)
pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    TOKEN_RE
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Distinct content tokens: lowercased, stop words removed
pub fn content_tokens(text: &str) -> BTreeSet<String> {
    tokenize(text)
        .into_iter()
        .filter(|t| !is_stop_word(t))
        .collect()
}

/// Intersection over union of two token sets; 0.0 when either side is empty
pub fn jaccard(left: &BTreeSet<String>, right: &BTreeSet<String>) -> f64 {
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    let intersection = left.intersection(right).count();
    let union = left.union(right).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Jaccard overlap of the content tokens of two texts
pub fn lexical_similarity(left: &str, right: &str) -> f64 {
    jaccard(&content_tokens(left), &content_tokens(right))
}

/// Trim and collapse every internal whitespace run to a single space
pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE_RE.replace_all(text.trim(), " ").into_owned()
}

/// Clamp a score into [0, 1]; NaN becomes 0
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

pub fn singularize(word: &str) -> String {
    if word.len() > 3 && word.ends_with("ies") {
        format!("{}y", &word[..word.len() - 3])
    } else if word.len() > 3
        && (word.ends_with("ses")
            || word.ends_with("xes")
            || word.ends_with("ches")
            || word.ends_with("shes"))
    {
        word[..word.len() - 2].to_string()
    } else if word.len() > 1 && word.ends_with('s') && !word.ends_with("ss") {
        word[..word.len() - 1].to_string()
    } else {
        word.to_string()
    }
}

pub fn pluralize(word: &str) -> String {
    let consonant_y = word.len() > 1
        && word.ends_with('y')
        && !matches!(
            word.as_bytes()[word.len() - 2],
            b'a' | b'e' | b'i' | b'o' | b'u'
        );
    if consonant_y {
        format!("{}ies", &word[..word.len() - 1])
    } else if word.ends_with('s')
        || word.ends_with('x')
        || word.ends_with("ch")
        || word.ends_with("sh")
    {
        format!("{}es", word)
    } else {
        format!("{}s", word)
    }
}

/// The lowercased word plus its singular and plural forms
pub fn number_variants(word: &str) -> BTreeSet<String> {
    let lower = word.to_lowercase();
    let mut variants = BTreeSet::new();
    variants.insert(singularize(&lower));
    variants.insert(pluralize(&singularize(&lower)));
    variants.insert(lower);
    variants
}
