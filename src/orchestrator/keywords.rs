use std::collections::BTreeSet;

use super::Requirement;

/// Keywords no longer than this must match a whole word.
const SHORT_KEYWORD_LEN: usize = 3;

/// Requirement keyword table. A requirement is detected when any of its
/// keywords occurs in the lower-cased query.
pub const REQUIREMENT_KEYWORDS: &[(Requirement, &[&str])] = &[
    (Requirement::Calculation, &["calculate", "compute", "score"]),
    (
        Requirement::DocumentSearch,
        &["document", "mention", "source", "pdf", "paper", "reference"],
    ),
    (
        Requirement::Comparison,
        &["compare", "difference", "versus", "vs"],
    ),
    (
        Requirement::Explanation,
        &["explain", "why", "reason", "rationale"],
    ),
    (
        Requirement::MultiHop,
        &[
            "leads to",
            "causes",
            "results in",
            "relationship between",
            "impact on",
            "effect of",
        ],
    ),
];

/// Keywords asking for external analysis rather than a plain calculation.
pub const ANALYZE_KEYWORDS: &[&str] = &["analyze", "analysis", "assess"];

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "what", "which", "when", "where", "who", "why", "how", "that",
    "this", "these", "those", "from", "into", "about", "does", "have", "should", "would", "could",
    "there", "their", "them", "they", "been", "being", "were", "will", "also", "than", "then",
    "explain", "calculate", "compute", "compare", "mention", "mentions", "documents", "document",
];

/// Maximum number of keywords [`extract_keywords`] returns.
pub const MAX_KEYWORDS: usize = 5;

fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|w| !w.is_empty())
}

/// Whether `keyword` occurs in the already lower-cased `text`.
///
/// Short keywords ("vs", "why", "pdf") must be whole words; longer ones
/// and phrases match as substrings, so "documents" still hits "document".
pub fn contains_keyword(text: &str, keyword: &str) -> bool {
    if keyword.len() <= SHORT_KEYWORD_LEN && !keyword.contains(' ') {
        words(text).any(|w| w == keyword)
    } else {
        text.contains(keyword)
    }
}

/// Requirements detected in a query.
pub fn detect_requirements(query: &str) -> BTreeSet<Requirement> {
    let lower = query.to_lowercase();
    REQUIREMENT_KEYWORDS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|k| contains_keyword(&lower, k)))
        .map(|(req, _)| *req)
        .collect()
}

/// Whether the query explicitly asks for analysis.
pub fn wants_analysis(query: &str) -> bool {
    let lower = query.to_lowercase();
    ANALYZE_KEYWORDS.iter().any(|k| contains_keyword(&lower, k))
}

/// Content keywords of a query: lower-cased words longer than three
/// characters, minus stop-words and duplicates, at most five.
pub fn extract_keywords(query: &str) -> Vec<String> {
    let lower = query.to_lowercase();
    let mut keywords: Vec<String> = Vec::new();
    for word in words(&lower) {
        if word.chars().count() <= SHORT_KEYWORD_LEN
            || STOP_WORDS.contains(&word)
            || word.chars().all(|c| c.is_ascii_digit())
        {
            continue;
        }
        if !keywords.iter().any(|k| k == word) {
            keywords.push(word.to_string());
        }
        if keywords.len() == MAX_KEYWORDS {
            break;
        }
    }
    keywords
}
