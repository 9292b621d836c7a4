//! Keyword hook
//!
//! Derives the most frequent meaningful words from recognized page text.

use std::collections::HashMap;

/// Number of keywords kept per page
pub const DEFAULT_KEYWORD_COUNT: usize = 10;

/// Shortest token considered a keyword
const MIN_KEYWORD_LEN: usize = 3;

const STOP_WORDS: &[&str] = &[
    "about", "after", "all", "also", "and", "any", "are", "because", "been", "before", "being",
    "but", "can", "could", "did", "does", "for", "from", "had", "has", "have", "her", "here",
    "him", "his", "how", "into", "its", "just", "more", "most", "not", "now", "only", "other",
    "our", "out", "over", "she", "should", "some", "such", "than", "that", "the", "their",
    "them", "then", "there", "these", "they", "this", "those", "through", "too", "under",
    "very", "was", "were", "what", "when", "where", "which", "while", "who", "why", "will",
    "with", "would", "you", "your",
];

/// Extracts up to `limit` keywords ordered by descending frequency
///
/// Ties keep the order in which words first appear in the text.
///
/// # Example
///
/// ```
/// use crawl_lens::keywords::extract_keywords;
///
/// let keywords = extract_keywords("Rust crawler. The crawler is fast, rust is fun.", 2);
/// assert_eq!(keywords, vec!["rust", "crawler"]);
/// ```
pub fn extract_keywords(text: &str, limit: usize) -> Vec<String> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();

    let words = text
        .split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|w| is_keyword_candidate(w));

    for (position, word) in words.enumerate() {
        counts.entry(word).or_insert((0, position)).0 += 1;
    }

    let mut ranked: Vec<(String, usize, usize)> = counts
        .into_iter()
        .map(|(word, (count, first))| (word, count, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

    ranked
        .into_iter()
        .take(limit)
        .map(|(word, _, _)| word)
        .collect()
}

fn is_keyword_candidate(word: &str) -> bool {
    word.chars().count() >= MIN_KEYWORD_LEN
        && !word.chars().all(|c| c.is_ascii_digit())
        && !STOP_WORDS.contains(&word)
}
