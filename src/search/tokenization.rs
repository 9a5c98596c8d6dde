use once_cell::sync::Lazy;
use std::collections::HashSet;

/// Static set of common English stop words
///
/// Error messages are short and telegraphic, so the list is intentionally
/// compact; an aggressive list would strip signal words from three-token
/// queries.
static ENGLISH_STOP_WORDS: Lazy<HashSet<String>> = Lazy::new(|| {
    vec![
        "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "had", "has",
        "have", "he", "how", "in", "is", "it", "its", "of", "on", "that", "the", "they", "this",
        "to", "was", "what", "when", "where", "which", "who", "why", "will", "with",
    ]
    .into_iter()
    .map(String::from)
    .collect()
});

/// Check if a token is a stop word
pub fn is_stop_word(token: &str) -> bool {
    ENGLISH_STOP_WORDS.contains(token)
}

/// Tokenizes text into lowercase words by splitting on runs of
/// non-alphanumeric characters and removing stop words.
///
/// Deterministic and pure; empty input yields an empty vector.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty() && !is_stop_word(word))
        .map(String::from)
        .collect()
}

/// Tokenizes text and expands the token stream into n-grams for every
/// length in `ngram_range` (inclusive). N-grams longer than one token are
/// joined with single spaces, e.g. `"schema validation"`.
pub fn tokenize_ngrams(text: &str, ngram_range: (usize, usize)) -> Vec<String> {
    let tokens = tokenize(text);
    let (min_n, max_n) = ngram_range;

    if min_n <= 1 && max_n <= 1 {
        return tokens;
    }

    let mut ngrams = Vec::new();
    for n in min_n.max(1)..=max_n {
        if n > tokens.len() {
            break;
        }
        for window in tokens.windows(n) {
            ngrams.push(window.join(" "));
        }
    }
    ngrams
}

/// Normalize a query for cache keys and feedback bookkeeping:
/// lowercase with runs of whitespace collapsed to single spaces.
pub fn normalize_query(query: &str) -> String {
    query
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
