//! Character-trigram similarity in the style of PostgreSQL's pg_trgm:
//! lowercase, split into words, pad each word with two leading and one
//! trailing space, then compare 3-gram sets by Jaccard overlap.

use std::collections::HashSet;

fn trigrams(s: &str) -> HashSet<String> {
    let mut grams = HashSet::new();
    for word in s
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let padded: Vec<char> = format!("  {} ", word).chars().collect();
        for window in padded.windows(3) {
            grams.insert(window.iter().collect());
        }
    }
    grams
}

/// Jaccard similarity of the two trigram sets, in [0, 1].
pub fn similarity(a: &str, b: &str) -> f64 {
    let ta = trigrams(a);
    let tb = trigrams(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let intersection = ta.intersection(&tb).count();
    let union = ta.len() + tb.len() - intersection;
    intersection as f64 / union as f64
}
