//! Embedding index seam for semantic SKU lookup.
//!
//! The production index (a vector store fed by an embedding provider)
//! lives behind [`EmbeddingIndex`]. The in-memory implementation embeds
//! text deterministically by hashing character trigrams into a fixed
//! number of buckets; crude, but stable and dependency-free, which is
//! exactly what tests and offline runs need.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use crate::error::MatchError;

const DIMENSIONS: usize = 64;

/// One nearest-neighbor result.
#[derive(Debug, Clone)]
pub struct EmbeddingHit {
    pub internal_sku: String,
    /// Cosine similarity in [0, 1] for non-degenerate vectors.
    pub similarity: f64,
}

pub trait EmbeddingIndex: Send + Sync {
    /// The `limit` most similar catalog entries for `query`, best first.
    /// Implementations must respect `timeout` and fail with
    /// [`MatchError::Timeout`] instead of blocking past it.
    fn search(
        &self,
        org_id: &str,
        query: &str,
        limit: usize,
        timeout: Duration,
    ) -> Result<Vec<EmbeddingHit>, MatchError>;
}

fn embed(text: &str) -> [f64; DIMENSIONS] {
    let mut vector = [0.0; DIMENSIONS];
    let chars: Vec<char> = format!("  {} ", text.to_lowercase()).chars().collect();
    for window in chars.windows(3) {
        let mut hasher = DefaultHasher::new();
        window.hash(&mut hasher);
        vector[(hasher.finish() % DIMENSIONS as u64) as usize] += 1.0;
    }
    vector
}

fn cosine(a: &[f64; DIMENSIONS], b: &[f64; DIMENSIONS]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

struct Entry {
    internal_sku: String,
    vector: [f64; DIMENSIONS],
}

/// Deterministic in-memory index over trigram-hash embeddings.
#[derive(Default)]
pub struct InMemoryIndex {
    entries: RwLock<HashMap<String, Vec<Entry>>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes a catalog entry under its descriptive text.
    pub fn insert(&self, org_id: &str, internal_sku: &str, text: &str) {
        let mut map = self.entries.write().unwrap_or_else(|e| e.into_inner());
        map.entry(org_id.to_string()).or_default().push(Entry {
            internal_sku: internal_sku.to_string(),
            vector: embed(text),
        });
    }
}

impl EmbeddingIndex for InMemoryIndex {
    fn search(
        &self,
        org_id: &str,
        query: &str,
        limit: usize,
        timeout: Duration,
    ) -> Result<Vec<EmbeddingHit>, MatchError> {
        let started = Instant::now();
        let query_vector = embed(query);

        let map = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let Some(entries) = map.get(org_id) else {
            return Ok(vec![]);
        };

        let mut hits: Vec<EmbeddingHit> = Vec::with_capacity(entries.len());
        for entry in entries {
            if started.elapsed() > timeout {
                return Err(MatchError::Timeout {
                    ms: timeout.as_millis() as u64,
                });
            }
            hits.push(EmbeddingHit {
                internal_sku: entry.internal_sku.clone(),
                similarity: cosine(&query_vector, &entry.vector),
            });
        }

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> InMemoryIndex {
        let index = InMemoryIndex::new();
        index.insert("org-1", "INT-100", "blue widget 10mm steel");
        index.insert("org-1", "INT-200", "red rubber gasket 20mm");
        index.insert("org-2", "OTHER-1", "blue widget 10mm steel");
        index
    }

    #[test]
    fn test_identical_text_ranks_first_with_unit_similarity() {
        let hits = index()
            .search("org-1", "blue widget 10mm steel", 5, Duration::from_secs(1))
            .unwrap();
        assert_eq!(hits[0].internal_sku, "INT-100");
        assert!((hits[0].similarity - 1.0).abs() < 1e-9);
        assert!(hits[0].similarity > hits[1].similarity);
    }

    #[test]
    fn test_similar_wording_beats_unrelated() {
        let hits = index()
            .search("org-1", "widget blue steel", 5, Duration::from_secs(1))
            .unwrap();
        assert_eq!(hits[0].internal_sku, "INT-100");
    }

    #[test]
    fn test_org_isolation() {
        let hits = index()
            .search("org-2", "blue widget", 5, Duration::from_secs(1))
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].internal_sku, "OTHER-1");

        let empty = index()
            .search("org-9", "blue widget", 5, Duration::from_secs(1))
            .unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_limit_is_honored() {
        let hits = index()
            .search("org-1", "widget", 1, Duration::from_secs(1))
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_embedding_is_deterministic() {
        let a = embed("blue widget");
        let b = embed("blue widget");
        assert_eq!(a, b);
    }
}
