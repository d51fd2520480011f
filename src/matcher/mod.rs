//! SKU matching: resolves a customer's article number to an internal SKU
//! through a strategy cascade.
//!
//! Order is fixed: learned exact mappings, then trigram similarity over
//! the catalog, then embedding lookup, then a weighted hybrid of the two
//! similarity signals. Every strategy consulted leaves a trace entry, so
//! an unmatched line explains exactly what was tried and why nothing
//! cleared its floor.

pub mod normalize;
pub mod trigram;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::CatalogSku;
use crate::embedding::EmbeddingIndex;
use crate::error::MatchError;
use crate::model::{MappingStatus, MatchMethod, MatchStatus};

pub use normalize::normalize_sku;

/// Matching thresholds and switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Minimum trigram similarity for a standalone trigram match.
    #[serde(default = "default_trigram_floor")]
    pub trigram_floor: f64,

    /// Minimum cosine similarity for a standalone embedding match.
    #[serde(default = "default_embedding_floor")]
    pub embedding_floor: f64,

    /// Minimum combined score for a hybrid match.
    #[serde(default = "default_hybrid_floor")]
    pub hybrid_floor: f64,

    /// Trigram share of the hybrid score; the embedding share is the rest.
    #[serde(default = "default_hybrid_trigram_weight")]
    pub hybrid_trigram_weight: f64,

    /// When set, matches at or above the threshold go straight to
    /// `matched` instead of awaiting review.
    #[serde(default)]
    pub auto_confirm: bool,

    #[serde(default = "default_auto_confirm_threshold")]
    pub auto_confirm_threshold: f64,

    /// Deadline for one similarity lookup against the embedding index.
    #[serde(default = "default_match_timeout_ms")]
    pub match_timeout_ms: u64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            trigram_floor: default_trigram_floor(),
            embedding_floor: default_embedding_floor(),
            hybrid_floor: default_hybrid_floor(),
            hybrid_trigram_weight: default_hybrid_trigram_weight(),
            auto_confirm: false,
            auto_confirm_threshold: default_auto_confirm_threshold(),
            match_timeout_ms: default_match_timeout_ms(),
        }
    }
}

fn default_trigram_floor() -> f64 {
    0.30
}

fn default_embedding_floor() -> f64 {
    0.72
}

fn default_hybrid_floor() -> f64 {
    0.55
}

fn default_hybrid_trigram_weight() -> f64 {
    0.5
}

fn default_auto_confirm_threshold() -> f64 {
    0.92
}

fn default_match_timeout_ms() -> u64 {
    2000
}

/// A learned association between a customer's article number and an
/// internal SKU.
#[derive(Debug, Clone)]
pub struct SkuMapping {
    pub id: i64,
    pub internal_sku: String,
    pub status: MappingStatus,
    pub support_count: i64,
}

/// Read side of the mapping table as the engine sees it.
pub trait MappingStore: Send + Sync {
    /// The single active mapping for (org, customer, normalized SKU),
    /// if one exists.
    fn active_mapping(
        &self,
        org_id: &str,
        customer_id: Option<&str>,
        normalized_sku: &str,
    ) -> Result<Option<SkuMapping>, MatchError>;

    /// Bumps the support counter after an exact hit.
    fn record_support(&self, mapping_id: i64) -> Result<(), MatchError>;
}

/// One consulted strategy in a match decision.
#[derive(Debug, Clone, Serialize)]
pub struct TraceEntry {
    pub strategy: &'static str,
    pub candidate: Option<String>,
    pub score: Option<f64>,
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Outcome of matching one order line.
#[derive(Debug, Clone, Serialize)]
pub struct SkuMatch {
    pub internal_sku: Option<String>,
    pub confidence: f64,
    pub method: Option<MatchMethod>,
    pub status: MatchStatus,
    pub trace: Vec<TraceEntry>,
}

impl SkuMatch {
    fn unmatched(trace: Vec<TraceEntry>) -> Self {
        Self {
            internal_sku: None,
            confidence: 0.0,
            method: None,
            status: MatchStatus::Unmatched,
            trace,
        }
    }
}

pub struct MatchEngine {
    config: MatchConfig,
    store: Arc<dyn MappingStore>,
    index: Option<Arc<dyn EmbeddingIndex>>,
}

impl MatchEngine {
    pub fn new(
        config: MatchConfig,
        store: Arc<dyn MappingStore>,
        index: Option<Arc<dyn EmbeddingIndex>>,
    ) -> Self {
        Self {
            config,
            store,
            index,
        }
    }

    /// Resolves one customer line against the org's catalog snapshot.
    ///
    /// Returns `Err` only for infrastructure failures (store errors,
    /// index timeouts); "nothing matched" is a successful `Unmatched`.
    pub fn match_line(
        &self,
        org_id: &str,
        customer_id: Option<&str>,
        customer_sku: &str,
        description: Option<&str>,
        catalog: &[CatalogSku],
    ) -> Result<SkuMatch, MatchError> {
        let mut trace = Vec::new();

        if let Some(result) = self.try_exact(org_id, customer_id, customer_sku, &mut trace)? {
            return Ok(result);
        }

        let trigram_scores = self.trigram_scores(customer_sku, description, catalog);
        let trigram_best = best_of(&trigram_scores);
        if let Some((sku, score)) = &trigram_best {
            let accepted = *score >= self.config.trigram_floor;
            trace.push(TraceEntry {
                strategy: "trigram",
                candidate: Some(sku.clone()),
                score: Some(*score),
                accepted,
                note: None,
            });
            if accepted {
                return Ok(self.accept(sku.clone(), *score, MatchMethod::Trigram, trace));
            }
        } else {
            trace.push(TraceEntry {
                strategy: "trigram",
                candidate: None,
                score: None,
                accepted: false,
                note: Some("empty catalog".to_string()),
            });
        }

        let embedding_scores = self.embedding_scores(org_id, customer_sku, description, &mut trace)?;
        let embedding_best = best_of(&embedding_scores);
        if let Some((sku, score)) = &embedding_best {
            if *score >= self.config.embedding_floor {
                // Accepted flag was set when the entry was pushed.
                return Ok(self.accept(sku.clone(), *score, MatchMethod::Embedding, trace));
            }
        }

        // Hybrid: combine the two signals when neither stands alone.
        if !trigram_scores.is_empty() && !embedding_scores.is_empty() {
            let w = self.config.hybrid_trigram_weight;
            let mut combined: HashMap<String, f64> = HashMap::new();
            for (sku, s) in &trigram_scores {
                *combined.entry(sku.clone()).or_insert(0.0) += w * s;
            }
            for (sku, s) in &embedding_scores {
                *combined.entry(sku.clone()).or_insert(0.0) += (1.0 - w) * s;
            }
            if let Some((sku, score)) = best_of(&combined) {
                let accepted = score >= self.config.hybrid_floor;
                trace.push(TraceEntry {
                    strategy: "hybrid",
                    candidate: Some(sku.clone()),
                    score: Some(score),
                    accepted,
                    note: None,
                });
                if accepted {
                    return Ok(self.accept(sku, score, MatchMethod::Hybrid, trace));
                }
            }
        }

        tracing::debug!(customer_sku, "no strategy cleared its floor");
        Ok(SkuMatch::unmatched(trace))
    }

    fn try_exact(
        &self,
        org_id: &str,
        customer_id: Option<&str>,
        customer_sku: &str,
        trace: &mut Vec<TraceEntry>,
    ) -> Result<Option<SkuMatch>, MatchError> {
        let normalized = normalize_sku(customer_sku);
        if normalized.is_empty() {
            return Ok(None);
        }

        let Some(mapping) = self
            .store
            .active_mapping(org_id, customer_id, &normalized)?
        else {
            return Ok(None);
        };

        match mapping.status {
            MappingStatus::Confirmed => {
                self.store.record_support(mapping.id)?;
                trace.push(TraceEntry {
                    strategy: "exact_mapping",
                    candidate: Some(mapping.internal_sku.clone()),
                    score: Some(1.0),
                    accepted: true,
                    note: None,
                });
                Ok(Some(self.accept(
                    mapping.internal_sku,
                    1.0,
                    MatchMethod::ExactMapping,
                    std::mem::take(trace),
                )))
            }
            // A suggested mapping is evidence, not authority: note it and
            // let the similarity strategies decide.
            _ => {
                trace.push(TraceEntry {
                    strategy: "exact_mapping",
                    candidate: Some(mapping.internal_sku),
                    score: Some(1.0),
                    accepted: false,
                    note: Some("mapping still suggested, not applied".to_string()),
                });
                Ok(None)
            }
        }
    }

    fn trigram_scores(
        &self,
        customer_sku: &str,
        description: Option<&str>,
        catalog: &[CatalogSku],
    ) -> HashMap<String, f64> {
        catalog
            .iter()
            .map(|item| {
                let sku_score = trigram::similarity(customer_sku, &item.sku);
                let desc_score = description
                    .map(|d| trigram::similarity(d, &item.description))
                    .unwrap_or(0.0);
                (item.sku.clone(), sku_score.max(desc_score))
            })
            .filter(|(_, score)| *score > 0.0)
            .collect()
    }

    fn embedding_scores(
        &self,
        org_id: &str,
        customer_sku: &str,
        description: Option<&str>,
        trace: &mut Vec<TraceEntry>,
    ) -> Result<HashMap<String, f64>, MatchError> {
        let Some(index) = &self.index else {
            trace.push(TraceEntry {
                strategy: "embedding",
                candidate: None,
                score: None,
                accepted: false,
                note: Some("skipped: index unavailable".to_string()),
            });
            return Ok(HashMap::new());
        };

        let query = description.unwrap_or(customer_sku);
        let timeout = Duration::from_millis(self.config.match_timeout_ms);
        let hits = index.search(org_id, query, 5, timeout)?;

        let scores: HashMap<String, f64> = hits
            .iter()
            .map(|h| (h.internal_sku.clone(), h.similarity))
            .collect();

        match best_of(&scores) {
            Some((sku, score)) => trace.push(TraceEntry {
                strategy: "embedding",
                candidate: Some(sku),
                score: Some(score),
                accepted: score >= self.config.embedding_floor,
                note: None,
            }),
            None => trace.push(TraceEntry {
                strategy: "embedding",
                candidate: None,
                score: None,
                accepted: false,
                note: Some("no hits".to_string()),
            }),
        }

        Ok(scores)
    }

    fn accept(
        &self,
        internal_sku: String,
        confidence: f64,
        method: MatchMethod,
        trace: Vec<TraceEntry>,
    ) -> SkuMatch {
        let status = if self.config.auto_confirm && confidence >= self.config.auto_confirm_threshold
        {
            MatchStatus::Matched
        } else {
            MatchStatus::Suggested
        };
        SkuMatch {
            internal_sku: Some(internal_sku),
            confidence,
            method: Some(method),
            status,
            trace,
        }
    }
}

fn best_of(scores: &HashMap<String, f64>) -> Option<(String, f64)> {
    scores
        .iter()
        .max_by(|a, b| {
            a.1.partial_cmp(b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                // Deterministic winner on score ties.
                .then_with(|| b.0.cmp(a.0))
        })
        .map(|(sku, score)| (sku.clone(), *score))
}
