//! Customer detection: scores the org's known customers against the
//! identity signals pulled from a document and its transport envelope.
//!
//! Scores are additive over weighted signals and deliberately not
//! normalized; an ERP-number hit alone should outrank a fuzzy name
//! resemblance, and the weights encode exactly that.

use serde::{Deserialize, Serialize};

use crate::catalog::Customer;
use crate::matcher::trigram;

/// Detection weights and the acceptance floor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectConfig {
    /// Candidates below this total score are discarded.
    #[serde(default = "default_min_score")]
    pub min_score: f64,

    #[serde(default = "default_name_weight")]
    pub name_weight: f64,

    #[serde(default = "default_email_exact_weight")]
    pub email_exact_weight: f64,

    #[serde(default = "default_email_domain_weight")]
    pub email_domain_weight: f64,

    #[serde(default = "default_erp_number_weight")]
    pub erp_number_weight: f64,

    #[serde(default = "default_ship_to_weight")]
    pub ship_to_weight: f64,
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            min_score: default_min_score(),
            name_weight: default_name_weight(),
            email_exact_weight: default_email_exact_weight(),
            email_domain_weight: default_email_domain_weight(),
            erp_number_weight: default_erp_number_weight(),
            ship_to_weight: default_ship_to_weight(),
        }
    }
}

fn default_min_score() -> f64 {
    0.35
}

fn default_name_weight() -> f64 {
    1.0
}

fn default_email_exact_weight() -> f64 {
    2.0
}

fn default_email_domain_weight() -> f64 {
    0.8
}

fn default_erp_number_weight() -> f64 {
    3.0
}

fn default_ship_to_weight() -> f64 {
    0.4
}

/// Everything we know about who sent the document.
#[derive(Debug, Clone, Default)]
pub struct IdentitySignals {
    /// Customer name as extracted from the document body.
    pub customer_hint: Option<String>,
    /// Sender address from the email envelope, when the document arrived
    /// as an attachment.
    pub email: Option<String>,
    /// ERP customer number found in the document.
    pub erp_number: Option<String>,
    /// Delivery address from the document.
    pub ship_to: Option<String>,
}

impl IdentitySignals {
    pub fn is_empty(&self) -> bool {
        self.customer_hint.is_none()
            && self.email.is_none()
            && self.erp_number.is_none()
            && self.ship_to.is_none()
    }
}

/// One signal's contribution to a candidate's total.
#[derive(Debug, Clone, Serialize)]
pub struct SignalContribution {
    pub signal: &'static str,
    /// Pre-weight value, e.g. a trigram similarity or 1.0 for exact hits.
    pub raw: f64,
    pub weighted: f64,
}

/// A scored detection candidate.
#[derive(Debug, Clone, Serialize)]
pub struct CustomerScore {
    pub customer_id: String,
    pub score: f64,
    pub contributions: Vec<SignalContribution>,
}

pub struct CustomerDetector {
    config: DetectConfig,
}

impl CustomerDetector {
    pub fn new(config: DetectConfig) -> Self {
        Self { config }
    }

    /// Scores every customer against the signals; candidates at or above
    /// `min_score`, best first. Ties break on customer id so repeated
    /// runs rank identically.
    pub fn score(&self, customers: &[Customer], signals: &IdentitySignals) -> Vec<CustomerScore> {
        if signals.is_empty() {
            return vec![];
        }

        let mut scored: Vec<CustomerScore> = customers
            .iter()
            .filter_map(|c| self.score_one(c, signals))
            .filter(|s| s.score >= self.config.min_score)
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.customer_id.cmp(&b.customer_id))
        });

        tracing::debug!(candidates = scored.len(), "customers scored");
        scored
    }

    fn score_one(&self, customer: &Customer, signals: &IdentitySignals) -> Option<CustomerScore> {
        let mut contributions = Vec::new();

        if let Some(hint) = &signals.customer_hint {
            let raw = trigram::similarity(hint, &customer.name);
            if raw > 0.0 {
                contributions.push(SignalContribution {
                    signal: "name",
                    raw,
                    weighted: raw * self.config.name_weight,
                });
            }
        }

        if let (Some(sender), Some(known)) = (&signals.email, &customer.email) {
            if sender.eq_ignore_ascii_case(known) {
                contributions.push(SignalContribution {
                    signal: "email_exact",
                    raw: 1.0,
                    weighted: self.config.email_exact_weight,
                });
            } else if let (Some(a), Some(b)) = (domain_of(sender), domain_of(known)) {
                if a.eq_ignore_ascii_case(b) {
                    contributions.push(SignalContribution {
                        signal: "email_domain",
                        raw: 1.0,
                        weighted: self.config.email_domain_weight,
                    });
                }
            }
        }

        if let (Some(found), Some(known)) = (&signals.erp_number, &customer.erp_number) {
            if found.trim() == known.trim() {
                contributions.push(SignalContribution {
                    signal: "erp_number",
                    raw: 1.0,
                    weighted: self.config.erp_number_weight,
                });
            }
        }

        if let (Some(ship_to), Some(address)) = (&signals.ship_to, &customer.address) {
            let raw = trigram::similarity(ship_to, address);
            if raw > 0.0 {
                contributions.push(SignalContribution {
                    signal: "ship_to",
                    raw,
                    weighted: raw * self.config.ship_to_weight,
                });
            }
        }

        if contributions.is_empty() {
            return None;
        }

        Some(CustomerScore {
            customer_id: customer.id.clone(),
            score: contributions.iter().map(|c| c.weighted).sum(),
            contributions,
        })
    }
}

fn domain_of(email: &str) -> Option<&str> {
    email.rsplit_once('@').map(|(_, domain)| domain).filter(|d| !d.is_empty())
}
