//! Layout fingerprinting.
//!
//! Reduces a document's text to five coarse structural features, serializes
//! them as compact JSON with alphabetically ordered keys, and hashes the
//! result with SHA-256. The serialization is the interoperability contract:
//! any producer that serializes these fields identically yields the same
//! digest, so fingerprints stay comparable across implementations. Pure
//! function of its inputs, safe to memoize.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use moka::sync::Cache;
use regex::Regex;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Lines like "12  340  5.99" — three runs of digits separated by
/// non-digits — read as table rows.
static NUMERIC_ROW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\D+\d+\D+\d+").expect("static pattern"));

const PIPE_LINE_RATIO: f64 = 0.25;
const TAB_LINE_RATIO: f64 = 0.25;
const NUMERIC_ROW_RATIO: f64 = 0.30;

/// The five structural features that feed the digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintFeatures {
    pub page_count: usize,
    /// Median non-blank line length, floored to {0, 50, 100, 150}.
    pub avg_line_length: u32,
    pub has_tables: bool,
    pub text_length_bucket: &'static str,
    pub numeric_density: &'static str,
}

impl FingerprintFeatures {
    /// Computes the features from raw text. `has_tables` overrides the
    /// heuristic when the extractor already knows (e.g. spreadsheet input).
    pub fn compute(page_count: usize, text: &str, has_tables: Option<bool>) -> Self {
        Self {
            page_count,
            avg_line_length: line_length_bucket(text),
            has_tables: has_tables.unwrap_or_else(|| detect_tables(text)),
            text_length_bucket: text_length_bucket(text.chars().count()),
            numeric_density: numeric_density_bucket(text),
        }
    }

    /// Canonical serialization: compact JSON, keys in alphabetical order.
    /// Must not change — stored digests become incomparable otherwise.
    pub fn canonical_json(&self) -> String {
        let mut fields: BTreeMap<&str, Value> = BTreeMap::new();
        fields.insert("avg_line_length", Value::from(self.avg_line_length));
        fields.insert("has_tables", Value::from(self.has_tables));
        fields.insert("numeric_density", Value::from(self.numeric_density));
        fields.insert("page_count", Value::from(self.page_count as u64));
        fields.insert("text_length_bucket", Value::from(self.text_length_bucket));
        serde_json::to_string(&fields).expect("plain scalar map serializes")
    }

    /// SHA-256 hex digest of the canonical serialization.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical_json().as_bytes());
        let hash = hasher.finalize();
        hash.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

/// Computes the layout fingerprint for a document's text.
pub fn fingerprint(page_count: usize, text: &str, has_tables: Option<bool>) -> String {
    FingerprintFeatures::compute(page_count, text, has_tables).digest()
}

fn line_length_bucket(text: &str) -> u32 {
    let mut lengths: Vec<usize> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.chars().count())
        .collect();
    if lengths.is_empty() {
        return 0;
    }
    lengths.sort_unstable();
    let median = lengths[lengths.len() / 2];
    match median {
        0..=49 => 0,
        50..=99 => 50,
        100..=149 => 100,
        _ => 150,
    }
}

fn text_length_bucket(chars: usize) -> &'static str {
    match chars {
        0..=999 => "0-1k",
        1000..=4999 => "1k-5k",
        5000..=9999 => "5k-10k",
        _ => "10k+",
    }
}

fn numeric_density_bucket(text: &str) -> &'static str {
    let total = text.chars().count();
    if total == 0 {
        return "low";
    }
    let digits = text.chars().filter(|c| c.is_ascii_digit()).count();
    let ratio = digits as f64 / total as f64;
    if ratio < 0.10 {
        "low"
    } else if ratio < 0.25 {
        "medium"
    } else {
        "high"
    }
}

/// Table heuristic over non-blank lines. Any one signal is sufficient:
/// pipe-delimited lines, tab-delimited lines, or rows of three numbers.
fn detect_tables(text: &str) -> bool {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return false;
    }
    let total = lines.len() as f64;

    let piped = lines
        .iter()
        .filter(|l| l.matches('|').count() >= 2)
        .count() as f64;
    if piped / total >= PIPE_LINE_RATIO {
        return true;
    }

    let tabbed = lines
        .iter()
        .filter(|l| l.matches('\t').count() >= 2)
        .count() as f64;
    if tabbed / total >= TAB_LINE_RATIO {
        return true;
    }

    let numeric_rows = lines.iter().filter(|l| NUMERIC_ROW.is_match(l)).count() as f64;
    numeric_rows / total >= NUMERIC_ROW_RATIO
}

/// Digest memo keyed by document content hash. Fingerprinting is pure,
/// so a cached digest is always valid for the same content.
pub struct FingerprintCache {
    cache: Cache<String, String>,
}

impl FingerprintCache {
    pub fn new(capacity: u64) -> Self {
        Self {
            cache: Cache::new(capacity),
        }
    }

    pub fn get_or_compute(
        &self,
        content_hash: &str,
        page_count: usize,
        text: &str,
        has_tables: Option<bool>,
    ) -> String {
        self.cache
            .get_with(content_hash.to_string(), || {
                fingerprint(page_count, text, has_tables)
            })
    }
}

impl Default for FingerprintCache {
    fn default() -> Self {
        Self::new(4096)
    }
}
