use std::time::Instant;

use serde_json::Value;

use crate::detector::CustomerScore;
use crate::extractor::CanonicalContent;
use crate::llm::ModelUsage;
use crate::matcher::SkuMatch;
use crate::validator::ExtractionOutput;
use crate::worker::job::Job;

pub struct PipelineContext {
    // Input
    pub job: Job,

    pub started_at: Instant,

    // Step 1 — guaranteed Some after step_extract
    pub content: Option<CanonicalContent>,
    pub extractor_name: Option<String>,
    pub extractor_version: Option<String>,

    // Step 2 — guaranteed Some after step_call_model
    pub payload: Option<Value>,
    pub usage: Option<ModelUsage>,

    // Step 3 — guaranteed Some after step_validate; step 4 appends its
    // unit warnings here
    pub output: Option<ExtractionOutput>,

    // Step 4 — canonical unit codes, parallel to `output.lines`
    pub units: Vec<Option<&'static str>>,

    // Step 5
    pub fingerprint: Option<String>,

    // Step 6 — one entry per order line
    pub matches: Vec<SkuMatch>,

    // Step 7
    pub candidates: Vec<CustomerScore>,
}

impl PipelineContext {
    pub fn new(job: Job) -> Self {
        Self {
            job,
            started_at: Instant::now(),
            content: None,
            extractor_name: None,
            extractor_version: None,
            payload: None,
            usage: None,
            output: None,
            units: Vec::new(),
            fingerprint: None,
            matches: Vec::new(),
            candidates: Vec::new(),
        }
    }

    /// Lines resolved to an internal SKU, whether auto-confirmed or
    /// suggested. Feeds the run metrics and daily stats.
    pub fn matched_count(&self) -> usize {
        self.matches
            .iter()
            .filter(|m| m.internal_sku.is_some())
            .count()
    }

    pub fn line_count(&self) -> usize {
        self.output.as_ref().map(|o| o.lines.len()).unwrap_or(0)
    }
}
