//! Language-model seam for structured order extraction.
//!
//! The pipeline talks to a model only through [`OrderModel`]; the actual
//! provider adapter (HTTP client, retries, auth) lives outside this crate.
//! What lives here is the prompt construction, the reply envelope with
//! usage accounting, and a fixture implementation for tests.

use std::time::Duration;

use serde_json::Value;

use crate::error::LlmError;

/// One extraction call: an already-built prompt plus the caller's deadline.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub prompt: String,
    pub timeout: Duration,
}

/// Token and latency accounting reported by the adapter, persisted on the
/// extraction run for cost attribution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub latency_ms: u64,
    /// Provider-reported cost in the account currency, when available.
    pub cost: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct ModelReply {
    /// The model's structured output, already parsed as JSON. Validation
    /// against the order schema happens downstream, not here.
    pub payload: Value,
    pub usage: ModelUsage,
}

/// A model capable of turning document text into a structured order payload.
pub trait OrderModel: Send + Sync {
    fn complete(&self, request: &ModelRequest) -> Result<ModelReply, LlmError>;
}

/// Parses an adapter's raw completion text into a JSON payload.
///
/// Tolerates a fenced ```json block around the object, which several
/// providers emit even when asked for bare JSON.
pub fn parse_payload(raw: &str) -> Result<Value, LlmError> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed);
    serde_json::from_str(body).map_err(|e| LlmError::InvalidJson(e.to_string()))
}

/// Builds the extraction prompt for a document's canonical text.
///
/// The text is sanitized and truncated to `max_chars` so that oversized
/// documents degrade to a partial prompt instead of a transport error.
pub fn build_extraction_prompt(text: &str, max_chars: usize) -> String {
    let sanitized = sanitize_for_prompt(text);
    let total_chars = sanitized.chars().count();
    let truncated: String = sanitized.chars().take(max_chars).collect();
    if total_chars > max_chars {
        tracing::debug!(original_chars = total_chars, max_chars, "prompt text truncated");
    }

    format!(
        r#"You are extracting a purchase order from a customer document.

Return ONLY a JSON object with this shape, no prose:
{{
  "header": {{
    "external_order_number": string or null,
    "order_date": "YYYY-MM-DD" or null,
    "currency": three-letter ISO code or null,
    "customer_hint": string or null,
    "ship_to": string or null,
    "notes": string or null
  }},
  "lines": [
    {{
      "line_number": integer starting at 1,
      "customer_sku": string,
      "description": string or null,
      "quantity": number,
      "unit": string or null,
      "unit_price": number or null,
      "currency": three-letter ISO code or null,
      "requested_delivery": "YYYY-MM-DD" or null
    }}
  ]
}}

Copy article numbers exactly as written. Do not invent lines that are not
in the document. Use null for anything the document does not state.

Document:
---
{}
---"#,
        truncated
    )
}

/// Strips control characters that confuse models and collapses runs of
/// blank lines left behind by page boundaries.
fn sanitize_for_prompt(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect();

    let mut out = String::with_capacity(cleaned.len());
    let mut blank_run = 0;
    for line in cleaned.lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Canned model for tests and offline runs: returns a fixed payload and
/// synthetic usage without any network traffic.
pub struct FixtureModel {
    payload: Value,
    fail_with: Option<fn() -> LlmError>,
}

impl FixtureModel {
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            fail_with: None,
        }
    }

    /// Fixture that fails every call, for error-path tests.
    pub fn failing(make_error: fn() -> LlmError) -> Self {
        Self {
            payload: Value::Null,
            fail_with: Some(make_error),
        }
    }
}

impl OrderModel for FixtureModel {
    fn complete(&self, request: &ModelRequest) -> Result<ModelReply, LlmError> {
        if let Some(make_error) = self.fail_with {
            return Err(make_error());
        }
        Ok(ModelReply {
            payload: self.payload.clone(),
            usage: ModelUsage {
                prompt_tokens: (request.prompt.len() / 4) as u32,
                completion_tokens: 64,
                latency_ms: 1,
                cost: None,
            },
        })
    }
}
