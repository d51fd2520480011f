use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::detector::DetectConfig;
use crate::matcher::MatchConfig;

/// Top-level configuration, deserialized from JSON after schema validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,

    /// Number of parallel document workers.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Database file path. `None` falls back to the platform default.
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    #[serde(default)]
    pub intake: IntakeConfig,

    #[serde(default)]
    pub extraction: ExtractionConfig,

    #[serde(default)]
    pub matching: MatchConfig,

    #[serde(default)]
    pub detection: DetectConfig,
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

/// Document intake settings: drop directory and attachment filters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeConfig {
    /// Drop directory scanned for new documents.
    #[serde(default)]
    pub directory: Option<PathBuf>,

    /// Filename glob patterns to include. Empty means include all.
    #[serde(default)]
    pub include: Vec<String>,

    /// Filename glob patterns to exclude.
    #[serde(default)]
    pub exclude: Vec<String>,

    #[serde(default = "default_min_attachment_bytes")]
    pub min_attachment_bytes: u64,

    #[serde(default = "default_max_attachment_bytes")]
    pub max_attachment_bytes: u64,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            directory: None,
            include: vec![],
            exclude: vec![],
            min_attachment_bytes: default_min_attachment_bytes(),
            max_attachment_bytes: default_max_attachment_bytes(),
        }
    }
}

fn default_min_attachment_bytes() -> u64 {
    256
}

fn default_max_attachment_bytes() -> u64 {
    25 * 1024 * 1024
}

/// Extraction stage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Deadline for a single model call.
    #[serde(default = "default_llm_timeout_secs")]
    pub llm_timeout_secs: u64,

    /// Maximum order lines kept from one payload; excess is truncated.
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,

    /// Document text is capped at this many characters before prompting.
    #[serde(default = "default_max_prompt_chars")]
    pub max_prompt_chars: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            llm_timeout_secs: default_llm_timeout_secs(),
            max_lines: default_max_lines(),
            max_prompt_chars: default_max_prompt_chars(),
        }
    }
}

fn default_llm_timeout_secs() -> u64 {
    60
}

fn default_max_lines() -> usize {
    500
}

fn default_max_prompt_chars() -> usize {
    48_000
}
