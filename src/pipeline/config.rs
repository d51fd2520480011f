use crate::config::schema::ExtractionConfig;
use crate::config::Config;
use crate::detector::DetectConfig;
use crate::matcher::MatchConfig;

/// The slice of configuration the pipeline needs, detached from the full
/// application config so workers can hold it behind an `Arc`.
pub struct PipelineConfig {
    pub org_id: String,
    pub extraction: ExtractionConfig,
    pub matching: MatchConfig,
    pub detection: DetectConfig,
}

impl PipelineConfig {
    pub fn from_config(org_id: &str, config: &Config) -> Self {
        Self {
            org_id: org_id.to_string(),
            extraction: config.extraction.clone(),
            matching: config.matching.clone(),
            detection: config.detection.clone(),
        }
    }
}
