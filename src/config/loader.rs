use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| format!("{} at {}", e, e.instance_path()))
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

/// Range checks the JSON schema can't express. All violations are
/// reported together, not first-only.
fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut violations = Vec::new();

    if config.version != "1.0" {
        violations.push(format!("Unsupported config version: {}", config.version));
    }

    if config.worker_count == 0 {
        violations.push("worker_count must be at least 1".to_string());
    }

    let unit_range = [
        ("matching.trigram_floor", config.matching.trigram_floor),
        ("matching.embedding_floor", config.matching.embedding_floor),
        ("matching.hybrid_floor", config.matching.hybrid_floor),
        (
            "matching.hybrid_trigram_weight",
            config.matching.hybrid_trigram_weight,
        ),
        (
            "matching.auto_confirm_threshold",
            config.matching.auto_confirm_threshold,
        ),
    ];
    for (name, value) in unit_range {
        if !(0.0..=1.0).contains(&value) {
            violations.push(format!("{} must be within [0, 1], got {}", name, value));
        }
    }

    if config.detection.min_score < 0.0 {
        violations.push(format!(
            "detection.min_score must be non-negative, got {}",
            config.detection.min_score
        ));
    }
    let weights = [
        ("detection.name_weight", config.detection.name_weight),
        (
            "detection.email_exact_weight",
            config.detection.email_exact_weight,
        ),
        (
            "detection.email_domain_weight",
            config.detection.email_domain_weight,
        ),
        (
            "detection.erp_number_weight",
            config.detection.erp_number_weight,
        ),
        ("detection.ship_to_weight", config.detection.ship_to_weight),
    ];
    for (name, value) in weights {
        if value < 0.0 {
            violations.push(format!("{} must be non-negative, got {}", name, value));
        }
    }

    if config.intake.min_attachment_bytes > config.intake.max_attachment_bytes {
        violations.push(format!(
            "intake.min_attachment_bytes ({}) exceeds max_attachment_bytes ({})",
            config.intake.min_attachment_bytes, config.intake.max_attachment_bytes
        ));
    }

    for pattern in config.intake.include.iter().chain(&config.intake.exclude) {
        if let Err(e) = glob::Pattern::new(pattern) {
            violations.push(format!("Invalid filename pattern '{}': {}", pattern, e));
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Validation {
            message: violations.join("; "),
        })
    }
}
