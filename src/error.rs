use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrderflowError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("Validation error: {0}")]
    Validate(#[from] ValidateError),

    #[error("Model error: {0}")]
    Llm(#[from] LlmError),

    #[error("Matching error: {0}")]
    Match(#[from] MatchError),

    #[error("Intake error: {0}")]
    Intake(#[from] IntakeError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DbError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to extract PDF: {0}")]
    Pdf(String),

    #[error("Failed to extract workbook: {0}")]
    Excel(String),

    #[error("Failed to extract CSV: {0}")]
    Csv(String),
}

impl ExtractError {
    /// Stable code stored in entity error fields.
    pub fn code(&self) -> &'static str {
        match self {
            ExtractError::UnsupportedFormat(_) => "unsupported_format",
            _ => "extraction_failed",
        }
    }
}

#[derive(Error, Debug)]
pub enum ValidateError {
    #[error("Payload violates the output schema: {}", violations.join("; "))]
    Schema { violations: Vec<String> },
}

impl ValidateError {
    pub fn code(&self) -> &'static str {
        "schema_violation"
    }
}

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Model call exceeded {secs}s timeout")]
    Timeout { secs: u64 },

    #[error("Model transport failed: {0}")]
    Transport(String),

    #[error("Model returned unparseable JSON: {0}")]
    InvalidJson(String),
}

impl LlmError {
    pub fn code(&self) -> &'static str {
        match self {
            LlmError::InvalidJson(_) => "schema_violation",
            _ => "extraction_failed",
        }
    }
}

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("Similarity lookup exceeded {ms}ms deadline")]
    Timeout { ms: u64 },

    #[error("Embedding index failed: {0}")]
    Index(String),

    #[error("Mapping lookup failed: {0}")]
    Store(String),
}

impl MatchError {
    pub fn code(&self) -> &'static str {
        match self {
            MatchError::Timeout { .. } => "match_timeout",
            _ => "match_failed",
        }
    }
}

#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("Directory scan failed for '{path}': {source}")]
    ScanFailed {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse email: {0}")]
    MailParse(String),

    #[error("Invalid filename pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Draft order is not exportable: {}", problems.join("; "))]
    NotReady { problems: Vec<String> },

    #[error("Illegal export transition {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, OrderflowError>;
