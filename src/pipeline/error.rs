use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Extraction failed: {0}")]
    Extract(#[from] crate::error::ExtractError),

    #[error("Model call failed: {0}")]
    Llm(#[from] crate::error::LlmError),

    #[error("Payload validation failed: {0}")]
    Validate(#[from] crate::error::ValidateError),

    #[error("Matching failed: {0}")]
    Match(#[from] crate::error::MatchError),
}

impl PipelineError {
    /// Stable code persisted on the run and document error fields.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::Extract(e) => e.code(),
            PipelineError::Llm(e) => e.code(),
            PipelineError::Validate(e) => e.code(),
            PipelineError::Match(e) => e.code(),
        }
    }
}
