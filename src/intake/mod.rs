//! Document intake: the drop-directory scanner and the inbound-email
//! attachment path. Both produce `IntakeItem`s that `register` turns into
//! deduplicated document rows.

pub mod email;
pub mod register;
pub mod scanner;

pub use email::EmailIntake;
pub use register::{content_hash, register};
pub use scanner::DirectoryScanner;

use glob::Pattern;

use crate::error::IntakeError;

/// Mail envelope metadata carried with an attachment.
#[derive(Debug, Clone)]
pub struct MailMeta {
    pub from_name: Option<String>,
    pub from_address: Option<String>,
    pub subject: Option<String>,
    pub date: Option<String>,
    pub message_id: Option<String>,
}

/// A document ready for registration, regardless of source.
#[derive(Debug, Clone)]
pub struct IntakeItem {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
    /// Set when the document arrived as a mail attachment.
    pub mail: Option<MailMeta>,
}

/// Compiled include/exclude filename globs shared by both sources.
pub(crate) struct FilenameFilter {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

impl FilenameFilter {
    /// Compiles the configured patterns; a malformed pattern is a setup
    /// error, not something to skip silently.
    pub(crate) fn compile(include: &[String], exclude: &[String]) -> Result<Self, IntakeError> {
        let compile_all = |patterns: &[String]| -> Result<Vec<Pattern>, IntakeError> {
            patterns
                .iter()
                .map(|p| {
                    Pattern::new(p).map_err(|e| IntakeError::InvalidPattern {
                        pattern: p.clone(),
                        reason: e.to_string(),
                    })
                })
                .collect()
        };
        Ok(Self {
            include: compile_all(include)?,
            exclude: compile_all(exclude)?,
        })
    }

    /// Empty include list means "include everything"; exclude always wins.
    pub(crate) fn matches(&self, file_name: &str) -> bool {
        if self.exclude.iter().any(|p| p.matches(file_name)) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|p| p.matches(file_name))
    }
}
