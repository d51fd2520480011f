//! Entity lifecycles shared across extraction, matching, and persistence.
//!
//! Status values are stored as their snake_case string form; the enums
//! here own the legal-transition rules so repos and the pipeline agree
//! on what a terminal state is.

use serde::{Deserialize, Serialize};

/// Processing state of an ingested document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Uploaded,
    Stored,
    Processing,
    Extracted,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Uploaded => "uploaded",
            DocumentStatus::Stored => "stored",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Extracted => "extracted",
            DocumentStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "uploaded" => Some(DocumentStatus::Uploaded),
            "stored" => Some(DocumentStatus::Stored),
            "processing" => Some(DocumentStatus::Processing),
            "extracted" => Some(DocumentStatus::Extracted),
            "failed" => Some(DocumentStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DocumentStatus::Extracted | DocumentStatus::Failed)
    }

    /// Linear forward progression; `Failed` is reachable from any
    /// non-terminal state.
    pub fn can_transition(self, next: DocumentStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (DocumentStatus::Uploaded, DocumentStatus::Stored) => true,
            (DocumentStatus::Stored, DocumentStatus::Processing) => true,
            (DocumentStatus::Processing, DocumentStatus::Extracted) => true,
            (_, DocumentStatus::Failed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of one extraction attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RunStatus::Pending),
            "running" => Some(RunStatus::Running),
            "succeeded" => Some(RunStatus::Succeeded),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }

    /// Terminal runs never change again; retries create a new run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Failed)
    }

    pub fn can_transition(self, next: RunStatus) -> bool {
        match (self, next) {
            (RunStatus::Pending, RunStatus::Running) => true,
            (RunStatus::Pending, RunStatus::Failed) => true,
            (RunStatus::Running, RunStatus::Succeeded) => true,
            (RunStatus::Running, RunStatus::Failed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Match state of a draft order line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Unmatched,
    Suggested,
    Matched,
    Overridden,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Unmatched => "unmatched",
            MatchStatus::Suggested => "suggested",
            MatchStatus::Matched => "matched",
            MatchStatus::Overridden => "overridden",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unmatched" => Some(MatchStatus::Unmatched),
            "suggested" => Some(MatchStatus::Suggested),
            "matched" => Some(MatchStatus::Matched),
            "overridden" => Some(MatchStatus::Overridden),
            _ => None,
        }
    }
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a line's internal SKU was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    ExactMapping,
    Trigram,
    Embedding,
    Hybrid,
    Manual,
}

impl MatchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMethod::ExactMapping => "exact_mapping",
            MatchMethod::Trigram => "trigram",
            MatchMethod::Embedding => "embedding",
            MatchMethod::Hybrid => "hybrid",
            MatchMethod::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "exact_mapping" => Some(MatchMethod::ExactMapping),
            "trigram" => Some(MatchMethod::Trigram),
            "embedding" => Some(MatchMethod::Embedding),
            "hybrid" => Some(MatchMethod::Hybrid),
            "manual" => Some(MatchMethod::Manual),
            _ => None,
        }
    }
}

impl std::fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a learned customer-SKU association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingStatus {
    Suggested,
    Confirmed,
    Rejected,
    Deprecated,
}

impl MappingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MappingStatus::Suggested => "suggested",
            MappingStatus::Confirmed => "confirmed",
            MappingStatus::Rejected => "rejected",
            MappingStatus::Deprecated => "deprecated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "suggested" => Some(MappingStatus::Suggested),
            "confirmed" => Some(MappingStatus::Confirmed),
            "rejected" => Some(MappingStatus::Rejected),
            "deprecated" => Some(MappingStatus::Deprecated),
            _ => None,
        }
    }

    /// Active mappings participate in exact matching; at most one may
    /// exist per (org, customer, normalized SKU).
    pub fn is_active(&self) -> bool {
        matches!(self, MappingStatus::Suggested | MappingStatus::Confirmed)
    }
}

impl std::fmt::Display for MappingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of a customer detection hypothesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStatus {
    Candidate,
    Confirmed,
}

impl CandidateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateStatus::Candidate => "candidate",
            CandidateStatus::Confirmed => "confirmed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "candidate" => Some(CandidateStatus::Candidate),
            "confirmed" => Some(CandidateStatus::Confirmed),
            _ => None,
        }
    }
}

impl std::fmt::Display for CandidateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery state of an approved draft order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStatus {
    Pending,
    Sent,
    Acked,
    Failed,
}

impl ExportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportStatus::Pending => "pending",
            ExportStatus::Sent => "sent",
            ExportStatus::Acked => "acked",
            ExportStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ExportStatus::Pending),
            "sent" => Some(ExportStatus::Sent),
            "acked" => Some(ExportStatus::Acked),
            "failed" => Some(ExportStatus::Failed),
            _ => None,
        }
    }

    pub fn can_transition(self, next: ExportStatus) -> bool {
        match (self, next) {
            (ExportStatus::Pending, ExportStatus::Sent) => true,
            (ExportStatus::Sent, ExportStatus::Acked) => true,
            (ExportStatus::Sent, ExportStatus::Failed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_status_forward_progression() {
        assert!(DocumentStatus::Uploaded.can_transition(DocumentStatus::Stored));
        assert!(DocumentStatus::Stored.can_transition(DocumentStatus::Processing));
        assert!(DocumentStatus::Processing.can_transition(DocumentStatus::Extracted));

        // No skipping ahead or moving backwards.
        assert!(!DocumentStatus::Uploaded.can_transition(DocumentStatus::Processing));
        assert!(!DocumentStatus::Processing.can_transition(DocumentStatus::Stored));
        assert!(!DocumentStatus::Extracted.can_transition(DocumentStatus::Processing));
    }

    #[test]
    fn test_document_failed_reachable_from_non_terminal() {
        assert!(DocumentStatus::Uploaded.can_transition(DocumentStatus::Failed));
        assert!(DocumentStatus::Stored.can_transition(DocumentStatus::Failed));
        assert!(DocumentStatus::Processing.can_transition(DocumentStatus::Failed));

        assert!(!DocumentStatus::Extracted.can_transition(DocumentStatus::Failed));
        assert!(!DocumentStatus::Failed.can_transition(DocumentStatus::Failed));
    }

    #[test]
    fn test_run_terminal_states_are_final() {
        assert!(!RunStatus::Succeeded.can_transition(RunStatus::Running));
        assert!(!RunStatus::Succeeded.can_transition(RunStatus::Failed));
        assert!(!RunStatus::Failed.can_transition(RunStatus::Pending));
        assert!(RunStatus::Pending.can_transition(RunStatus::Running));
        assert!(RunStatus::Running.can_transition(RunStatus::Succeeded));
    }

    #[test]
    fn test_status_string_round_trip() {
        for status in [
            DocumentStatus::Uploaded,
            DocumentStatus::Stored,
            DocumentStatus::Processing,
            DocumentStatus::Extracted,
            DocumentStatus::Failed,
        ] {
            assert_eq!(DocumentStatus::parse(status.as_str()), Some(status));
        }
        for method in [
            MatchMethod::ExactMapping,
            MatchMethod::Trigram,
            MatchMethod::Embedding,
            MatchMethod::Hybrid,
            MatchMethod::Manual,
        ] {
            assert_eq!(MatchMethod::parse(method.as_str()), Some(method));
        }
        assert_eq!(DocumentStatus::parse("bogus"), None);
    }

    #[test]
    fn test_mapping_active_states() {
        assert!(MappingStatus::Suggested.is_active());
        assert!(MappingStatus::Confirmed.is_active());
        assert!(!MappingStatus::Rejected.is_active());
        assert!(!MappingStatus::Deprecated.is_active());
    }

    #[test]
    fn test_export_transitions() {
        assert!(ExportStatus::Pending.can_transition(ExportStatus::Sent));
        assert!(ExportStatus::Sent.can_transition(ExportStatus::Acked));
        assert!(ExportStatus::Sent.can_transition(ExportStatus::Failed));

        assert!(!ExportStatus::Pending.can_transition(ExportStatus::Acked));
        assert!(!ExportStatus::Acked.can_transition(ExportStatus::Sent));
        assert!(!ExportStatus::Failed.can_transition(ExportStatus::Pending));
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&MatchMethod::ExactMapping).unwrap();
        assert_eq!(json, "\"exact_mapping\"");
        let back: MatchMethod = serde_json::from_str("\"hybrid\"").unwrap();
        assert_eq!(back, MatchMethod::Hybrid);
    }
}
