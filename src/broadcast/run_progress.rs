//! Run progress broadcaster for real-time extraction status streaming.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Phase of document processing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Queued,
    Extracting,
    Prompting,
    Validating,
    NormalizingUnits,
    Fingerprinting,
    Matching,
    Detecting,
    Completed,
    Failed,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunPhase::Queued => write!(f, "Queued"),
            RunPhase::Extracting => write!(f, "Extracting text"),
            RunPhase::Prompting => write!(f, "Calling model"),
            RunPhase::Validating => write!(f, "Validating output"),
            RunPhase::NormalizingUnits => write!(f, "Normalizing units"),
            RunPhase::Fingerprinting => write!(f, "Fingerprinting layout"),
            RunPhase::Matching => write!(f, "Matching SKUs"),
            RunPhase::Detecting => write!(f, "Detecting customer"),
            RunPhase::Completed => write!(f, "Completed"),
            RunPhase::Failed => write!(f, "Failed"),
        }
    }
}

/// Progress event for an extraction run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunProgressEvent {
    /// Unique run identifier.
    pub run_id: String,
    /// Document being processed.
    pub document_id: String,
    /// Original filename.
    pub file_name: String,
    /// Where the run currently is.
    pub phase: RunPhase,
    /// Short human-readable description of the step.
    pub message: String,
    /// When the event was produced.
    pub timestamp: DateTime<Utc>,
    /// Draft order id (set on completion).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draft_order_id: Option<String>,
    /// Populated when the run failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunProgressEvent {
    /// Builds an event for the given phase.
    pub fn new(
        run_id: &str,
        document_id: &str,
        file_name: &str,
        phase: RunPhase,
        message: &str,
    ) -> Self {
        Self {
            run_id: run_id.to_string(),
            document_id: document_id.to_string(),
            file_name: file_name.to_string(),
            phase,
            message: message.to_string(),
            timestamp: Utc::now(),
            draft_order_id: None,
            error: None,
        }
    }
}

/// Broadcasts run progress events for streaming.
#[derive(Clone)]
pub struct RunProgressBroadcaster {
    sender: Arc<broadcast::Sender<RunProgressEvent>>,
}

impl RunProgressBroadcaster {
    /// Creates a new broadcaster with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Publishes an event to every open receiver.
    pub fn send(&self, event: RunProgressEvent) {
        // A send with no subscribers is not an error
        let _ = self.sender.send(event);
    }

    /// Opens a new receiver on the progress channel.
    pub fn subscribe(&self) -> broadcast::Receiver<RunProgressEvent> {
        self.sender.subscribe()
    }

    /// Creates a tracker for one run and emits the initial queued event.
    pub fn start_run(&self, run_id: &str, document_id: &str, file_name: &str) -> RunProgressTracker {
        let tracker = RunProgressTracker {
            run_id: run_id.to_string(),
            document_id: document_id.to_string(),
            file_name: file_name.to_string(),
            sender: Arc::clone(&self.sender),
        };
        tracker.update_phase(RunPhase::Queued, "Document queued for processing");
        tracker
    }
}

impl Default for RunProgressBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Tracks progress for a single run.
pub struct RunProgressTracker {
    run_id: String,
    document_id: String,
    file_name: String,
    sender: Arc<broadcast::Sender<RunProgressEvent>>,
}

impl RunProgressTracker {
    /// Reports that the run entered a new phase.
    pub fn update_phase(&self, phase: RunPhase, message: &str) {
        let event = RunProgressEvent::new(
            &self.run_id,
            &self.document_id,
            &self.file_name,
            phase,
            message,
        );
        let _ = self.sender.send(event);
    }

    /// Marks the run as completed with the resulting draft order.
    pub fn completed(&self, draft_order_id: &str) {
        let mut event = RunProgressEvent::new(
            &self.run_id,
            &self.document_id,
            &self.file_name,
            RunPhase::Completed,
            "Processing completed successfully",
        );
        event.draft_order_id = Some(draft_order_id.to_string());
        let _ = self.sender.send(event);
    }

    /// Marks the run as failed with an error message.
    pub fn failed(&self, error: &str) {
        let mut event = RunProgressEvent::new(
            &self.run_id,
            &self.document_id,
            &self.file_name,
            RunPhase::Failed,
            "Processing failed",
        );
        event.error = Some(error.to_string());
        let _ = self.sender.send(event);
    }
}
