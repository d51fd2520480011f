use crate::broadcast::{RunPhase, RunProgressTracker};

/// Events emitted by the pipeline during processing. The document text is
/// never broadcast (can be large).
pub enum ProgressEvent {
    Phase { phase: RunPhase, message: String },
    Completed { draft_order_id: String },
    Failed { error: String },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Bridges pipeline events onto the run progress broadcast channel.
pub struct BroadcastProgress {
    tracker: RunProgressTracker,
}

impl BroadcastProgress {
    pub fn new(tracker: RunProgressTracker) -> Self {
        Self { tracker }
    }
}

impl ProgressReporter for BroadcastProgress {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Phase { phase, message } => {
                self.tracker.update_phase(phase, &message);
            }
            ProgressEvent::Completed { draft_order_id } => {
                self.tracker.completed(&draft_order_id);
            }
            ProgressEvent::Failed { error } => {
                self.tracker.failed(&error);
            }
        }
    }
}
