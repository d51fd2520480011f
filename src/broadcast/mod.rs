//! Run progress broadcaster for real-time processing status streaming.

pub mod run_progress;

pub use run_progress::{RunPhase, RunProgressBroadcaster, RunProgressEvent, RunProgressTracker};
