//! Tracing subscriber setup.
//!
//! Installs an env-filtered fmt subscriber and bridges `log` records
//! (emitted by the db/worker/intake layers) into tracing. Safe to call
//! more than once; later calls are no-ops.

use tracing_subscriber::EnvFilter;

/// Initializes logging for binaries and integration tests.
///
/// Honors `RUST_LOG`; defaults to `info` when unset.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_log::LogTracer::init();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
