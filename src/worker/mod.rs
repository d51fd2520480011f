pub mod job;
pub mod pool;

pub use job::{Job, JobResult};
pub use pool::{WorkerDeps, WorkerPool};
