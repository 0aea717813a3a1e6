mod job;
mod queue;

pub use job::{Job, JobPayload, JobStatus, Stage};
pub use queue::{JobStore, StoreError};
