//! Records persisted in the state store and the paths they live at.

mod change;
mod job;
pub mod paths;

pub use change::{BranchRecord, ChangeKey, ChangeRecord};
pub use job::{job_id, job_timestamp, split_job_id, JobRecord, JobStatus, JOB_ID_TIMESTAMP_FORMAT};
