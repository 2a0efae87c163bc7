//! Store layout.

use chrono::{DateTime, Utc};

use super::change::ChangeKey;
use super::job::job_timestamp;

pub const CHANGES: &str = "cls";
pub const PENDING_CHANGES: &str = "cls_pending";
pub const JOBS: &str = "jobs";
pub const JOBS_QUEUED: &str = "jobs_queued";
pub const JOBS_RUNNING: &str = "jobs_running";
pub const BRANCHES: &str = "branches";
pub const LOGS: &str = "logs";

pub fn change(key: ChangeKey) -> String {
    format!("{}/{}", CHANGES, key)
}

pub fn change_field(key: ChangeKey, field: &str) -> String {
    format!("{}/{}/{}", CHANGES, key, field)
}

pub fn pending_change(key: ChangeKey) -> String {
    format!("{}/{}", PENDING_CHANGES, key)
}

pub fn job(job_id: &str) -> String {
    format!("{}/{}", JOBS, job_id)
}

pub fn job_field(job_id: &str, field: &str) -> String {
    format!("{}/{}/{}", JOBS, job_id, field)
}

pub fn queued_job(job_id: &str) -> String {
    format!("{}/{}", JOBS_QUEUED, job_id)
}

pub fn running_job(job_id: &str) -> String {
    format!("{}/{}", JOBS_RUNNING, job_id)
}

pub fn log(job_id: &str) -> String {
    format!("{}/{}", LOGS, job_id)
}

/// Store key of a postsubmit entry, without the collection prefix.
pub fn branch_key(branch: &str, commit_time: DateTime<Utc>) -> String {
    format!("{}-{}", branch.replace('/', "_"), job_timestamp(commit_time))
}

pub fn branch(branch: &str, commit_time: DateTime<Utc>) -> String {
    format!("{}/{}", BRANCHES, branch_key(branch, commit_time))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_change_paths() {
        let key = ChangeKey::new(42, 7);
        assert_eq!(change(key), "cls/42-7");
        assert_eq!(change_field(key, "voted"), "cls/42-7/voted");
        assert_eq!(pending_change(key), "cls_pending/42-7");
    }

    #[test]
    fn test_branch_path_escapes_slashes() {
        let at = Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(
            branch("release/v2", at),
            "branches/release_v2-2026-05-01-120000-000"
        );
    }
}
