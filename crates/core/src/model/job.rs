//! Job records and job ids.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Format of the timestamp prefix of a job id.
///
/// Fixed width and most-significant-first, so lexicographic order of ids is
/// chronological order of fan-out.
pub const JOB_ID_TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H%M%S-%3f";

/// Separator between the parts of a job id.
const JOB_ID_SEPARATOR: &str = "--";

/// Lifecycle status of a job.
///
/// Workers drive `Queued -> Started -> {Completed, Failed}`. The controller
/// only ever writes `Cancelled`, and only from `Queued` or `Started`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    Started,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Returns the string representation used in the store and in comments.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "QUEUED",
            JobStatus::Started => "STARTED",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
        }
    }

    /// Whether the job is still blocking reconciliation.
    pub fn is_pending(&self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Started)
    }

    /// Whether the job will not transition any further.
    pub fn is_terminal(&self) -> bool {
        !self.is_pending()
    }

    /// Whether `next` is a legal forward transition from this status.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Queued, JobStatus::Started) => true,
            (JobStatus::Queued | JobStatus::Started, JobStatus::Completed | JobStatus::Failed) => {
                true
            }
            (JobStatus::Queued | JobStatus::Started, JobStatus::Cancelled) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single CI job, stored at `jobs/{job_id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Store path of the change or branch entry that owns this job.
    pub src: String,
    /// Job type, a key of the job table.
    #[serde(rename = "type")]
    pub job_type: String,
    /// Environment handed to the worker.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    pub status: JobStatus,
    pub time_queued: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_started: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_ended: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Create a freshly queued job.
    pub fn queued(
        src: impl Into<String>,
        job_type: impl Into<String>,
        env: BTreeMap<String, String>,
        time_queued: DateTime<Utc>,
    ) -> Self {
        Self {
            src: src.into(),
            job_type: job_type.into(),
            env,
            status: JobStatus::Queued,
            time_queued,
            time_started: None,
            time_ended: None,
        }
    }
}

/// Format the timestamp prefix used by job ids (and log keys).
pub fn job_timestamp(at: DateTime<Utc>) -> String {
    at.format(JOB_ID_TIMESTAMP_FORMAT).to_string()
}

/// Build a job id: `{timestamp}--{src with '/' replaced}--{job_type}`.
pub fn job_id(at: DateTime<Utc>, src: &str, job_type: &str) -> String {
    format!(
        "{}{sep}{}{sep}{}",
        job_timestamp(at),
        src.replace('/', "_"),
        job_type,
        sep = JOB_ID_SEPARATOR
    )
}

/// Split a job id back into `(timestamp, src_key, job_type)`.
///
/// The job type is the last segment so job type names may not contain the
/// separator; config validation enforces that.
pub fn split_job_id(id: &str) -> Option<(&str, &str, &str)> {
    let (timestamp, rest) = id.split_once(JOB_ID_SEPARATOR)?;
    let (src, job_type) = rest.rsplit_once(JOB_ID_SEPARATOR)?;
    if timestamp.is_empty() || src.is_empty() || job_type.is_empty() {
        return None;
    }
    Some((timestamp, src, job_type))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Cancelled).unwrap(),
            "\"CANCELLED\""
        );
        let parsed: JobStatus = serde_json::from_str("\"STARTED\"").unwrap();
        assert_eq!(parsed, JobStatus::Started);
    }

    #[test]
    fn test_transitions_only_move_forward() {
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Started));
        assert!(JobStatus::Started.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Started.can_transition_to(JobStatus::Cancelled));
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Cancelled));

        assert!(!JobStatus::Started.can_transition_to(JobStatus::Queued));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Cancelled));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Cancelled.can_transition_to(JobStatus::Started));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(JobStatus::Queued.is_pending());
        assert!(JobStatus::Started.is_pending());
    }

    #[test]
    fn test_job_id_format() {
        let at = Utc.with_ymd_and_hms(2026, 3, 7, 9, 5, 2).unwrap();
        let id = job_id(at, "cls/100-1", "linux-x64");
        assert_eq!(id, "2026-03-07-090502-000--cls_100-1--linux-x64");

        let (ts, src, job_type) = split_job_id(&id).unwrap();
        assert_eq!(ts, "2026-03-07-090502-000");
        assert_eq!(src, "cls_100-1");
        assert_eq!(job_type, "linux-x64");
    }

    #[test]
    fn test_job_ids_sort_chronologically() {
        let earlier = Utc.with_ymd_and_hms(2026, 9, 30, 23, 59, 59).unwrap();
        let later = Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap();
        assert!(job_id(earlier, "cls/9-9", "z") < job_id(later, "cls/1-1", "a"));
    }

    #[test]
    fn test_job_record_type_field_name() {
        let at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let record = JobRecord::queued("cls/1-1", "lint", BTreeMap::new(), at);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["type"], "lint");
        assert_eq!(value["status"], "QUEUED");
        assert!(value.get("time_started").is_none());
    }
}
