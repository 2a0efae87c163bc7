//! Task vocabulary and dispatcher contracts.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ChangeKey;

/// Errors that can occur while enqueueing a task.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Dispatcher closed")]
    Closed,

    #[error("Queue full")]
    QueueFull,

    #[error("Failed to enqueue task: {0}")]
    EnqueueFailed(String),
}

/// Parameters of a change revision to take in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntakeRequest {
    pub change: u64,
    pub patchset: u32,
    /// Review-system change id, used when posting the vote.
    pub change_id: String,
    /// Revision (commit) hash.
    pub revision: String,
    #[serde(rename = "ref")]
    pub ref_name: String,
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(default)]
    pub wants_vote: bool,
}

impl IntakeRequest {
    pub fn key(&self) -> ChangeKey {
        ChangeKey::new(self.change, self.patchset)
    }
}

/// A named controller action with its parameters.
///
/// Serialized with an `action` tag, e.g.
/// `{"action": "reconcile", "change": 100, "patchset": 2}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Task {
    Poll,
    ScanChanges,
    ScanPending,
    EmitQueueMetrics,
    Intake(IntakeRequest),
    Supersede { change: u64, patchset: u32 },
    Reconcile { change: u64, patchset: u32 },
    Vote { change: u64, patchset: u32 },
    EmitChangeMetrics { change: u64, patchset: u32 },
    EmitJobMetrics { job_id: String },
    QueuePostsubmit {
        branch: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        revision: Option<String>,
    },
    ReapStuckJobs,
    Cancel { job_id: String },
    ReapExpiredLogs,
    DeleteLog { job_id: String },
}

impl Task {
    pub fn supersede(key: ChangeKey) -> Self {
        Self::Supersede {
            change: key.change,
            patchset: key.patchset,
        }
    }

    pub fn reconcile(key: ChangeKey) -> Self {
        Self::Reconcile {
            change: key.change,
            patchset: key.patchset,
        }
    }

    pub fn vote(key: ChangeKey) -> Self {
        Self::Vote {
            change: key.change,
            patchset: key.patchset,
        }
    }

    pub fn emit_change_metrics(key: ChangeKey) -> Self {
        Self::EmitChangeMetrics {
            change: key.change,
            patchset: key.patchset,
        }
    }

    pub fn cancel(job_id: impl Into<String>) -> Self {
        Self::Cancel {
            job_id: job_id.into(),
        }
    }

    /// Whether the dispatcher must keep retrying this task instead of
    /// dropping it after `max_attempts`.
    ///
    /// Sweeps re-dispatch everything else, but a finished change is only
    /// voted on through these.
    pub fn is_durable(&self) -> bool {
        matches!(self, Self::Reconcile { .. } | Self::Vote { .. })
    }

    /// Action name, as used in the `action` tag and in metric labels.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Poll => "poll",
            Self::ScanChanges => "scan_changes",
            Self::ScanPending => "scan_pending",
            Self::EmitQueueMetrics => "emit_queue_metrics",
            Self::Intake(_) => "intake",
            Self::Supersede { .. } => "supersede",
            Self::Reconcile { .. } => "reconcile",
            Self::Vote { .. } => "vote",
            Self::EmitChangeMetrics { .. } => "emit_change_metrics",
            Self::EmitJobMetrics { .. } => "emit_job_metrics",
            Self::QueuePostsubmit { .. } => "queue_postsubmit",
            Self::ReapStuckJobs => "reap_stuck_jobs",
            Self::Cancel { .. } => "cancel",
            Self::ReapExpiredLogs => "reap_expired_logs",
            Self::DeleteLog { .. } => "delete_log",
        }
    }
}

/// A task as carried through a queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEnvelope {
    /// Queue message id.
    pub id: String,
    pub task: Task,
    /// Attempt number (1-indexed).
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl TaskEnvelope {
    pub fn new(task: Task) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            task,
            attempt: 1,
            enqueued_at: Utc::now(),
        }
    }
}

/// Options for task enqueueing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnqueueOptions {
    /// Delay before the task becomes runnable.
    pub delay: Option<Duration>,
}

impl EnqueueOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the delay before the task becomes runnable.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Retry settings for an in-process dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Attempts per task before it is dropped (including the first).
    /// Durable tasks retry at the capped backoff regardless.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    /// Capacity of the queue channel.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_backoff() -> u64 {
    1000
}

fn default_max_backoff() -> u64 {
    60_000
}

fn default_buffer_size() -> usize {
    1024
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            buffer_size: default_buffer_size(),
        }
    }
}

impl DispatcherConfig {
    /// Delay before retrying after `attempt` failed: exponential, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let millis = self
            .initial_backoff_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }
}

/// Enqueues tasks for asynchronous, at-least-once execution.
///
/// Implementations retry failed tasks with backoff; handlers must therefore
/// be idempotent.
#[async_trait]
pub trait TaskDispatcher: Send + Sync {
    async fn enqueue(&self, task: Task, options: EnqueueOptions) -> Result<(), DispatchError>;
}

/// Executes one task. An error asks the dispatcher to retry.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: Task) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_wire_format() {
        let task = Task::reconcile(ChangeKey::new(100, 2));
        assert_eq!(
            serde_json::to_value(&task).unwrap(),
            json!({"action": "reconcile", "change": 100, "patchset": 2})
        );

        let parsed: Task = serde_json::from_value(json!({"action": "poll"})).unwrap();
        assert_eq!(parsed, Task::Poll);
    }

    #[test]
    fn test_intake_wire_format() {
        let parsed: Task = serde_json::from_value(json!({
            "action": "intake",
            "change": 7,
            "patchset": 1,
            "change_id": "proj~main~I7",
            "revision": "abc",
            "ref": "refs/changes/07/7/1",
        }))
        .unwrap();
        let Task::Intake(request) = parsed else {
            panic!("expected intake");
        };
        assert_eq!(request.key(), ChangeKey::new(7, 1));
        assert!(!request.wants_vote);
        assert_eq!(request.uploader, None);
    }

    #[test]
    fn test_postsubmit_revision_optional() {
        let parsed: Task =
            serde_json::from_value(json!({"action": "queue_postsubmit", "branch": "main"}))
                .unwrap();
        assert_eq!(
            parsed,
            Task::QueuePostsubmit {
                branch: "main".to_string(),
                revision: None
            }
        );
        assert_eq!(parsed.name(), "queue_postsubmit");
    }

    #[test]
    fn test_only_vote_path_is_durable() {
        let key = ChangeKey::new(1, 1);
        assert!(Task::vote(key).is_durable());
        assert!(Task::reconcile(key).is_durable());
        assert!(!Task::ScanPending.is_durable());
        assert!(!Task::cancel("job").is_durable());
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let config = DispatcherConfig {
            max_attempts: 10,
            initial_backoff_ms: 100,
            max_backoff_ms: 1000,
            buffer_size: 8,
        };
        assert_eq!(config.backoff(1), Duration::from_millis(100));
        assert_eq!(config.backoff(2), Duration::from_millis(200));
        assert_eq!(config.backoff(4), Duration::from_millis(800));
        assert_eq!(config.backoff(5), Duration::from_millis(1000));
        assert_eq!(config.backoff(60), Duration::from_millis(1000));
    }
}
