//! Types for the controller.

use serde::Serialize;
use thiserror::Error;

use crate::dispatch::DispatchError;
use crate::review::ReviewError;
use crate::store::StoreError;

/// Errors that can occur while handling a task.
///
/// Any error fails the invocation; the dispatcher retries it from scratch.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// State store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Review system error.
    #[error("review system error: {0}")]
    Review(#[from] ReviewError),

    /// Dispatcher error.
    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// Invalid controller configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Unparsable identifier, revision or date.
    #[error("invalid data: {0}")]
    InvalidData(String),
}

/// Result of a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollOutcome {
    /// The previous poll was too recent.
    Skipped,
    /// The sweep tasks and the next poll were dispatched.
    Dispatched,
}

/// Result of taking in a change revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntakeOutcome {
    /// The change was fanned out with this many jobs.
    Created { jobs: usize },
    /// The change already existed and now wants a vote.
    VoteRequested,
    /// The change already existed; nothing to do.
    AlreadyQueued,
}

/// Result of reconciling a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// No change record at that key.
    Missing,
    /// Jobs are still queued or running.
    Pending,
    /// The change exceeded its timeout; its pending jobs were sent to cancel.
    TimedOut { cancelled: usize },
    /// All jobs are terminal. `first` is set when this call ended the change.
    Finalized { first: bool },
}

/// Result of a vote attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteOutcome {
    /// No change record at that key.
    Missing,
    /// A review was already posted.
    AlreadyVoted,
    /// The change does not want a vote, or voting is disabled.
    NotWanted,
    /// A review was posted, with the score if one was given.
    Posted { score: Option<i32> },
}

/// Result of cancelling a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    /// The job was queued or started and is now cancelled.
    Cancelled,
    /// The job had already ended; only its index markers were cleared.
    AlreadyTerminal,
    /// No job record; only its index markers were cleared.
    Missing,
}

/// Result of queueing a postsubmit run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PostsubmitOutcome {
    /// The branch head was resolved and the task re-dispatched with it.
    Resolved { revision: String },
    /// The branch entry was fanned out with this many jobs.
    Created { key: String, jobs: usize },
    /// An entry for that commit already exists.
    AlreadyQueued { key: String },
}
