//! Change controller.
//!
//! Stateless handlers that drive changes through their lifecycle:
//! - **Intake**: poll the review system, fan out one job per job type
//! - **Tracking**: supersede old patchsets, reap stuck jobs and old logs
//! - **Completion**: reconcile finished changes and post one aggregated vote
//!
//! Each handler is one [`Task`](crate::dispatch::Task) executed through
//! [`Controller::handle`]; the dispatcher provides retries.

mod config;
mod fanout;
mod handler;
mod poller;
mod postsubmit;
mod reaper;
mod reconcile;
mod runner;
mod supersede;
mod telemetry;
mod types;
mod vote;

pub use config::{
    CancelledVotePolicy, ControllerConfig, PostsubmitConfig, MAX_INTERVAL_SECS,
    MAX_LOG_RETENTION_DAYS, MAX_LOOKBACK_HOURS,
};
pub use handler::{Controller, ControllerDeps};
pub use runner::{ControllerRunner, RunnerStatus};
pub use types::{
    CancelOutcome, ControllerError, IntakeOutcome, PollOutcome, PostsubmitOutcome,
    ReconcileOutcome, VoteOutcome,
};
pub use vote::{JobLine, VoteSummary};
