//! Job fan-out: atomic creation of a change record and its job set.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::info;

use crate::dispatch::{IntakeRequest, Task};
use crate::metrics::FANOUTS_TOTAL;
use crate::model::{job_id, paths, ChangeRecord, JobRecord};
use crate::store::Patch;

use super::handler::Controller;
use super::types::{ControllerError, IntakeOutcome};

impl Controller {
    /// Take in one change revision.
    ///
    /// Creates the change and its jobs at most once. A later intake of the
    /// same revision can only turn `wants_vote` on.
    pub async fn intake(&self, request: IntakeRequest) -> Result<IntakeOutcome, ControllerError> {
        let key = request.key();
        let path = paths::change(key);

        if let Some(existing) = self.read::<ChangeRecord>(&path).await? {
            if request.wants_vote && !existing.wants_vote {
                self.store
                    .put(&paths::change_field(key, "wants_vote"), Value::Bool(true))
                    .await?;
                info!(change = %key, "Change now wants a vote");
                // The record read above may predate a concurrent finalization,
                // so reconcile decides whether the vote is due.
                self.dispatch(Task::reconcile(key)).await?;
                return Ok(IntakeOutcome::VoteRequested);
            }
            return Ok(IntakeOutcome::AlreadyQueued);
        }

        self.dispatch(Task::supersede(key)).await?;

        let now = self.clock.now();
        let jobs = self.new_jobs(&path, now);
        let record = ChangeRecord {
            change_id: request.change_id,
            revision_id: request.revision,
            time_queued: now,
            time_ended: None,
            wants_vote: request.wants_vote,
            voted: None,
            jobs: jobs.keys().map(|id| (id.clone(), 0)).collect(),
        };

        let patch = Patch::new()
            .set(paths::pending_change(key), Value::Bool(true))
            .set_json(&path, &record)?;
        let patch = with_jobs(patch, &jobs)?;
        self.store.patch("", &patch).await?;

        FANOUTS_TOTAL.with_label_values(&["presubmit"]).inc();
        info!(
            change = %key,
            revision = %record.revision_id,
            jobs = jobs.len(),
            wants_vote = record.wants_vote,
            "Fanned out change"
        );
        Ok(IntakeOutcome::Created { jobs: jobs.len() })
    }

    /// One queued job per job table entry, all sharing the fan-out instant.
    pub(super) fn new_jobs(&self, src: &str, at: DateTime<Utc>) -> BTreeMap<String, JobRecord> {
        self.jobs
            .iter()
            .map(|job| {
                (
                    job_id(at, src, &job.name),
                    JobRecord::queued(src, &job.name, job.env.clone(), at),
                )
            })
            .collect()
    }
}

/// Add job records and their queued markers to a fan-out patch.
pub(super) fn with_jobs(
    mut patch: Patch,
    jobs: &BTreeMap<String, JobRecord>,
) -> Result<Patch, ControllerError> {
    for (id, job) in jobs {
        patch = patch
            .set_json(paths::job(id), job)?
            .set(paths::queued_job(id), Value::Bool(true));
    }
    Ok(patch)
}
