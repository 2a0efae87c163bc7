//! Pending-change reconciliation.

use serde_json::Value;
use tracing::{info, warn};

use crate::dispatch::Task;
use crate::model::{paths, ChangeKey, ChangeRecord, JobRecord};
use crate::store::{KeyFilter, Patch};

use super::handler::Controller;
use super::types::{ControllerError, ReconcileOutcome};

impl Controller {
    /// Dispatch `reconcile` for every change in the pending index.
    pub async fn scan_pending(&self) -> Result<usize, ControllerError> {
        let entries = self
            .store
            .list(paths::PENDING_CHANGES, &KeyFilter::new().shallow())
            .await?;

        let mut tasks = Vec::with_capacity(entries.len());
        for (entry, _) in entries {
            match ChangeKey::parse(&entry) {
                Some(key) => tasks.push(Task::reconcile(key)),
                None => warn!(entry = %entry, "Ignoring malformed pending entry"),
            }
        }
        self.dispatch_all(tasks).await
    }

    /// Finalize a change once all its jobs are terminal, or cancel its
    /// pending jobs once it is older than the change timeout.
    ///
    /// A finished change that still owes a vote stays in the pending index
    /// and gets `vote` dispatched on every sweep until the vote clears it.
    pub async fn reconcile(&self, key: ChangeKey) -> Result<ReconcileOutcome, ControllerError> {
        let Some(record) = self.read::<ChangeRecord>(&paths::change(key)).await? else {
            warn!(change = %key, "Reconcile for unknown change");
            return Ok(ReconcileOutcome::Missing);
        };

        let jobs = self.load_jobs(record.job_ids()).await?;
        let pending: Vec<&str> = jobs
            .iter()
            .filter(|(_, job)| job.as_ref().is_some_and(|job| job.status.is_pending()))
            .map(|(id, _)| id.as_str())
            .collect();

        let now = self.clock.now();
        if !pending.is_empty() {
            if now - record.time_queued > self.config.change_timeout() {
                warn!(
                    change = %key,
                    pending = pending.len(),
                    "Change timed out, cancelling pending jobs"
                );
                let cancels: Vec<Task> = pending.into_iter().map(|id| Task::cancel(id)).collect();
                let cancelled = self.dispatch_all(cancels).await?;
                return Ok(ReconcileOutcome::TimedOut { cancelled });
            }
            return Ok(ReconcileOutcome::Pending);
        }

        // The pending marker outlives finalization until the vote lands, so
        // every sweep re-dispatches a vote that failed or was lost.
        let first = record.time_ended.is_none();
        let owes_vote = self.owes_vote(&record);
        let mut patch = if owes_vote {
            Patch::new().set(paths::pending_change(key), Value::Bool(true))
        } else {
            Patch::new().delete(paths::pending_change(key))
        };
        if first {
            patch = patch.set_json(paths::change_field(key, "time_ended"), &now)?;
        }
        self.store.patch("", &patch).await?;

        if first {
            info!(change = %key, jobs = jobs.len(), "Change finished");
            let mut tasks = vec![Task::emit_change_metrics(key)];
            tasks.extend(jobs.iter().map(|(id, _)| Task::EmitJobMetrics {
                job_id: id.clone(),
            }));
            self.dispatch_all(tasks).await?;
        }
        if owes_vote {
            self.dispatch(Task::vote(key)).await?;
        }
        Ok(ReconcileOutcome::Finalized { first })
    }

    /// Whether a finished change still needs a review posted.
    pub(super) fn owes_vote(&self, record: &ChangeRecord) -> bool {
        record.wants_vote && !record.is_voted() && self.config.voting_enabled
    }

    /// Load job records by id. A missing record is `None`.
    pub(super) async fn load_jobs<'a>(
        &self,
        ids: impl Iterator<Item = &'a str>,
    ) -> Result<Vec<(String, Option<JobRecord>)>, ControllerError> {
        let ids: Vec<&str> = ids.collect();
        let mut jobs = Vec::with_capacity(ids.len());
        for id in ids {
            let job = self.read::<JobRecord>(&paths::job(id)).await?;
            if job.is_none() {
                warn!(job_id = %id, "Job record missing");
            }
            jobs.push((id.to_string(), job));
        }
        Ok(jobs)
    }
}
