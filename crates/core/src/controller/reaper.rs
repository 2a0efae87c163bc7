//! Reapers: stuck jobs, cancellation and expired logs.

use tracing::{debug, info};

use crate::dispatch::Task;
use crate::metrics::JOBS_CANCELLED_TOTAL;
use crate::model::{job_timestamp, paths, JobRecord, JobStatus};
use crate::store::{KeyFilter, Patch};

use super::handler::Controller;
use super::types::{CancelOutcome, ControllerError};

impl Controller {
    /// Dispatch `cancel` for running jobs started more than twice the job
    /// timeout ago. Running-index entries whose job already ended (or is
    /// gone) are cancelled too, which only clears the stale marker.
    pub async fn reap_stuck_jobs(&self) -> Result<usize, ControllerError> {
        let entries = self
            .store
            .list(paths::JOBS_RUNNING, &KeyFilter::new().shallow())
            .await?;

        let now = self.clock.now();
        let limit = self.config.job_timeout() * 2;
        let mut cancels = Vec::new();
        for (job_id, _) in entries {
            let job = self.read::<JobRecord>(&paths::job(&job_id)).await?;
            let reap = match &job {
                Some(job) if job.status.is_pending() => job
                    .time_started
                    .is_some_and(|started| now - started > limit),
                _ => true,
            };
            if reap {
                debug!(job_id = %job_id, "Reaping running job");
                cancels.push(Task::cancel(job_id));
            }
        }

        if !cancels.is_empty() {
            info!(count = cancels.len(), "Reaping stuck jobs");
        }
        self.dispatch_all(cancels).await
    }

    /// Remove a job from both index sets and, if it has not ended, mark it
    /// cancelled. One patch.
    ///
    /// A worker finishing the job concurrently may win or lose; either way
    /// the job ends up in exactly one terminal status.
    pub async fn cancel(&self, job_id: &str) -> Result<CancelOutcome, ControllerError> {
        let job = self.read::<JobRecord>(&paths::job(job_id)).await?;

        let mut patch = Patch::new()
            .delete(paths::queued_job(job_id))
            .delete(paths::running_job(job_id));
        let outcome = match &job {
            Some(job) if job.status.is_pending() => {
                patch = patch
                    .set_json(paths::job_field(job_id, "status"), &JobStatus::Cancelled)?
                    .set_json(paths::job_field(job_id, "time_ended"), &self.clock.now())?;
                CancelOutcome::Cancelled
            }
            Some(_) => CancelOutcome::AlreadyTerminal,
            None => CancelOutcome::Missing,
        };
        self.store.patch("", &patch).await?;

        if let (CancelOutcome::Cancelled, Some(job)) = (outcome, &job) {
            JOBS_CANCELLED_TOTAL
                .with_label_values(&[job.job_type.as_str()])
                .inc();
            info!(job_id, from = %job.status, "Cancelled job");
        }
        Ok(outcome)
    }

    /// Dispatch `delete_log` for logs older than the retention window.
    ///
    /// Log keys are job ids, whose timestamp prefix sorts chronologically,
    /// so the cutoff is a plain key range.
    pub async fn reap_expired_logs(&self) -> Result<usize, ControllerError> {
        let cutoff = job_timestamp(self.clock.now() - self.config.log_retention());
        let entries = self
            .store
            .list(
                paths::LOGS,
                &KeyFilter::new().shallow().with_end_before(cutoff.clone()),
            )
            .await?;

        if !entries.is_empty() {
            info!(count = entries.len(), cutoff = %cutoff, "Reaping expired logs");
        }
        self.dispatch_all(
            entries
                .into_iter()
                .map(|(job_id, _)| Task::DeleteLog { job_id }),
        )
        .await
    }

    pub async fn delete_log(&self, job_id: &str) -> Result<(), ControllerError> {
        self.store.delete(&paths::log(job_id)).await?;
        debug!(job_id, "Deleted log");
        Ok(())
    }
}
