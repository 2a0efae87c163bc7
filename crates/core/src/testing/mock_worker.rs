//! Simulated CI worker for testing.
//!
//! Workers are external to the controller; this one follows the same store
//! contract: move a job from the queued to the running set when it starts,
//! clear the running marker and write a terminal status when it ends, and
//! write its log under `logs/{job_id}`.

use serde_json::{json, Value};
use std::sync::Arc;

use crate::clock::Clock;
use crate::model::{paths, JobRecord, JobStatus};
use crate::store::{decode, KeyFilter, Patch, StateStore, StoreError};

/// Drives job records the way a CI worker would.
pub struct MockWorker {
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
}

impl MockWorker {
    pub fn new(store: Arc<dyn StateStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    async fn load(&self, job_id: &str) -> Result<Option<JobRecord>, StoreError> {
        let path = paths::job(job_id);
        decode(&path, self.store.get(&path).await?)
    }

    /// Ids in the queued set.
    pub async fn queued_jobs(&self) -> Result<Vec<String>, StoreError> {
        self.index(paths::JOBS_QUEUED).await
    }

    /// Ids in the running set.
    pub async fn running_jobs(&self) -> Result<Vec<String>, StoreError> {
        self.index(paths::JOBS_RUNNING).await
    }

    async fn index(&self, collection: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .store
            .list(collection, &KeyFilter::new().shallow())
            .await?
            .into_iter()
            .map(|(id, _)| id)
            .collect())
    }

    /// Pick up a queued job. Returns false if the job is not QUEUED.
    pub async fn start(&self, job_id: &str) -> Result<bool, StoreError> {
        self.transition(job_id, JobStatus::Started).await
    }

    /// End a job with `status`. Returns false if the transition is illegal
    /// (for example the job was cancelled meanwhile).
    pub async fn finish(&self, job_id: &str, status: JobStatus) -> Result<bool, StoreError> {
        self.transition(job_id, status).await
    }

    /// Start and finish a job in one go.
    pub async fn run(&self, job_id: &str, status: JobStatus) -> Result<bool, StoreError> {
        Ok(self.start(job_id).await? && self.finish(job_id, status).await?)
    }

    /// Start and finish every queued job whose type is `job_type`.
    pub async fn run_all_of_type(
        &self,
        job_type: &str,
        status: JobStatus,
    ) -> Result<usize, StoreError> {
        let mut count = 0;
        for job_id in self.queued_jobs().await? {
            let Some(job) = self.load(&job_id).await? else {
                continue;
            };
            if job.job_type == job_type && self.run(&job_id, status).await? {
                count += 1;
            }
        }
        Ok(count)
    }

    pub async fn write_log(&self, job_id: &str, body: &str) -> Result<(), StoreError> {
        self.store
            .put(&paths::log(job_id), json!({ "body": body }))
            .await
    }

    async fn transition(&self, job_id: &str, next: JobStatus) -> Result<bool, StoreError> {
        let Some(job) = self.load(job_id).await? else {
            return Ok(false);
        };
        if !job.status.can_transition_to(next) {
            return Ok(false);
        }

        let now = serde_json::to_value(self.clock.now()).map_err(|e| {
            StoreError::Serialization {
                path: paths::job(job_id),
                message: e.to_string(),
            }
        })?;
        let status = Value::String(next.as_str().to_string());
        let patch = if next == JobStatus::Started {
            Patch::new()
                .delete(paths::queued_job(job_id))
                .set(paths::running_job(job_id), Value::Bool(true))
                .set(paths::job_field(job_id, "status"), status)
                .set(paths::job_field(job_id, "time_started"), now)
        } else {
            Patch::new()
                .delete(paths::queued_job(job_id))
                .delete(paths::running_job(job_id))
                .set(paths::job_field(job_id, "status"), status)
                .set(paths::job_field(job_id, "time_ended"), now)
        };
        self.store.patch("", &patch).await?;
        Ok(true)
    }
}
