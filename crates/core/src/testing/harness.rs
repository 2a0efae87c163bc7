//! Controller wired to in-memory collaborators.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use crate::config::Config;
use crate::controller::{Controller, ControllerDeps, ControllerError};
use crate::dispatch::Task;
use crate::model::{paths, BranchRecord, ChangeKey, ChangeRecord, JobRecord};
use crate::store::{decode, KeyFilter, MemoryStateStore, StateStore, StoreError};

use super::{ManualClock, MockMetricsSink, MockReviewClient, MockWorker, RecordingDispatcher};

/// Everything an end-to-end controller test needs.
///
/// ```rust,ignore
/// let h = TestHarness::new(fixtures::config());
/// h.review.add_change(fixtures::ready_change(1, 1, "rev1", "dev@example.com")).await;
/// h.run(Task::ScanChanges).await?;
/// ```
///
/// The store defaults to [`MemoryStateStore`]; [`TestHarness::with_store`]
/// runs the same scenarios on another backend.
pub struct TestHarness<S: StateStore + 'static = MemoryStateStore> {
    pub controller: Controller,
    pub store: Arc<S>,
    pub review: Arc<MockReviewClient>,
    pub dispatcher: Arc<RecordingDispatcher>,
    pub metrics: Arc<MockMetricsSink>,
    pub clock: Arc<ManualClock>,
    pub worker: MockWorker,
}

impl TestHarness {
    /// Build a harness over an empty in-memory store; the clock starts at
    /// [`start_time`].
    ///
    /// Panics if the config is rejected by the controller.
    pub fn new(config: Config) -> Self {
        Self::with_store(config, Arc::new(MemoryStateStore::new()))
    }
}

impl<S: StateStore + 'static> TestHarness<S> {
    /// Build a harness over `store`.
    ///
    /// Panics if the config is rejected by the controller.
    pub fn with_store(config: Config, store: Arc<S>) -> Self {
        let review = Arc::new(MockReviewClient::new());
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let metrics = Arc::new(MockMetricsSink::new());
        let clock = Arc::new(ManualClock::new(start_time()));

        let deps = ControllerDeps {
            store: store.clone(),
            review: review.clone(),
            dispatcher: dispatcher.clone(),
            metrics: metrics.clone(),
            clock: clock.clone(),
        };
        let controller = match Controller::new(&config, deps) {
            Ok(controller) => controller,
            Err(e) => panic!("test config rejected: {}", e),
        };
        let worker = MockWorker::new(store.clone(), clock.clone());

        Self {
            controller,
            store,
            review,
            dispatcher,
            metrics,
            clock,
            worker,
        }
    }

    /// Run one task and then everything it dispatches.
    pub async fn run(&self, task: Task) -> Result<usize, ControllerError> {
        self.controller.handle(task).await?;
        Ok(1 + self.dispatcher.pump(&self.controller).await?)
    }

    /// One full intake round: scan the review system, then sweep pending
    /// changes.
    pub async fn sweep(&self) -> Result<usize, ControllerError> {
        Ok(self.run(Task::ScanChanges).await? + self.run(Task::ScanPending).await?)
    }

    pub async fn change(&self, key: ChangeKey) -> Result<Option<ChangeRecord>, StoreError> {
        let path = paths::change(key);
        decode(&path, self.store.get(&path).await?)
    }

    pub async fn job(&self, job_id: &str) -> Result<Option<JobRecord>, StoreError> {
        let path = paths::job(job_id);
        decode(&path, self.store.get(&path).await?)
    }

    pub async fn branch_entries(&self) -> Result<Vec<(String, BranchRecord)>, StoreError> {
        self.store
            .list(paths::BRANCHES, &KeyFilter::new())
            .await?
            .into_iter()
            .map(|(key, value)| {
                let path = format!("{}/{}", paths::BRANCHES, key);
                let record = serde_json::from_value(value).map_err(|e| {
                    StoreError::Serialization {
                        path,
                        message: e.to_string(),
                    }
                })?;
                Ok((key, record))
            })
            .collect()
    }

    /// Keys of changes still awaiting reconciliation.
    pub async fn pending_changes(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .store
            .list(paths::PENDING_CHANGES, &KeyFilter::new().shallow())
            .await?
            .into_iter()
            .map(|(key, _)| key)
            .collect())
    }

    /// Job ids of a change, in fan-out order.
    pub async fn job_ids(&self, key: ChangeKey) -> Result<Vec<String>, StoreError> {
        Ok(self
            .change(key)
            .await?
            .map(|record| record.jobs.into_keys().collect())
            .unwrap_or_default())
    }
}

/// Fixed instant every harness clock starts at.
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 30, 0)
        .single()
        .unwrap_or_else(Utc::now)
}
