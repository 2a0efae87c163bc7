//! The controller and its task entry point.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex_lite::Regex;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::config::{Config, JobConfig};
use crate::dispatch::{EnqueueOptions, Task, TaskDispatcher, TaskHandler};
use crate::metrics::{MetricPoint, MetricsSink};
use crate::model::ChangeKey;
use crate::review::ReviewClient;
use crate::store::{decode, StateStore};

use super::config::ControllerConfig;
use super::types::ControllerError;

/// Collaborators the controller runs against.
#[derive(Clone)]
pub struct ControllerDeps {
    pub store: Arc<dyn StateStore>,
    pub review: Arc<dyn ReviewClient>,
    pub dispatcher: Arc<dyn TaskDispatcher>,
    pub metrics: Arc<dyn MetricsSink>,
    pub clock: Arc<dyn Clock>,
}

/// Stateless task handlers over the shared store.
///
/// Every handler reads the state it needs, applies guard clauses, and then
/// performs at most one multi-key patch plus a set of dispatches. Any
/// handler may run more than once or concurrently with itself.
pub struct Controller {
    pub(super) config: ControllerConfig,
    pub(super) project: String,
    pub(super) branch: String,
    pub(super) jobs: Vec<JobConfig>,
    pub(super) trusted: Regex,
    pub(super) store: Arc<dyn StateStore>,
    pub(super) review: Arc<dyn ReviewClient>,
    pub(super) dispatcher: Arc<dyn TaskDispatcher>,
    pub(super) metrics: Arc<dyn MetricsSink>,
    pub(super) clock: Arc<dyn Clock>,
    /// In-process de-dup of polls; lost on restart.
    pub(super) last_poll: Mutex<Option<DateTime<Utc>>>,
}

impl Controller {
    pub fn new(config: &Config, deps: ControllerDeps) -> Result<Self, ControllerError> {
        config
            .controller
            .check_bounds()
            .map_err(ControllerError::Config)?;
        let trusted = Regex::new(&config.controller.trusted_accounts).map_err(|e| {
            ControllerError::Config(format!("trusted_accounts is not a valid regex: {}", e))
        })?;
        Ok(Self {
            config: config.controller.clone(),
            project: config.review.project.clone(),
            branch: config.review.branch.clone(),
            jobs: config.jobs.clone(),
            trusted,
            store: deps.store,
            review: deps.review,
            dispatcher: deps.dispatcher,
            metrics: deps.metrics,
            clock: deps.clock,
            last_poll: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn jobs(&self) -> &[JobConfig] {
        &self.jobs
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    /// Execute one task.
    pub async fn handle(&self, task: Task) -> Result<(), ControllerError> {
        debug!(action = task.name(), "Handling task");
        match task {
            Task::Poll => self.poll().await.map(drop),
            Task::ScanChanges => self.scan_changes().await.map(drop),
            Task::ScanPending => self.scan_pending().await.map(drop),
            Task::EmitQueueMetrics => self.emit_queue_metrics().await,
            Task::Intake(request) => self.intake(request).await.map(drop),
            Task::Supersede { change, patchset } => {
                self.supersede(key(change, patchset)).await.map(drop)
            }
            Task::Reconcile { change, patchset } => {
                self.reconcile(key(change, patchset)).await.map(drop)
            }
            Task::Vote { change, patchset } => self.vote(key(change, patchset)).await.map(drop),
            Task::EmitChangeMetrics { change, patchset } => {
                self.emit_change_metrics(key(change, patchset)).await
            }
            Task::EmitJobMetrics { job_id } => self.emit_job_metrics(&job_id).await,
            Task::QueuePostsubmit { branch, revision } => self
                .queue_postsubmit(&branch, revision.as_deref())
                .await
                .map(drop),
            Task::ReapStuckJobs => self.reap_stuck_jobs().await.map(drop),
            Task::Cancel { job_id } => self.cancel(&job_id).await.map(drop),
            Task::ReapExpiredLogs => self.reap_expired_logs().await.map(drop),
            Task::DeleteLog { job_id } => self.delete_log(&job_id).await,
        }
    }

    pub(super) fn is_trusted(&self, identity: Option<&str>) -> bool {
        identity.is_some_and(|id| self.trusted.is_match(id))
    }

    pub(super) async fn read<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Option<T>, ControllerError> {
        Ok(decode(path, self.store.get(path).await?)?)
    }

    pub(super) async fn dispatch(&self, task: Task) -> Result<(), ControllerError> {
        self.dispatcher.enqueue(task, EnqueueOptions::new()).await?;
        Ok(())
    }

    pub(super) async fn dispatch_all(
        &self,
        tasks: impl IntoIterator<Item = Task>,
    ) -> Result<usize, ControllerError> {
        let mut count = 0;
        for task in tasks {
            self.dispatch(task).await?;
            count += 1;
        }
        Ok(count)
    }

    /// Emit a point; failures are logged and swallowed.
    pub(super) async fn emit(&self, point: MetricPoint) {
        let name = point.name.clone();
        if let Err(e) = self.metrics.emit(point).await {
            warn!(metric = %name, error = %e, "Failed to emit metric");
        }
    }
}

fn key(change: u64, patchset: u32) -> ChangeKey {
    ChangeKey::new(change, patchset)
}

#[async_trait]
impl TaskHandler for Controller {
    async fn handle(&self, task: Task) -> anyhow::Result<()> {
        let action = task.name();
        Controller::handle(self, task)
            .await
            .map_err(|e| anyhow::Error::new(e).context(format!("{} failed", action)))
    }
}
