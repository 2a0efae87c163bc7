//! In-process dispatcher backed by a tokio channel.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use super::types::{
    DispatchError, DispatcherConfig, EnqueueOptions, Task, TaskDispatcher, TaskEnvelope,
    TaskHandler,
};
use crate::metrics;

/// Handle for enqueueing tasks onto the local queue.
///
/// Cheaply cloneable. Delayed tasks are held by a timer task and pushed
/// onto the channel when due.
#[derive(Clone)]
pub struct LocalDispatcher {
    tx: mpsc::Sender<TaskEnvelope>,
}

impl LocalDispatcher {
    pub fn new(tx: mpsc::Sender<TaskEnvelope>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl TaskDispatcher for LocalDispatcher {
    async fn enqueue(&self, task: Task, options: EnqueueOptions) -> Result<(), DispatchError> {
        if self.tx.is_closed() {
            return Err(DispatchError::Closed);
        }
        let envelope = TaskEnvelope::new(task);
        debug!(
            id = %envelope.id,
            action = envelope.task.name(),
            delay = ?options.delay,
            "Enqueueing task"
        );

        match options.delay {
            Some(delay) => {
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if tx.send(envelope).await.is_err() {
                        debug!("Dispatcher closed before delayed task was due");
                    }
                });
                Ok(())
            }
            None => self.tx.try_send(envelope).map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => DispatchError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => DispatchError::Closed,
            }),
        }
    }
}

/// Background task that receives tasks and runs them against a handler.
///
/// Every task runs on its own tokio task; failures are retried with
/// exponential backoff until `max_attempts` is reached. Durable tasks are
/// retried until they succeed.
pub struct DispatchWorker {
    rx: mpsc::Receiver<TaskEnvelope>,
    config: DispatcherConfig,
}

impl DispatchWorker {
    pub fn new(rx: mpsc::Receiver<TaskEnvelope>, config: DispatcherConfig) -> Self {
        Self { rx, config }
    }

    /// Run the worker until the channel is closed or shutdown is signalled.
    ///
    /// This should be spawned as a background task.
    pub async fn run(
        mut self,
        handler: Arc<dyn TaskHandler>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        info!("Dispatch worker started");

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Dispatch worker received shutdown signal");
                    break;
                }
                envelope = self.rx.recv() => {
                    let Some(envelope) = envelope else {
                        break;
                    };
                    let handler = Arc::clone(&handler);
                    let config = self.config.clone();
                    tokio::spawn(run_with_retry(handler, envelope, config));
                }
            }
        }

        info!("Dispatch worker stopped");
    }
}

async fn run_with_retry(
    handler: Arc<dyn TaskHandler>,
    mut envelope: TaskEnvelope,
    config: DispatcherConfig,
) {
    let action = envelope.task.name();
    loop {
        match handler.handle(envelope.task.clone()).await {
            Ok(()) => {
                metrics::TASKS_TOTAL.with_label_values(&[action, "ok"]).inc();
                return;
            }
            Err(e) if envelope.task.is_durable() || envelope.attempt < config.max_attempts => {
                metrics::TASKS_TOTAL.with_label_values(&[action, "retry"]).inc();
                let backoff = config.backoff(envelope.attempt);
                warn!(
                    id = %envelope.id,
                    action,
                    attempt = envelope.attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %format!("{:#}", e),
                    "Task failed, retrying"
                );
                tokio::time::sleep(backoff).await;
                envelope.attempt += 1;
            }
            Err(e) => {
                metrics::TASKS_TOTAL.with_label_values(&[action, "dropped"]).inc();
                error!(
                    id = %envelope.id,
                    action,
                    attempts = envelope.attempt,
                    error = %format!("{:#}", e),
                    "Task failed, giving up"
                );
                return;
            }
        }
    }
}

/// Create a local dispatch system
///
/// Returns:
/// - `LocalDispatcher` - for enqueueing tasks (clone this to share across tasks)
/// - `DispatchWorker` - spawn this with `tokio::spawn(worker.run(handler, shutdown_rx))`
pub fn create_local_dispatcher(config: DispatcherConfig) -> (LocalDispatcher, DispatchWorker) {
    let (tx, rx) = mpsc::channel(config.buffer_size.max(1));
    (LocalDispatcher::new(tx), DispatchWorker::new(rx, config))
}
