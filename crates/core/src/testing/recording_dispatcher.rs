//! Recording dispatcher for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::controller::{Controller, ControllerError};
use crate::dispatch::{DispatchError, EnqueueOptions, Task, TaskDispatcher};

/// Upper bound on tasks one pump may run, to catch dispatch loops.
const MAX_PUMPED_TASKS: usize = 10_000;

#[derive(Debug, Default)]
struct State {
    /// Tasks waiting to be pumped.
    queue: VecDeque<Task>,
    /// Every task enqueued without a delay, in order.
    history: Vec<Task>,
    /// Every task enqueued with a delay; never pumped.
    delayed: Vec<(Task, Duration)>,
    next_error: Option<DispatchError>,
}

/// Dispatcher that queues tasks in memory for tests to inspect and run.
///
/// Tasks enqueued with a delay are recorded but not queued, so pumping
/// never follows the poller's self-rescheduling.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    state: Mutex<State>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every task enqueued without a delay so far.
    pub async fn immediate_tasks(&self) -> Vec<Task> {
        self.state.lock().await.history.clone()
    }

    /// Every task enqueued with a delay so far.
    pub async fn delayed_tasks(&self) -> Vec<(Task, Duration)> {
        self.state.lock().await.delayed.clone()
    }

    /// Tasks waiting to be pumped.
    pub async fn queued(&self) -> Vec<Task> {
        self.state.lock().await.queue.iter().cloned().collect()
    }

    /// Remove and return queued tasks without running them.
    pub async fn drain(&self) -> Vec<Task> {
        self.state.lock().await.queue.drain(..).collect()
    }

    /// Forget queued tasks and history.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.queue.clear();
        state.history.clear();
        state.delayed.clear();
    }

    /// Configure the next enqueue to fail with the given error.
    pub async fn set_next_error(&self, error: DispatchError) {
        self.state.lock().await.next_error = Some(error);
    }

    /// Run queued tasks, including the ones they dispatch, until the queue
    /// is empty. Returns the number of tasks run. The first failing task
    /// stops the pump and is dropped.
    pub async fn pump(&self, controller: &Controller) -> Result<usize, ControllerError> {
        self.pump_where(controller, |_| true).await
    }

    /// Like [`pump`](Self::pump), but tasks rejected by `keep` are dropped
    /// unrun, as if their delivery was lost.
    pub async fn pump_where<F>(
        &self,
        controller: &Controller,
        keep: F,
    ) -> Result<usize, ControllerError>
    where
        F: Fn(&Task) -> bool + Send + Sync,
    {
        let mut ran = 0;
        while ran < MAX_PUMPED_TASKS {
            let Some(task) = self.state.lock().await.queue.pop_front() else {
                return Ok(ran);
            };
            if !keep(&task) {
                continue;
            }
            controller.handle(task).await?;
            ran += 1;
        }
        Err(ControllerError::InvalidData(format!(
            "pump ran more than {} tasks",
            MAX_PUMPED_TASKS
        )))
    }
}

#[async_trait]
impl TaskDispatcher for RecordingDispatcher {
    async fn enqueue(&self, task: Task, options: EnqueueOptions) -> Result<(), DispatchError> {
        let mut state = self.state.lock().await;
        if let Some(err) = state.next_error.take() {
            return Err(err);
        }
        match options.delay {
            Some(delay) => state.delayed.push((task, delay)),
            None => {
                state.history.push(task.clone());
                state.queue.push_back(task);
            }
        }
        Ok(())
    }
}
