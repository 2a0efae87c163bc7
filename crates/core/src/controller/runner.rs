//! Failsafe cron loops.
//!
//! The poller re-schedules itself, but a lost delayed task would stop the
//! cycle for good. The runner enqueues the periodic sweeps on fixed
//! intervals as well; duplicates are absorbed by the poll de-dup and by
//! handler idempotency.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::dispatch::{EnqueueOptions, Task, TaskDispatcher};

use super::config::ControllerConfig;

/// Current status of the runner.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunnerStatus {
    pub running: bool,
    pub postsubmit_branches: Vec<String>,
}

/// Periodically enqueues the controller's sweep tasks.
pub struct ControllerRunner {
    config: ControllerConfig,
    dispatcher: Arc<dyn TaskDispatcher>,

    // Runtime state
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl ControllerRunner {
    pub fn new(config: ControllerConfig, dispatcher: Arc<dyn TaskDispatcher>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            dispatcher,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    /// Start the cron loops (spawns background tasks).
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Controller runner already running");
            return;
        }

        info!("Starting controller runner");

        self.spawn_cron_loop("poll", self.config.poll_interval(), vec![Task::Poll]);
        self.spawn_cron_loop(
            "reap",
            self.config.reap_interval(),
            vec![Task::ReapStuckJobs, Task::ReapExpiredLogs],
        );

        let branches = &self.config.postsubmit.branches;
        if !branches.is_empty() {
            self.spawn_cron_loop(
                "postsubmit",
                Duration::from_secs(self.config.postsubmit.head_poll_interval_secs),
                branches
                    .iter()
                    .map(|branch| Task::QueuePostsubmit {
                        branch: branch.clone(),
                        revision: None,
                    })
                    .collect(),
            );
        }

        info!("Controller runner started");
    }

    /// Stop the cron loops.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Controller runner not running");
            return;
        }

        info!("Stopping controller runner");
        let _ = self.shutdown_tx.send(());
        // Give loops a moment to observe the signal
        tokio::time::sleep(Duration::from_millis(50)).await;
        info!("Controller runner stopped");
    }

    pub fn status(&self) -> RunnerStatus {
        RunnerStatus {
            running: self.running.load(Ordering::Relaxed),
            postsubmit_branches: self.config.postsubmit.branches.clone(),
        }
    }

    /// Enqueue `tasks` now and then every `period` until shutdown.
    fn spawn_cron_loop(&self, name: &'static str, period: Duration, tasks: Vec<Task>) {
        let running = Arc::clone(&self.running);
        let dispatcher = Arc::clone(&self.dispatcher);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!(name, period_secs = period.as_secs(), "Cron loop started");
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!(name, "Cron loop received shutdown signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        for task in &tasks {
                            if let Err(e) = dispatcher.enqueue(task.clone(), EnqueueOptions::new()).await {
                                warn!(name, action = task.name(), error = %e, "Cron enqueue failed");
                            }
                        }
                    }
                }
            }
            info!(name, "Cron loop stopped");
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingDispatcher;

    fn config() -> ControllerConfig {
        ControllerConfig {
            poll_interval_secs: 3600,
            reap_interval_secs: 3600,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_start_enqueues_initial_sweeps() {
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let mut config = config();
        config.postsubmit.branches = vec!["main".to_string()];
        let runner = ControllerRunner::new(config, dispatcher.clone());

        runner.start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        runner.stop().await;

        let tasks = dispatcher.immediate_tasks().await;
        assert!(tasks.contains(&Task::Poll));
        assert!(tasks.contains(&Task::ReapStuckJobs));
        assert!(tasks.contains(&Task::ReapExpiredLogs));
        assert!(tasks.contains(&Task::QueuePostsubmit {
            branch: "main".to_string(),
            revision: None
        }));
    }

    #[tokio::test]
    async fn test_status_and_double_start() {
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let runner = ControllerRunner::new(config(), dispatcher.clone());
        assert!(!runner.status().running);

        runner.start();
        runner.start();
        assert!(runner.status().running);
        tokio::time::sleep(Duration::from_millis(50)).await;

        // One poll despite the second start
        let polls = dispatcher
            .immediate_tasks()
            .await
            .into_iter()
            .filter(|t| *t == Task::Poll)
            .count();
        assert_eq!(polls, 1);

        runner.stop().await;
        assert!(!runner.status().running);
    }
}
