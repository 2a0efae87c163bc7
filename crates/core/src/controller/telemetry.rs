//! Metrics emission from store state.

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::metrics::{MetricPoint, CHANGE_LATENCY, JOB_QUEUE_LATENCY, JOB_RUN_DURATION, QUEUE_DEPTH};
use crate::model::{paths, ChangeKey, ChangeRecord, JobRecord};
use crate::store::KeyFilter;

use super::handler::Controller;
use super::types::ControllerError;

fn seconds_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_milliseconds() as f64 / 1000.0
}

impl Controller {
    /// Queue depth: queued plus running, and each on its own.
    pub async fn emit_queue_metrics(&self) -> Result<(), ControllerError> {
        let shallow = KeyFilter::new().shallow();
        let queued = self.store.list(paths::JOBS_QUEUED, &shallow).await?.len();
        let running = self.store.list(paths::JOBS_RUNNING, &shallow).await?.len();

        let now = self.clock.now();
        for (state, depth) in [
            ("total", queued + running),
            ("queued", queued),
            ("running", running),
        ] {
            self.emit(MetricPoint::new(QUEUE_DEPTH, depth as f64, now).with_label("state", state))
                .await;
        }
        Ok(())
    }

    /// Queue latency and run duration of one finished job.
    pub async fn emit_job_metrics(&self, job_id: &str) -> Result<(), ControllerError> {
        let Some(job) = self.read::<JobRecord>(&paths::job(job_id)).await? else {
            warn!(job_id, "No job record to emit metrics for");
            return Ok(());
        };

        let now = self.clock.now();
        if let Some(started) = job.time_started {
            self.emit(
                MetricPoint::new(
                    JOB_QUEUE_LATENCY,
                    seconds_between(job.time_queued, started),
                    now,
                )
                .with_label("job_type", &job.job_type),
            )
            .await;

            if let Some(ended) = job.time_ended {
                self.emit(
                    MetricPoint::new(JOB_RUN_DURATION, seconds_between(started, ended), now)
                        .with_label("job_type", &job.job_type),
                )
                .await;
            }
        }
        Ok(())
    }

    /// End-to-end latency of one finished change.
    pub async fn emit_change_metrics(&self, key: ChangeKey) -> Result<(), ControllerError> {
        let Some(record) = self.read::<ChangeRecord>(&paths::change(key)).await? else {
            warn!(change = %key, "No change record to emit metrics for");
            return Ok(());
        };
        if let Some(ended) = record.time_ended {
            self.emit(MetricPoint::new(
                CHANGE_LATENCY,
                seconds_between(record.time_queued, ended),
                self.clock.now(),
            ))
            .await;
        }
        Ok(())
    }
}
