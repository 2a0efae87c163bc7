//! Metrics for the controller.
//!
//! This module provides:
//! - Prometheus statics for task execution, fan-out, votes and the reapers
//! - The [`MetricsSink`] trait the controller emits named points through
//! - [`PrometheusSink`], which maps those points onto the statics

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts};
use serde::Serialize;
use thiserror::Error;

/// Total jobs in the queued and running sets (label `state`: total, queued, running).
pub const QUEUE_DEPTH: &str = "queue_depth";
/// `time_started - time_queued` of a job (label `job_type`).
pub const JOB_QUEUE_LATENCY: &str = "job_queue_latency_seconds";
/// `time_ended - time_started` of a job (label `job_type`).
pub const JOB_RUN_DURATION: &str = "job_run_duration_seconds";
/// `time_ended - time_queued` of a change.
pub const CHANGE_LATENCY: &str = "change_latency_seconds";

const LATENCY_BUCKETS: &[f64] = &[
    1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0, 1800.0, 3600.0, 7200.0, 10800.0,
];

// =============================================================================
// Queue Metrics
// =============================================================================

/// Jobs waiting or running.
pub static QUEUE_DEPTH_GAUGE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("patchwatch_queue_depth", "Jobs in the queued and running sets"),
        &["state"], // "total", "queued", "running"
    )
    .unwrap()
});

// =============================================================================
// Latency Metrics
// =============================================================================

/// Time jobs spend queued before a worker picks them up.
pub static JOB_QUEUE_LATENCY_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "patchwatch_job_queue_latency_seconds",
            "Time between a job being queued and started",
        )
        .buckets(LATENCY_BUCKETS.to_vec()),
        &["job_type"],
    )
    .unwrap()
});

/// Time workers spend running jobs.
pub static JOB_RUN_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "patchwatch_job_run_duration_seconds",
            "Time between a job being started and ended",
        )
        .buckets(LATENCY_BUCKETS.to_vec()),
        &["job_type"],
    )
    .unwrap()
});

/// End-to-end change latency.
pub static CHANGE_LATENCY_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "patchwatch_change_latency_seconds",
            "Time between a change being queued and all its jobs ending",
        )
        .buckets(LATENCY_BUCKETS.to_vec()),
        &[],
    )
    .unwrap()
});

// =============================================================================
// Controller Metrics
// =============================================================================

/// Tasks executed by the dispatcher, by action and outcome.
pub static TASKS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("patchwatch_tasks_total", "Tasks executed by the dispatcher"),
        &["action", "outcome"], // outcome: "ok", "retry", "dropped"
    )
    .unwrap()
});

/// Fan-outs performed.
pub static FANOUTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("patchwatch_fanouts_total", "Change or branch fan-outs written"),
        &["kind"], // "presubmit", "postsubmit"
    )
    .unwrap()
});

/// Reviews posted, by score.
pub static VOTES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("patchwatch_votes_total", "Reviews posted to the review system"),
        &["score"], // "+1", "-1", "none"
    )
    .unwrap()
});

/// Jobs cancelled by the controller.
pub static JOBS_CANCELLED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("patchwatch_jobs_cancelled_total", "Jobs marked CANCELLED"),
        &["job_type"],
    )
    .unwrap()
});

// =============================================================================
// Sink
// =============================================================================

/// Errors that can occur emitting a metric point.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Unknown metric: {0}")]
    UnknownMetric(String),

    #[error("Missing label {label} on {metric}")]
    MissingLabel { metric: String, label: String },

    #[error("Emit failed: {0}")]
    EmitFailed(String),
}

/// One named numeric observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricPoint {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl MetricPoint {
    pub fn new(name: impl Into<String>, value: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            labels: BTreeMap::new(),
            value,
            timestamp,
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    fn label(&self, key: &str) -> Result<&str, MetricsError> {
        self.labels
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| MetricsError::MissingLabel {
                metric: self.name.clone(),
                label: key.to_string(),
            })
    }
}

/// Accepts named numeric points.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn emit(&self, point: MetricPoint) -> Result<(), MetricsError>;
}

/// Sink that records points into the Prometheus statics above.
#[derive(Debug, Default, Clone)]
pub struct PrometheusSink;

impl PrometheusSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MetricsSink for PrometheusSink {
    async fn emit(&self, point: MetricPoint) -> Result<(), MetricsError> {
        match point.name.as_str() {
            QUEUE_DEPTH => {
                let state = point.labels.get("state").map_or("total", String::as_str);
                QUEUE_DEPTH_GAUGE
                    .with_label_values(&[state])
                    .set(point.value as i64);
            }
            JOB_QUEUE_LATENCY => JOB_QUEUE_LATENCY_SECONDS
                .with_label_values(&[point.label("job_type")?])
                .observe(point.value),
            JOB_RUN_DURATION => JOB_RUN_DURATION_SECONDS
                .with_label_values(&[point.label("job_type")?])
                .observe(point.value),
            CHANGE_LATENCY => CHANGE_LATENCY_SECONDS
                .with_label_values(&[])
                .observe(point.value),
            other => return Err(MetricsError::UnknownMetric(other.to_string())),
        }
        Ok(())
    }
}

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Queue
        Box::new(QUEUE_DEPTH_GAUGE.clone()),
        // Latency
        Box::new(JOB_QUEUE_LATENCY_SECONDS.clone()),
        Box::new(JOB_RUN_DURATION_SECONDS.clone()),
        Box::new(CHANGE_LATENCY_SECONDS.clone()),
        // Controller
        Box::new(TASKS_TOTAL.clone()),
        Box::new(FANOUTS_TOTAL.clone()),
        Box::new(VOTES_TOTAL.clone()),
        Box::new(JOBS_CANCELLED_TOTAL.clone()),
    ]
}
