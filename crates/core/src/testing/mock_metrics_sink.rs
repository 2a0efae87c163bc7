//! Mock metrics sink for testing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::metrics::{MetricPoint, MetricsError, MetricsSink};

/// Mock implementation of the MetricsSink trait.
///
/// Records every point; can be switched to fail every emit.
#[derive(Debug, Default)]
pub struct MockMetricsSink {
    points: Arc<RwLock<Vec<MetricPoint>>>,
    failing: AtomicBool,
}

impl MockMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get recorded points.
    pub async fn points(&self) -> Vec<MetricPoint> {
        self.points.read().await.clone()
    }

    /// Get recorded points with the given name.
    pub async fn points_named(&self, name: &str) -> Vec<MetricPoint> {
        self.points
            .read()
            .await
            .iter()
            .filter(|p| p.name == name)
            .cloned()
            .collect()
    }

    /// Make every subsequent emit fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl MetricsSink for MockMetricsSink {
    async fn emit(&self, point: MetricPoint) -> Result<(), MetricsError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(MetricsError::EmitFailed("mock failure".to_string()));
        }
        self.points.write().await.push(point);
        Ok(())
    }
}
