//! In-memory metric store
//!
//! Last-write-wins per `(quantity, asset)` key, regex-filtered snapshot
//! reads. Expired metrics are not garbage-collected; the poller's
//! liveness accounting tolerates stale entries because a stale timestamp
//! can never prolong a window.

use std::collections::HashMap;

use async_trait::async_trait;
use regex::Regex;
use tokio::sync::Mutex;
use tracing::trace;

use super::{MetricShm, ShmResult};
use crate::Metric;

/// In-process [`MetricShm`] implementation.
#[derive(Default)]
pub struct MemoryShm {
    metrics: Mutex<HashMap<(String, String), Metric>>,
}

impl MemoryShm {
    pub fn new() -> Self {
        Self::default()
    }
}

fn anchored(pattern: &str) -> String {
    format!("^(?:{pattern})$")
}

#[async_trait]
impl MetricShm for MemoryShm {
    async fn read_metrics(
        &self,
        type_pattern: &str,
        asset_pattern: &str,
    ) -> ShmResult<Vec<Metric>> {
        let type_re = Regex::new(&anchored(type_pattern))?;
        let asset_re = Regex::new(&anchored(asset_pattern))?;

        let metrics = self.metrics.lock().await;
        let snapshot = metrics
            .values()
            .filter(|m| type_re.is_match(&m.quantity) && asset_re.is_match(&m.asset))
            .cloned()
            .collect();

        Ok(snapshot)
    }

    async fn write_metric(&self, metric: Metric) -> ShmResult<()> {
        trace!("write {}={}", metric.topic(), metric.value);
        self.metrics
            .lock()
            .await
            .insert((metric.quantity.clone(), metric.asset.clone()), metric);
        Ok(())
    }
}
