use crate::metrics::data::{ResourceMetrics, Temporality};
use crate::metrics::exporter::PushMetricExporter;
use crate::{SdkError, SdkResult};
use futures_util::future::BoxFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// A [`PushMetricExporter`] that keeps collected metrics in memory, for
/// tests and tooling. Clones share storage.
#[derive(Clone, Debug)]
pub struct InMemoryMetricExporter {
    metrics: Arc<Mutex<Vec<ResourceMetrics>>>,
    temporality: Temporality,
    shutdown_called: Arc<AtomicBool>,
}

impl Default for InMemoryMetricExporter {
    fn default() -> Self {
        InMemoryMetricExporter {
            metrics: Arc::new(Mutex::new(Vec::new())),
            temporality: Temporality::Cumulative,
            shutdown_called: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl InMemoryMetricExporter {
    /// An exporter requesting the given temporality.
    pub fn with_temporality(temporality: Temporality) -> Self {
        InMemoryMetricExporter {
            temporality,
            ..Default::default()
        }
    }

    /// Every collection exported so far, in export order.
    pub fn get_finished_metrics(&self) -> Vec<ResourceMetrics> {
        self.metrics
            .lock()
            .map(|metrics| metrics.clone())
            .unwrap_or_default()
    }

    /// Whether `shutdown` has been called.
    pub fn is_shutdown_called(&self) -> bool {
        self.shutdown_called.load(Ordering::Relaxed)
    }

    /// Clear the recorded collections.
    pub fn reset(&self) {
        if let Ok(mut metrics) = self.metrics.lock() {
            metrics.clear();
        }
    }
}

impl PushMetricExporter for InMemoryMetricExporter {
    fn export(&self, metrics: &ResourceMetrics) -> BoxFuture<'static, SdkResult> {
        let result = self
            .metrics
            .lock()
            .map(|mut stored| stored.push(metrics.clone()))
            .map_err(|err| SdkError::InternalFailure(format!("{err}")));
        Box::pin(futures_util::future::ready(result))
    }

    fn shutdown(&self) {
        self.shutdown_called.store(true, Ordering::Relaxed);
    }

    fn temporality(&self) -> Temporality {
        self.temporality
    }
}
