use crate::trace::export::{SpanData, SpanExporter};
use crate::{Resource, SdkError, SdkResult};
use futures_util::future::BoxFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// A [`SpanExporter`] that keeps exported spans in memory, for tests and
/// tooling.
///
/// Clones share storage, so a clone handed to a provider can be inspected
/// from the test body.
///
/// ```
/// use otel_sdk::trace::{InMemorySpanExporter, SdkTracerProvider};
///
/// let exporter = InMemorySpanExporter::default();
/// let provider = SdkTracerProvider::builder()
///     .with_simple_exporter(exporter.clone())
///     .build();
///
/// provider.tracer("test").start("op").end();
/// assert_eq!(exporter.get_finished_spans().len(), 1);
/// ```
#[derive(Clone, Debug)]
pub struct InMemorySpanExporter {
    batches: Arc<Mutex<Vec<Vec<SpanData>>>>,
    resource: Arc<Mutex<Resource>>,
    shutdown_called: Arc<AtomicBool>,
}

impl Default for InMemorySpanExporter {
    fn default() -> Self {
        InMemorySpanExporter {
            batches: Arc::new(Mutex::new(Vec::new())),
            resource: Arc::new(Mutex::new(Resource::empty())),
            shutdown_called: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl InMemorySpanExporter {
    /// All exported spans, in export order.
    pub fn get_finished_spans(&self) -> Vec<SpanData> {
        self.batches
            .lock()
            .map(|batches| batches.iter().flatten().cloned().collect())
            .unwrap_or_default()
    }

    /// The exported spans, preserving batch boundaries.
    pub fn get_export_batches(&self) -> Vec<Vec<SpanData>> {
        self.batches.lock().map(|b| b.clone()).unwrap_or_default()
    }

    /// The resource the pipeline handed this exporter.
    pub fn resource(&self) -> Resource {
        self.resource
            .lock()
            .map(|r| r.clone())
            .unwrap_or_else(|_| Resource::empty())
    }

    /// Whether `shutdown` has been called.
    pub fn is_shutdown_called(&self) -> bool {
        self.shutdown_called.load(Ordering::Relaxed)
    }

    /// Clear the recorded spans.
    pub fn reset(&self) {
        if let Ok(mut batches) = self.batches.lock() {
            batches.clear();
        }
    }
}

impl SpanExporter for InMemorySpanExporter {
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, SdkResult> {
        let result = self
            .batches
            .lock()
            .map(|mut batches| batches.push(batch))
            .map_err(|err| SdkError::InternalFailure(format!("{err}")));
        Box::pin(futures_util::future::ready(result))
    }

    fn shutdown(&mut self) {
        self.shutdown_called.store(true, Ordering::Relaxed);
    }

    fn set_resource(&mut self, resource: &Resource) {
        if let Ok(mut stored) = self.resource.lock() {
            *stored = resource.clone();
        }
    }
}
