use crate::logs::{LogExporter, SdkLogRecord};
use crate::{Resource, SdkError, SdkResult};
use futures_util::future::BoxFuture;
use otel::InstrumentationScope;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// A [`LogExporter`] that keeps exported records in memory, for tests and
/// tooling. Clones share storage.
#[derive(Clone, Debug)]
pub struct InMemoryLogExporter {
    logs: Arc<Mutex<Vec<(SdkLogRecord, InstrumentationScope)>>>,
    resource: Arc<Mutex<Resource>>,
    shutdown_called: Arc<AtomicBool>,
}

impl Default for InMemoryLogExporter {
    fn default() -> Self {
        InMemoryLogExporter {
            logs: Arc::new(Mutex::new(Vec::new())),
            resource: Arc::new(Mutex::new(Resource::empty())),
            shutdown_called: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl InMemoryLogExporter {
    /// All exported records with their scopes, in export order.
    pub fn get_emitted_logs(&self) -> Vec<(SdkLogRecord, InstrumentationScope)> {
        self.logs.lock().map(|logs| logs.clone()).unwrap_or_default()
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

    /// Clear the recorded logs.
    pub fn reset(&self) {
        if let Ok(mut logs) = self.logs.lock() {
            logs.clear();
        }
    }
}

impl LogExporter for InMemoryLogExporter {
    fn export(
        &mut self,
        batch: Vec<(SdkLogRecord, InstrumentationScope)>,
    ) -> BoxFuture<'static, SdkResult> {
        let result = self
            .logs
            .lock()
            .map(|mut logs| logs.extend(batch))
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
