use crate::logs::{LogExporter, SdkLogRecord, Severity};
use crate::{Resource, SdkError, SdkResult};
use otel::{otel_error, otel_warn, Context, InstrumentationScope};
use std::fmt::{self, Debug, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Hooks into the log record lifecycle.
///
/// Processors are invoked in registration order on the emitting thread and
/// must not block. The [`enabled`](LogProcessor::enabled) gate lets a
/// processor veto record construction upstream: a logger is enabled iff at
/// least one of its processors says so.
pub trait LogProcessor: Send + Sync + Debug {
    /// Called when a record is emitted. The record is still mutable here;
    /// it freezes once every processor has seen it.
    fn emit(&self, record: &mut SdkLogRecord, scope: &InstrumentationScope);

    /// Export all records still held, blocking until delivered or timed
    /// out.
    fn force_flush(&self) -> SdkResult;

    /// Drain, then release the exporter. Idempotent.
    fn shutdown(&self) -> SdkResult;

    /// Whether this processor wants records for the given scope, severity
    /// and event name in the given context. Defaults to `true`.
    fn enabled(
        &self,
        _cx: &Context,
        _scope: &InstrumentationScope,
        _severity: Option<Severity>,
        _event_name: Option<&str>,
    ) -> bool {
        true
    }

    /// Hand the processor the provider's resource before any record flows.
    fn set_resource(&mut self, _resource: &Resource) {}
}

/// A [`LogProcessor`] that exports each record synchronously on emit.
///
/// Export failures are logged and swallowed, matching the simple span
/// processor.
pub struct SimpleLogProcessor {
    exporter: Mutex<Box<dyn LogExporter>>,
    is_shutdown: AtomicBool,
}

impl Debug for SimpleLogProcessor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleLogProcessor").finish()
    }
}

impl SimpleLogProcessor {
    /// Create a simple processor around the given exporter.
    pub fn new(exporter: Box<dyn LogExporter>) -> Self {
        SimpleLogProcessor {
            exporter: Mutex::new(exporter),
            is_shutdown: AtomicBool::new(false),
        }
    }
}

impl LogProcessor for SimpleLogProcessor {
    fn emit(&self, record: &mut SdkLogRecord, scope: &InstrumentationScope) {
        if self.is_shutdown.load(Ordering::Relaxed) {
            otel_warn!(
                name: "SimpleLogProcessor.Emit.AfterShutdown",
                message = "log record received after shutdown, dropped"
            );
            return;
        }

        let result = self
            .exporter
            .lock()
            .map_err(|_| SdkError::InternalFailure("SimpleLogProcessor mutex poisoned".into()))
            .and_then(|mut exporter| {
                futures_executor::block_on(
                    exporter.export(vec![(record.clone(), scope.clone())]),
                )
            });

        if let Err(err) = result {
            otel_error!(
                name: "SimpleLogProcessor.ExportError",
                error = format!("{err}")
            );
        }
    }

    fn force_flush(&self) -> SdkResult {
        match self.exporter.lock() {
            Ok(mut exporter) => exporter.force_flush(),
            Err(_) => Err(SdkError::InternalFailure(
                "SimpleLogProcessor mutex poisoned".into(),
            )),
        }
    }

    fn shutdown(&self) -> SdkResult {
        if self.is_shutdown.swap(true, Ordering::SeqCst) {
            return Err(SdkError::AlreadyShutdown);
        }
        match self.exporter.lock() {
            Ok(mut exporter) => {
                exporter.shutdown();
                Ok(())
            }
            Err(_) => Err(SdkError::InternalFailure(
                "SimpleLogProcessor mutex poisoned".into(),
            )),
        }
    }

    fn set_resource(&mut self, resource: &Resource) {
        if let Ok(mut exporter) = self.exporter.lock() {
            exporter.set_resource(resource);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::InMemoryLogExporter;

    #[test]
    fn simple_processor_exports_on_emit() {
        let exporter = InMemoryLogExporter::default();
        let processor = SimpleLogProcessor::new(Box::new(exporter.clone()));
        let mut record = SdkLogRecord::new();
        record.set_body("hello".into());
        processor.emit(&mut record, &InstrumentationScope::builder("test").build());
        assert_eq!(exporter.get_emitted_logs().len(), 1);
    }

    #[test]
    fn simple_processor_drops_after_shutdown() {
        let exporter = InMemoryLogExporter::default();
        let processor = SimpleLogProcessor::new(Box::new(exporter.clone()));
        processor.shutdown().unwrap();
        let mut record = SdkLogRecord::new();
        processor.emit(&mut record, &InstrumentationScope::builder("test").build());
        assert!(exporter.get_emitted_logs().is_empty());
        assert_eq!(processor.shutdown(), Err(SdkError::AlreadyShutdown));
    }
}
