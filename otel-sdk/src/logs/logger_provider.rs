use crate::logs::{
    BatchLogProcessor, LogExporter, LogProcessor, SdkLogger, SimpleLogProcessor,
};
use crate::{Resource, SdkError, SdkResult};
use otel::{otel_debug, InstrumentationScope};
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Creates and manages loggers, and owns the log processor chain.
///
/// Same lifecycle as the tracer provider: cheap clones sharing state,
/// idempotent shutdown, implicit shutdown when the last handle drops.
#[derive(Clone, Debug)]
pub struct SdkLoggerProvider {
    inner: Arc<LoggerProviderInner>,
}

struct LoggerProviderInner {
    processors: Vec<Box<dyn LogProcessor>>,
    resource: Resource,
    is_shutdown: AtomicBool,
}

impl std::fmt::Debug for LoggerProviderInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggerProviderInner")
            .field("processors", &self.processors.len())
            .field("resource", &self.resource)
            .finish()
    }
}

impl Drop for LoggerProviderInner {
    fn drop(&mut self) {
        if !self.is_shutdown.load(Ordering::SeqCst) {
            otel_debug!(
                name: "LoggerProvider.ShutdownOnDrop",
                message = "provider dropped without explicit shutdown, shutting processors down"
            );
            for processor in &self.processors {
                let _ = processor.shutdown();
            }
        }
    }
}

impl SdkLoggerProvider {
    /// Return a builder for a provider.
    pub fn builder() -> LoggerProviderBuilder {
        LoggerProviderBuilder::default()
    }

    /// Create a logger reporting under the given scope name.
    pub fn logger(&self, name: impl Into<Cow<'static, str>>) -> SdkLogger {
        self.logger_with_scope(InstrumentationScope::builder(name).build())
    }

    /// Create a logger reporting under the given scope.
    pub fn logger_with_scope(&self, scope: InstrumentationScope) -> SdkLogger {
        SdkLogger::new(scope, self.clone())
    }

    /// The resource shared by all records of this provider.
    pub fn resource(&self) -> &Resource {
        &self.inner.resource
    }

    pub(crate) fn processors(&self) -> &[Box<dyn LogProcessor>] {
        &self.inner.processors
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.inner.is_shutdown.load(Ordering::SeqCst)
    }

    /// Ask every processor to drain its queue, blocking until done.
    pub fn force_flush(&self) -> SdkResult {
        let mut result = Ok(());
        for processor in &self.inner.processors {
            if let Err(err) = processor.force_flush() {
                result = Err(err);
            }
        }
        result
    }

    /// Quiesce the processors and their exporters.
    pub fn shutdown(&self) -> SdkResult {
        if self
            .inner
            .is_shutdown
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SdkError::AlreadyShutdown);
        }

        let mut result = Ok(());
        for processor in &self.inner.processors {
            match processor.shutdown() {
                Ok(()) | Err(SdkError::AlreadyShutdown) => {}
                Err(err) => result = Err(err),
            }
        }
        result
    }
}

/// Configures an [`SdkLoggerProvider`].
#[derive(Debug, Default)]
pub struct LoggerProviderBuilder {
    processors: Vec<Box<dyn LogProcessor>>,
    resource: Option<Resource>,
}

impl LoggerProviderBuilder {
    /// Add a log processor. Processors are notified in registration order.
    pub fn with_log_processor<P: LogProcessor + 'static>(mut self, processor: P) -> Self {
        self.processors.push(Box::new(processor));
        self
    }

    /// Add a [`SimpleLogProcessor`] around the given exporter.
    pub fn with_simple_exporter<E: LogExporter + 'static>(self, exporter: E) -> Self {
        self.with_log_processor(SimpleLogProcessor::new(Box::new(exporter)))
    }

    /// Add a [`BatchLogProcessor`] with default configuration around the
    /// given exporter.
    pub fn with_batch_exporter<E: LogExporter + 'static>(self, exporter: E) -> Self {
        self.with_log_processor(BatchLogProcessor::builder(exporter).build())
    }

    /// Use the given resource; defaults to the detector-assembled one.
    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resource = Some(resource);
        self
    }

    /// Build the provider, handing every processor the resource.
    pub fn build(self) -> SdkLoggerProvider {
        let resource = self.resource.unwrap_or_else(|| Resource::builder().build());
        let mut processors = self.processors;
        for processor in processors.iter_mut() {
            processor.set_resource(&resource);
        }

        SdkLoggerProvider {
            inner: Arc::new(LoggerProviderInner {
                processors,
                resource,
                is_shutdown: AtomicBool::new(false),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::InMemoryLogExporter;

    #[test]
    fn shutdown_is_idempotent() {
        let provider = SdkLoggerProvider::builder()
            .with_simple_exporter(InMemoryLogExporter::default())
            .build();
        assert_eq!(provider.shutdown(), Ok(()));
        assert_eq!(provider.shutdown(), Err(SdkError::AlreadyShutdown));
    }

    #[test]
    fn no_records_after_shutdown() {
        let exporter = InMemoryLogExporter::default();
        let provider = SdkLoggerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        let logger = provider.logger("test");
        provider.shutdown().unwrap();
        logger.emit(logger.create_log_record());
        assert!(exporter.get_emitted_logs().is_empty());
    }

    #[test]
    fn exporter_receives_resource() {
        let exporter = InMemoryLogExporter::default();
        let _provider = SdkLoggerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .with_resource(Resource::builder_empty().with_service_name("svc").build())
            .build();
        assert_eq!(
            exporter.resource().get(&otel::Key::new("service.name")),
            Some(otel::Value::from("svc"))
        );
    }
}
