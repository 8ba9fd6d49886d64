use crate::trace::export::{SpanData, SpanExporter};
use crate::trace::{
    BatchSpanProcessor, IdGenerator, RandomIdGenerator, Sampler, SdkTracer, ShouldSample,
    SimpleSpanProcessor, Span, SpanLimits, SpanProcessor,
};
use crate::{Resource, SdkError, SdkResult};
use otel::{otel_debug, Context, InstrumentationScope};
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Creates and manages tracers, and owns the span processor chain.
///
/// Cloning is cheap and all clones share state. Shutting the provider down
/// quiesces its processors, which drain their queues through their
/// exporters; it is idempotent, the second call reporting
/// [`SdkError::AlreadyShutdown`]. Dropping the last handle shuts down
/// implicitly.
#[derive(Clone, Debug)]
pub struct SdkTracerProvider {
    inner: Arc<TracerProviderInner>,
}

pub(crate) struct TracerProviderInner {
    pub(crate) processors: Vec<Box<dyn SpanProcessor>>,
    pub(crate) sampler: Box<dyn ShouldSample>,
    pub(crate) id_generator: Box<dyn IdGenerator>,
    pub(crate) span_limits: SpanLimits,
    pub(crate) resource: Resource,
    is_shutdown: AtomicBool,
}

impl std::fmt::Debug for TracerProviderInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TracerProviderInner")
            .field("processors", &self.processors.len())
            .field("resource", &self.resource)
            .finish()
    }
}

impl Drop for TracerProviderInner {
    fn drop(&mut self) {
        if !self.is_shutdown.load(Ordering::SeqCst) {
            otel_debug!(
                name: "TracerProvider.ShutdownOnDrop",
                message = "provider dropped without explicit shutdown, shutting processors down"
            );
            for processor in &self.processors {
                let _ = processor.shutdown();
            }
        }
    }
}

impl SdkTracerProvider {
    /// Return a builder for a provider.
    pub fn builder() -> TracerProviderBuilder {
        TracerProviderBuilder::default()
    }

    /// Create a tracer reporting under the given scope name.
    pub fn tracer(&self, name: impl Into<Cow<'static, str>>) -> SdkTracer {
        self.tracer_with_scope(InstrumentationScope::builder(name).build())
    }

    /// Create a tracer reporting under the given scope.
    pub fn tracer_with_scope(&self, scope: InstrumentationScope) -> SdkTracer {
        SdkTracer::new(scope, self.clone())
    }

    /// The resource shared by all spans of this provider.
    pub fn resource(&self) -> &Resource {
        &self.inner.resource
    }

    pub(crate) fn inner(&self) -> &TracerProviderInner {
        &self.inner
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.inner.is_shutdown.load(Ordering::SeqCst)
    }

    pub(crate) fn notify_span_start(&self, span: &mut Span, cx: &Context) {
        for processor in &self.inner.processors {
            processor.on_start(span, cx);
        }
    }

    pub(crate) fn notify_span_end(&self, data: SpanData) {
        let mut processors = self.inner.processors.iter().peekable();
        while let Some(processor) = processors.next() {
            if processors.peek().is_none() {
                processor.on_end(data);
                break;
            }
            processor.on_end(data.clone());
        }
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

/// Configures an [`SdkTracerProvider`].
#[derive(Debug, Default)]
pub struct TracerProviderBuilder {
    processors: Vec<Box<dyn SpanProcessor>>,
    sampler: Option<Box<dyn ShouldSample>>,
    id_generator: Option<Box<dyn IdGenerator>>,
    span_limits: Option<SpanLimits>,
    resource: Option<Resource>,
}

impl TracerProviderBuilder {
    /// Add a span processor. Processors are notified in registration order.
    pub fn with_span_processor<P: SpanProcessor + 'static>(mut self, processor: P) -> Self {
        self.processors.push(Box::new(processor));
        self
    }

    /// Add a [`SimpleSpanProcessor`] around the given exporter.
    pub fn with_simple_exporter<E: SpanExporter + 'static>(self, exporter: E) -> Self {
        self.with_span_processor(SimpleSpanProcessor::new(Box::new(exporter)))
    }

    /// Add a [`BatchSpanProcessor`] with default configuration around the
    /// given exporter.
    pub fn with_batch_exporter<E: SpanExporter + 'static>(self, exporter: E) -> Self {
        self.with_span_processor(BatchSpanProcessor::builder(exporter).build())
    }

    /// Use the given sampler; defaults to parent-based always-on.
    pub fn with_sampler<S: ShouldSample + 'static>(mut self, sampler: S) -> Self {
        self.sampler = Some(Box::new(sampler));
        self
    }

    /// Use the given id generator; defaults to [`RandomIdGenerator`].
    pub fn with_id_generator<G: IdGenerator + 'static>(mut self, id_generator: G) -> Self {
        self.id_generator = Some(Box::new(id_generator));
        self
    }

    /// Use the given span limits.
    pub fn with_span_limits(mut self, span_limits: SpanLimits) -> Self {
        self.span_limits = Some(span_limits);
        self
    }

    /// Use the given resource; defaults to the detector-assembled one.
    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resource = Some(resource);
        self
    }

    /// Build the provider, handing every processor the resource.
    pub fn build(self) -> SdkTracerProvider {
        let resource = self.resource.unwrap_or_else(|| Resource::builder().build());
        let mut processors = self.processors;
        for processor in processors.iter_mut() {
            processor.set_resource(&resource);
        }

        SdkTracerProvider {
            inner: Arc::new(TracerProviderInner {
                processors,
                sampler: self
                    .sampler
                    .unwrap_or_else(|| Box::new(Sampler::parent_based(Box::new(Sampler::AlwaysOn)))),
                id_generator: self
                    .id_generator
                    .unwrap_or_else(|| Box::new(RandomIdGenerator::default())),
                span_limits: self.span_limits.unwrap_or_default(),
                resource,
                is_shutdown: AtomicBool::new(false),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::InMemorySpanExporter;

    #[test]
    fn shutdown_is_idempotent() {
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(InMemorySpanExporter::default())
            .build();
        assert_eq!(provider.shutdown(), Ok(()));
        assert_eq!(provider.shutdown(), Err(SdkError::AlreadyShutdown));
    }

    #[test]
    fn processors_receive_resource() {
        let exporter = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .with_resource(
                Resource::builder_empty()
                    .with_service_name("svc")
                    .build(),
            )
            .build();
        assert_eq!(
            provider.resource().get(&otel::Key::new("service.name")),
            Some(otel::Value::from("svc"))
        );
        let _ = provider.shutdown();
    }

    #[test]
    fn force_flush_ok_with_no_work() {
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(InMemorySpanExporter::default())
            .build();
        assert_eq!(provider.force_flush(), Ok(()));
    }
}
