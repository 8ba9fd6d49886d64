use crate::trace::export::SpanData;
use crate::trace::{
    ContextExt, SamplingDecision, SdkTracerProvider, Span, SpanEvents, SpanLinks,
};
use otel::trace::{Link, SpanContext, SpanId, SpanKind, Status, TraceFlags, TraceId, TraceState};
use otel::{Context, InstrumentationScope, KeyValue};
use std::borrow::Cow;
use std::time::SystemTime;

/// Creates spans for a single instrumentation scope.
///
/// Tracers are cheap handles onto their provider; all tracers of a
/// provider share its processors, sampler and limits.
#[derive(Clone, Debug)]
pub struct SdkTracer {
    scope: InstrumentationScope,
    provider: SdkTracerProvider,
}

impl SdkTracer {
    pub(crate) fn new(scope: InstrumentationScope, provider: SdkTracerProvider) -> Self {
        SdkTracer { scope, provider }
    }

    /// The scope this tracer reports under.
    pub fn instrumentation_scope(&self) -> &InstrumentationScope {
        &self.scope
    }

    /// Returns a builder for a span with the given name.
    pub fn span_builder(&self, name: impl Into<Cow<'static, str>>) -> SpanBuilder {
        SpanBuilder::from_name(name)
    }

    /// Starts a span parented to the current context.
    pub fn start(&self, name: impl Into<Cow<'static, str>>) -> Span {
        self.span_builder(name).start(self)
    }

    /// Starts a span parented to the given context.
    pub fn start_with_context(&self, name: impl Into<Cow<'static, str>>, cx: &Context) -> Span {
        self.span_builder(name).start_with_context(self, cx)
    }

    /// Starts a span, makes it the active span of a derived current
    /// context, runs `f`, and ends the span when the context is released.
    pub fn in_span<T, F>(&self, name: impl Into<Cow<'static, str>>, f: F) -> T
    where
        F: FnOnce(Context) -> T,
    {
        let span = self.start(name);
        let cx = Context::current().with_span(span);
        let _guard = cx.clone().attach();
        f(cx)
    }

    pub(crate) fn notify_span_end(&self, data: SpanData) {
        self.provider.notify_span_end(data);
    }

    /// Span creation: resolve the parent, pick ids, consult the sampler,
    /// then notify processors.
    pub(crate) fn build_with_context(&self, mut builder: SpanBuilder, parent_cx: &Context) -> Span {
        let inner = self.provider.inner();
        let parent_span_context = parent_cx.span_context().filter(|sc| sc.is_valid());

        // ids: reuse the parent trace, always a fresh span id
        let trace_id = builder
            .trace_id
            .or_else(|| parent_span_context.map(|sc| sc.trace_id()))
            .unwrap_or_else(|| inner.id_generator.new_trace_id());
        let span_id = builder
            .span_id
            .take()
            .unwrap_or_else(|| inner.id_generator.new_span_id());
        let parent_span_id = parent_span_context
            .map(|sc| sc.span_id())
            .unwrap_or(SpanId::INVALID);

        let span_kind = builder.span_kind.take().unwrap_or(SpanKind::Internal);
        let mut attributes = builder.attributes.take().unwrap_or_default();
        let links = builder.links.take().unwrap_or_default();

        let sampling_result = inner.sampler.should_sample(
            Some(parent_cx),
            trace_id,
            &builder.name,
            &span_kind,
            &attributes,
            &links,
        );

        let trace_state = sampling_result.trace_state.unwrap_or_else(|| {
            parent_span_context
                .map(|sc| sc.trace_state().clone())
                .unwrap_or_else(TraceState::default)
        });
        let sampled = sampling_result.decision == SamplingDecision::RecordAndSample;
        let span_context = SpanContext::new(
            trace_id,
            span_id,
            TraceFlags::default().with_sampled(sampled),
            false,
            trace_state,
        );

        if sampling_result.decision == SamplingDecision::Drop || self.provider.is_shutdown() {
            // a non-recording span still carries valid ids for propagation
            return Span::new(span_context, None, self.clone(), inner.span_limits);
        }

        attributes.extend(sampling_result.attributes);
        let limits = inner.span_limits;
        let attribute_limit = limits.max_attributes_per_span as usize;
        let dropped_attributes_count = attributes.len().saturating_sub(attribute_limit) as u32;
        attributes.truncate(attribute_limit);

        let link_limit = limits.max_links_per_span as usize;
        let link_attribute_limit = limits.max_attributes_per_link as usize;
        let mut span_links = SpanLinks::default();
        span_links.dropped_count = links.len().saturating_sub(link_limit) as u32;
        for mut link in links.into_iter().take(link_limit) {
            let dropped = link.attributes.len().saturating_sub(link_attribute_limit);
            link.attributes.truncate(link_attribute_limit);
            link.dropped_attributes_count += dropped as u32;
            span_links.add_link(link);
        }

        let start_time = builder.start_time.unwrap_or_else(otel::time::now);
        let data = SpanData {
            span_context: span_context.clone(),
            parent_span_id,
            span_kind,
            name: builder.name,
            start_time,
            end_time: start_time,
            attributes,
            dropped_attributes_count,
            events: SpanEvents::default(),
            links: span_links,
            status: builder.status,
            instrumentation_scope: self.scope.clone(),
        };

        let mut span = Span::new(span_context, Some(data), self.clone(), limits);
        self.provider.notify_span_start(&mut span, parent_cx);
        span
    }
}

/// Fluent construction of a span before it starts.
#[derive(Clone, Debug, Default)]
pub struct SpanBuilder {
    /// Trace id, useful for integrations with external systems.
    pub trace_id: Option<TraceId>,
    /// Span id
    pub span_id: Option<SpanId>,
    /// Span kind
    pub span_kind: Option<SpanKind>,
    /// Span name
    pub name: Cow<'static, str>,
    /// Span start time
    pub start_time: Option<SystemTime>,
    /// Span attributes as of creation
    pub attributes: Option<Vec<KeyValue>>,
    /// Links to other spans
    pub links: Option<Vec<Link>>,
    /// The initial status
    pub status: Status,
}

impl SpanBuilder {
    /// Create a builder with the given span name.
    pub fn from_name(name: impl Into<Cow<'static, str>>) -> Self {
        SpanBuilder {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Specify the trace id to use.
    pub fn with_trace_id(self, trace_id: TraceId) -> Self {
        SpanBuilder {
            trace_id: Some(trace_id),
            ..self
        }
    }

    /// Specify the span id to use.
    pub fn with_span_id(self, span_id: SpanId) -> Self {
        SpanBuilder {
            span_id: Some(span_id),
            ..self
        }
    }

    /// Specify the span kind.
    pub fn with_kind(self, span_kind: SpanKind) -> Self {
        SpanBuilder {
            span_kind: Some(span_kind),
            ..self
        }
    }

    /// Specify the span start time.
    pub fn with_start_time<T: Into<SystemTime>>(self, start_time: T) -> Self {
        SpanBuilder {
            start_time: Some(start_time.into()),
            ..self
        }
    }

    /// Specify attributes known at creation.
    pub fn with_attributes<I>(self, attributes: I) -> Self
    where
        I: IntoIterator<Item = KeyValue>,
    {
        SpanBuilder {
            attributes: Some(attributes.into_iter().collect()),
            ..self
        }
    }

    /// Specify links to other spans.
    pub fn with_links(self, links: Vec<Link>) -> Self {
        SpanBuilder {
            links: Some(links),
            ..self
        }
    }

    /// Start the span, parented to the current context.
    pub fn start(self, tracer: &SdkTracer) -> Span {
        Context::map_current(|cx| tracer.build_with_context(self, cx))
    }

    /// Start the span, parented to the given context.
    pub fn start_with_context(self, tracer: &SdkTracer, cx: &Context) -> Span {
        tracer.build_with_context(self, cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{InMemorySpanExporter, Sampler, SimpleSpanProcessor};

    fn sampled_provider(sampler: Sampler) -> (SdkTracerProvider, InMemorySpanExporter) {
        let exporter = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_sampler(sampler)
            .with_span_processor(SimpleSpanProcessor::new(Box::new(exporter.clone())))
            .build();
        (provider, exporter)
    }

    #[test]
    fn child_reuses_parent_trace_id() {
        let (provider, exporter) = sampled_provider(Sampler::AlwaysOn);
        let tracer = provider.tracer("test");

        tracer.in_span("parent", |cx| {
            let parent_sc = cx.span_context().cloned().unwrap();
            let child = tracer.start_with_context("child", &cx);
            assert_eq!(child.span_context().trace_id(), parent_sc.trace_id());
            assert_ne!(child.span_context().span_id(), parent_sc.span_id());
        });

        let spans = exporter.get_finished_spans();
        let child = spans.iter().find(|s| s.name == "child").unwrap();
        let parent = spans.iter().find(|s| s.name == "parent").unwrap();
        assert_eq!(child.parent_span_id, parent.span_context.span_id());
        assert_eq!(parent.parent_span_id, SpanId::INVALID);
    }

    #[test]
    fn dropped_spans_keep_valid_ids() {
        let (provider, exporter) = sampled_provider(Sampler::AlwaysOff);
        let tracer = provider.tracer("test");
        let mut span = tracer.start("unsampled");
        assert!(!span.is_recording());
        assert!(span.span_context().is_valid());
        assert!(!span.span_context().is_sampled());
        span.end();
        assert!(exporter.get_finished_spans().is_empty());
    }

    #[test]
    fn builder_attributes_and_kind_applied() {
        let (provider, exporter) = sampled_provider(Sampler::AlwaysOn);
        let tracer = provider.tracer("test");
        tracer
            .span_builder("op")
            .with_kind(SpanKind::Client)
            .with_attributes([KeyValue::new("k", "v")])
            .start(&tracer)
            .end();

        let spans = exporter.get_finished_spans();
        assert_eq!(spans[0].span_kind, SpanKind::Client);
        assert_eq!(spans[0].attributes, vec![KeyValue::new("k", "v")]);
    }

    #[test]
    fn remote_parent_is_honored() {
        use otel::trace::TraceContextExt;

        let (provider, exporter) = sampled_provider(Sampler::AlwaysOn);
        let tracer = provider.tracer("test");

        let remote = SpanContext::new(
            TraceId::from_u128(0xabc),
            SpanId::from_u64(0xdef),
            TraceFlags::SAMPLED,
            true,
            TraceState::default(),
        );
        let cx = Context::new().with_remote_span_context(remote.clone());
        tracer.start_with_context("server-op", &cx).end();

        let spans = exporter.get_finished_spans();
        assert_eq!(spans[0].span_context.trace_id(), remote.trace_id());
        assert_eq!(spans[0].parent_span_id, remote.span_id());
    }

    #[test]
    fn no_spans_after_shutdown() {
        let (provider, exporter) = sampled_provider(Sampler::AlwaysOn);
        let tracer = provider.tracer("test");
        provider.shutdown().unwrap();
        let mut span = tracer.start("late");
        assert!(!span.is_recording());
        span.end();
        assert!(exporter.get_finished_spans().is_empty());
    }
}
