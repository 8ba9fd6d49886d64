//! Binding live spans to the ambient [`Context`].
//!
//! Attaching a span to a context stores the span behind a mutex so any
//! holder of the context can record events or set status on it, and fills
//! the context's span-context slot so propagation and parenting see it.
//! The span ends when the last context holding it is released (or earlier,
//! explicitly).

use crate::trace::Span;
use otel::trace::{SpanContext, Status};
use otel::{Context, KeyValue};
use std::borrow::Cow;
use std::error::Error;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

#[derive(Debug)]
struct SynchronizedSpan {
    inner: Mutex<Span>,
}

#[derive(Clone, Debug)]
struct ActiveSpan(Arc<SynchronizedSpan>);

/// Span-related methods on [`Context`].
pub trait ContextExt {
    /// Returns a derived context with the given span as its active span.
    ///
    /// The context's span-context slot is set from the span, so the span
    /// parents children and propagates out.
    fn with_span(&self, span: Span) -> Context;

    /// A locked reference to the active span, if this context carries one.
    fn span(&self) -> Option<SpanRef<'_>>;
}

impl ContextExt for Context {
    fn with_span(&self, span: Span) -> Context {
        let span_context = span.span_context().clone();
        self.with_value(ActiveSpan(Arc::new(SynchronizedSpan {
            inner: Mutex::new(span),
        })))
        .with_span_context(span_context)
    }

    fn span(&self) -> Option<SpanRef<'_>> {
        self.get::<ActiveSpan>().map(|active| {
            SpanRef(match active.0.inner.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            })
        })
    }
}

/// A locked handle onto the context's active span.
#[derive(Debug)]
pub struct SpanRef<'a>(MutexGuard<'a, Span>);

impl SpanRef<'_> {
    /// The span context of the active span.
    pub fn span_context(&self) -> &SpanContext {
        self.0.span_context()
    }

    /// Whether the active span still records.
    pub fn is_recording(&self) -> bool {
        self.0.is_recording()
    }

    /// Record an event on the active span.
    pub fn add_event<T>(&mut self, name: T, attributes: Vec<KeyValue>)
    where
        T: Into<Cow<'static, str>>,
    {
        self.0.add_event(name, attributes)
    }

    /// Record an event at a specific time.
    pub fn add_event_with_timestamp<T>(
        &mut self,
        name: T,
        timestamp: SystemTime,
        attributes: Vec<KeyValue>,
    ) where
        T: Into<Cow<'static, str>>,
    {
        self.0.add_event_with_timestamp(name, timestamp, attributes)
    }

    /// Record an error as an exception event.
    pub fn record_exception(&mut self, err: &dyn Error) {
        self.0.record_exception(err)
    }

    /// Set an attribute on the active span.
    pub fn set_attribute(&mut self, attribute: KeyValue) {
        self.0.set_attribute(attribute)
    }

    /// Set the status of the active span.
    pub fn set_status(&mut self, status: Status) {
        self.0.set_status(status)
    }

    /// Update the name of the active span.
    pub fn update_name<T>(&mut self, new_name: T)
    where
        T: Into<Cow<'static, str>>,
    {
        self.0.update_name(new_name)
    }

    /// End the active span.
    pub fn end(&mut self) {
        self.0.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{InMemorySpanExporter, SdkTracerProvider, SimpleSpanProcessor};
    use otel::trace::TraceContextExt as _;

    #[test]
    fn active_span_receives_events_through_context() {
        let exporter = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_span_processor(SimpleSpanProcessor::new(Box::new(exporter.clone())))
            .build();
        let tracer = provider.tracer("test");

        tracer.in_span("op", |cx| {
            cx.span().unwrap().add_event("inside", vec![]);
        });

        let spans = exporter.get_finished_spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].events.events[0].name, "inside");
    }

    #[test]
    fn with_span_fills_span_context_slot() {
        let exporter = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_span_processor(SimpleSpanProcessor::new(Box::new(exporter.clone())))
            .build();
        let tracer = provider.tracer("test");

        let span = tracer.start("op");
        let expected = span.span_context().clone();
        let cx = Context::new().with_span(span);
        assert_eq!(cx.span_context(), Some(&expected));
        drop(cx);
        assert_eq!(exporter.get_finished_spans().len(), 1);
    }

    #[test]
    fn remote_context_has_no_active_span() {
        let cx = Context::new().with_remote_span_context(SpanContext::new(
            otel::trace::TraceId::from_u128(1),
            otel::trace::SpanId::from_u64(1),
            Default::default(),
            true,
            Default::default(),
        ));
        assert!(cx.span().is_none());
        assert!(cx.span_context().is_some());
    }
}
