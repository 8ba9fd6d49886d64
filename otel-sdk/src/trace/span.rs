//! The live, mutable half of a span's lifecycle.
//!
//! A `Span` owns its recorded state from start until `end`; after end the
//! state is frozen into a [`SpanData`] snapshot and handed to processors.
//! All mutations after end are silently dropped with a debug log, so
//! instrumentation code can never corrupt exported data.

use crate::trace::export::SpanData;
use crate::trace::{SdkTracer, SpanLimits};
use otel::trace::{Event, Link, SpanContext, Status};
use otel::{otel_debug, Array, KeyValue, Value};
use std::borrow::Cow;
use std::error::Error;
use std::time::SystemTime;

/// A single timed operation within a trace.
#[derive(Debug)]
pub struct Span {
    span_context: SpanContext,
    data: Option<SpanData>,
    tracer: SdkTracer,
    span_limits: SpanLimits,
}

impl Span {
    pub(crate) fn new(
        span_context: SpanContext,
        data: Option<SpanData>,
        tracer: SdkTracer,
        span_limits: SpanLimits,
    ) -> Self {
        Span {
            span_context,
            data,
            tracer,
            span_limits,
        }
    }

    /// Returns the `SpanContext` for this span, before and after end.
    pub fn span_context(&self) -> &SpanContext {
        &self.span_context
    }

    /// Returns `true` while the span records mutations.
    ///
    /// Always `false` after `end`, and for spans the sampler dropped.
    pub fn is_recording(&self) -> bool {
        self.data.is_some()
    }

    /// Record an event with the current time.
    pub fn add_event<T>(&mut self, name: T, attributes: Vec<KeyValue>)
    where
        T: Into<Cow<'static, str>>,
    {
        self.add_event_with_timestamp(name, otel::time::now(), attributes)
    }

    /// Record an event at a specific time.
    pub fn add_event_with_timestamp<T>(
        &mut self,
        name: T,
        timestamp: SystemTime,
        mut attributes: Vec<KeyValue>,
    ) where
        T: Into<Cow<'static, str>>,
    {
        let event_limit = self.span_limits.max_events_per_span as usize;
        let attribute_limit = self.span_limits.max_attributes_per_event as usize;
        self.with_data(|data| {
            if data.events.len() < event_limit {
                let dropped = attributes.len().saturating_sub(attribute_limit);
                attributes.truncate(attribute_limit);
                data.events
                    .add_event(Event::new(name, timestamp, attributes, dropped as u32));
            } else {
                data.events.dropped_count += 1;
            }
        });
    }

    /// Record an error as an `exception` event, per the semantic
    /// conventions.
    pub fn record_exception(&mut self, err: &dyn Error) {
        let attributes = vec![KeyValue::new("exception.message", err.to_string())];
        self.add_event("exception", attributes);
    }

    /// Record a link to another span.
    pub fn add_link(&mut self, span_context: SpanContext, mut attributes: Vec<KeyValue>) {
        let link_limit = self.span_limits.max_links_per_span as usize;
        let attribute_limit = self.span_limits.max_attributes_per_link as usize;
        self.with_data(|data| {
            if data.links.len() < link_limit {
                let dropped = attributes.len().saturating_sub(attribute_limit);
                attributes.truncate(attribute_limit);
                let mut link = Link::new(span_context, attributes);
                link.dropped_attributes_count = dropped as u32;
                data.links.add_link(link);
            } else {
                data.links.dropped_count += 1;
            }
        });
    }

    /// Set an attribute, replacing any previous value for the same key.
    ///
    /// Past the per-span cap, new keys are dropped and counted.
    pub fn set_attribute(&mut self, mut attribute: KeyValue) {
        let attribute_limit = self.span_limits.max_attributes_per_span as usize;
        let list_limit = self.span_limits.max_list_value_length as usize;
        truncate_list_value(&mut attribute.value, list_limit);
        self.with_data(|data| {
            if let Some(existing) = data
                .attributes
                .iter_mut()
                .find(|kv| kv.key == attribute.key)
            {
                existing.value = attribute.value;
            } else if data.attributes.len() < attribute_limit {
                data.attributes.push(attribute);
            } else {
                data.dropped_attributes_count += 1;
            }
        });
    }

    /// Set multiple attributes.
    pub fn set_attributes(&mut self, attributes: impl IntoIterator<Item = KeyValue>) {
        for attribute in attributes {
            self.set_attribute(attribute);
        }
    }

    /// Set the status of this span.
    ///
    /// `Ok` is terminal, and an `Error` never transitions to `Ok`; only the
    /// error description may be replaced while in `Error`.
    pub fn set_status(&mut self, status: Status) {
        self.with_data(|data| match (&data.status, &status) {
            // Ok is a terminal acknowledgement.
            (Status::Ok, _) => {}
            // Error may only be replaced by another Error.
            (Status::Error { .. }, Status::Error { .. }) => data.status = status,
            (Status::Error { .. }, _) => {}
            (Status::Unset, Status::Unset) => {}
            (Status::Unset, _) => data.status = status,
        });
    }

    /// Update the span name.
    pub fn update_name<T>(&mut self, new_name: T)
    where
        T: Into<Cow<'static, str>>,
    {
        let name = new_name.into();
        self.with_data(|data| {
            data.name = name;
        });
    }

    /// End the span with the current time.
    pub fn end(&mut self) {
        self.end_with_timestamp(otel::time::now());
    }

    /// End the span at the given time.
    ///
    /// A second `end` is a no-op; the first end freezes all state.
    pub fn end_with_timestamp(&mut self, timestamp: SystemTime) {
        self.ensure_ended_and_exported(Some(timestamp));
    }

    fn ensure_ended_and_exported(&mut self, timestamp: Option<SystemTime>) {
        match self.data.take() {
            Some(mut data) => {
                data.end_time = timestamp.unwrap_or_else(otel::time::now);
                // end can never precede start
                if data.end_time < data.start_time {
                    data.end_time = data.start_time;
                }
                if data.status == Status::Unset {
                    data.status = Status::Ok;
                }
                self.tracer.notify_span_end(data);
            }
            None => {
                otel_debug!(
                    name: "Span.AlreadyEnded",
                    message = "span mutation after end dropped"
                );
            }
        }
    }

    /// Operate on a mutable reference to span data, logging if the span no
    /// longer records.
    fn with_data<T, F>(&mut self, f: F) -> Option<T>
    where
        F: FnOnce(&mut SpanData) -> T,
    {
        match self.data.as_mut() {
            Some(data) => Some(f(data)),
            None => {
                otel_debug!(
                    name: "Span.AlreadyEnded",
                    message = "span mutation after end dropped"
                );
                None
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn data(&self) -> Option<&SpanData> {
        self.data.as_ref()
    }
}

impl Drop for Span {
    /// Report the span on drop if it was not ended explicitly.
    fn drop(&mut self) {
        if self.data.is_some() {
            self.ensure_ended_and_exported(None);
        }
    }
}

fn truncate_list_value(value: &mut Value, limit: usize) {
    if let Value::Array(array) = value {
        let len = match array {
            Array::Bool(v) => v.len(),
            Array::I64(v) => v.len(),
            Array::F64(v) => v.len(),
            Array::String(v) => v.len(),
        };
        if len > limit {
            otel_debug!(
                name: "Span.ListValueTruncated",
                limit = limit
            );
            match array {
                Array::Bool(v) => v.truncate(limit),
                Array::I64(v) => v.truncate(limit),
                Array::F64(v) => v.truncate(limit),
                Array::String(v) => v.truncate(limit),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{InMemorySpanExporter, SdkTracerProvider, SimpleSpanProcessor};

    fn test_tracer() -> (SdkTracerProvider, InMemorySpanExporter, SdkTracer) {
        let exporter = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_span_processor(SimpleSpanProcessor::new(Box::new(exporter.clone())))
            .build();
        let tracer = provider.tracer("test");
        (provider, exporter, tracer)
    }

    #[test]
    fn end_freezes_state() {
        let (_provider, exporter, tracer) = test_tracer();
        let mut span = tracer.start("op");
        span.set_attribute(KeyValue::new("k", "v"));
        span.end();

        // all mutation after end is dropped
        span.set_attribute(KeyValue::new("late", "late"));
        span.add_event("late", vec![]);
        span.end();

        let spans = exporter.get_finished_spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].attributes.len(), 1);
        assert!(spans[0].events.is_empty());
    }

    #[test]
    fn end_time_never_precedes_start() {
        let (_provider, exporter, tracer) = test_tracer();
        let mut span = tracer.start("op");
        span.end_with_timestamp(SystemTime::UNIX_EPOCH);
        let spans = exporter.get_finished_spans();
        assert!(spans[0].end_time >= spans[0].start_time);
    }

    #[test]
    fn unset_status_becomes_ok_on_end() {
        let (_provider, exporter, tracer) = test_tracer();
        let mut span = tracer.start("op");
        span.end();
        assert_eq!(exporter.get_finished_spans()[0].status, Status::Ok);
    }

    #[test]
    fn status_transitions() {
        let (_provider, exporter, tracer) = test_tracer();

        // Error -> Ok is forbidden
        let mut span = tracer.start("a");
        span.set_status(Status::error("failed"));
        span.set_status(Status::Ok);
        span.end();

        // Error description may be replaced
        let mut span = tracer.start("b");
        span.set_status(Status::error("first"));
        span.set_status(Status::error("second"));
        span.end();

        // Ok is terminal
        let mut span = tracer.start("c");
        span.set_status(Status::Ok);
        span.set_status(Status::error("ignored"));
        span.end();

        let spans = exporter.get_finished_spans();
        assert_eq!(spans[0].status, Status::error("failed"));
        assert_eq!(spans[1].status, Status::error("second"));
        assert_eq!(spans[2].status, Status::Ok);
    }

    #[test]
    fn attribute_cap_drops_and_counts() {
        let (_provider, exporter, tracer) = test_tracer();
        let mut span = tracer.start("op");
        for i in 0..200i64 {
            span.set_attribute(KeyValue::new(format!("k{i}"), i));
        }
        // replacing an existing key is not a drop
        span.set_attribute(KeyValue::new("k0", 999i64));
        span.end();

        let spans = exporter.get_finished_spans();
        assert_eq!(spans[0].attributes.len(), 128);
        assert_eq!(spans[0].dropped_attributes_count, 72);
        assert_eq!(
            spans[0].attributes.iter().find(|kv| kv.key.as_str() == "k0").map(|kv| &kv.value),
            Some(&Value::I64(999))
        );
    }

    #[test]
    fn event_and_link_caps() {
        let (_provider, exporter, tracer) = test_tracer();
        let mut span = tracer.start("op");
        for _ in 0..130 {
            span.add_event("e", vec![]);
        }
        for i in 0..130u64 {
            span.add_link(
                SpanContext::new(
                    otel::trace::TraceId::from_u128(1),
                    otel::trace::SpanId::from_u64(i + 1),
                    Default::default(),
                    false,
                    Default::default(),
                ),
                vec![],
            );
        }
        span.end();

        let spans = exporter.get_finished_spans();
        assert_eq!(spans[0].events.len(), 128);
        assert_eq!(spans[0].events.dropped_count, 2);
        assert_eq!(spans[0].links.len(), 128);
        assert_eq!(spans[0].links.dropped_count, 2);
    }

    #[test]
    fn list_values_truncate() {
        let (_provider, exporter, tracer) = test_tracer();
        let mut span = tracer.start("op");
        span.set_attribute(KeyValue::new("list", (0..200i64).collect::<Vec<_>>()));
        span.end();

        let spans = exporter.get_finished_spans();
        match &spans[0].attributes[0].value {
            Value::Array(Array::I64(v)) => assert_eq!(v.len(), 128),
            other => panic!("unexpected value {other:?}"),
        }
    }

    #[test]
    fn drop_ends_span() {
        let (_provider, exporter, tracer) = test_tracer();
        {
            let _span = tracer.start("dropped");
        }
        assert_eq!(exporter.get_finished_spans().len(), 1);
    }
}
