use crate::trace::{SpanEvents, SpanLinks};
use crate::{Resource, SdkResult};
use futures_util::future::BoxFuture;
use otel::trace::{SpanContext, SpanId, SpanKind, Status};
use otel::{InstrumentationScope, KeyValue};
use std::borrow::Cow;
use std::fmt;
use std::time::SystemTime;

/// The read-only snapshot of an ended span, as handed to processors and
/// exporters.
#[derive(Clone, Debug, PartialEq)]
pub struct SpanData {
    /// Exportable `SpanContext`
    pub span_context: SpanContext,
    /// Span parent id, `SpanId::INVALID` for root spans
    pub parent_span_id: SpanId,
    /// Span kind
    pub span_kind: SpanKind,
    /// Span name
    pub name: Cow<'static, str>,
    /// Span start time
    pub start_time: SystemTime,
    /// Span end time
    pub end_time: SystemTime,
    /// Span attributes
    pub attributes: Vec<KeyValue>,
    /// The number of attributes that were above the limit, and thus dropped.
    pub dropped_attributes_count: u32,
    /// Span events
    pub events: SpanEvents,
    /// Span links
    pub links: SpanLinks,
    /// Span status
    pub status: Status,
    /// The library that produced the span
    pub instrumentation_scope: InstrumentationScope,
}

/// Serializes ended spans and delivers them to an external receiver.
///
/// `export` must not block its caller beyond returning the future; the
/// pipeline awaits it with a deadline and treats the batch as gone either
/// way. Exporters own their retry behavior.
pub trait SpanExporter: Send + Sync + fmt::Debug {
    /// Export the given batch.
    ///
    /// Called with at most one batch in flight per processor. An empty
    /// batch is never passed down.
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, SdkResult>;

    /// Shut the exporter down, releasing transport resources. Idempotent.
    fn shutdown(&mut self) {}

    /// Await any in-flight exports.
    fn force_flush(&mut self) -> SdkResult {
        Ok(())
    }

    /// Set the resource for every exported span.
    fn set_resource(&mut self, _resource: &Resource) {}
}
