//! The span pipeline.
//!
//! Spans are created by an [`SdkTracer`], sampled at creation, mutated
//! while live, and handed as frozen [`SpanData`] snapshots to the
//! registered [`SpanProcessor`]s when they end. Processors batch and
//! forward to a [`SpanExporter`]; the tracer-side operations never block
//! on network I/O.

mod config;
mod context;
mod export;
mod id_generator;
mod in_memory_exporter;
mod provider;
mod sampler;
mod span;
mod span_processor;
mod tracer;

pub use config::SpanLimits;
pub use context::{ContextExt, SpanRef};
pub use export::{SpanData, SpanExporter};
pub use id_generator::{IdGenerator, RandomIdGenerator};
pub use in_memory_exporter::InMemorySpanExporter;
pub use provider::{SdkTracerProvider, TracerProviderBuilder};
pub use sampler::{ParentBased, Sampler, SamplingDecision, SamplingResult, ShouldSample};
pub use span::Span;
pub use span_processor::{
    BatchConfig, BatchConfigBuilder, BatchSpanProcessor, BatchSpanProcessorBuilder,
    SimpleSpanProcessor, SpanProcessor,
};
pub use tracer::{SdkTracer, SpanBuilder};

use otel::trace::Event;
use otel::trace::Link;

/// The events recorded on a span, plus the count of events dropped by the
/// per-span limit.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpanEvents {
    /// The recorded events.
    pub events: Vec<Event>,
    /// Count of events dropped because the limit was reached.
    pub dropped_count: u32,
}

impl SpanEvents {
    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether any events were recorded.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub(crate) fn add_event(&mut self, event: Event) {
        self.events.push(event);
    }
}

impl IntoIterator for SpanEvents {
    type Item = Event;
    type IntoIter = std::vec::IntoIter<Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}

/// The links recorded on a span, plus the count of links dropped by the
/// per-span limit.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpanLinks {
    /// The recorded links.
    pub links: Vec<Link>,
    /// Count of links dropped because the limit was reached.
    pub dropped_count: u32,
}

impl SpanLinks {
    /// Number of recorded links.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Whether any links were recorded.
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub(crate) fn add_link(&mut self, link: Link) {
        self.links.push(link);
    }
}

impl IntoIterator for SpanLinks {
    type Item = Link;
    type IntoIter = std::vec::IntoIter<Link>;

    fn into_iter(self) -> Self::IntoIter {
        self.links.into_iter()
    }
}
