//! Trace identity types shared by the pipeline and by propagation.
//!
//! The live span machinery (tracer, processors, exporters) lives in
//! `otel-sdk`; this module carries only the data types that cross the
//! API boundary: ids, flags, state, [`SpanContext`], span kinds, status,
//! events and links.

mod span_context;

pub use span_context::{
    SpanContext, SpanId, TraceFlags, TraceId, TraceState, TraceStateError,
};

use crate::{Context, KeyValue};
use std::borrow::Cow;
use std::time::SystemTime;

/// The relationship between a span and its parent/children in a trace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpanKind {
    /// Outgoing synchronous remote call, e.g. an outgoing HTTP request.
    Client,
    /// Incoming synchronous remote call, e.g. an incoming HTTP request.
    Server,
    /// Asynchronous production of a message.
    Producer,
    /// Asynchronous consumption of a message.
    Consumer,
    /// Internal operation within an application.
    Internal,
}

/// The status of a [`SpanContext`]-carrying operation once it has ended.
///
/// Transitions are one-way: `Unset` may move to `Ok` or `Error`; an `Error`
/// description may be replaced by another `Error`; `Ok` is terminal and an
/// `Error → Ok` transition is rejected. A span still `Unset` when it ends
/// becomes `Ok`.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum Status {
    /// The default status.
    #[default]
    Unset,

    /// The operation contains an error.
    Error {
        /// The description of the error
        description: Cow<'static, str>,
    },

    /// The operation has been validated by an application developer or
    /// operator to have completed successfully.
    Ok,
}

impl Status {
    /// Create a new error status with the given description.
    pub fn error(description: impl Into<Cow<'static, str>>) -> Self {
        Status::Error {
            description: description.into(),
        }
    }
}

/// A timed event with a name and attributes, recorded on a span.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    /// The name of this event.
    pub name: Cow<'static, str>,
    /// The exact time the event occurred.
    pub timestamp: SystemTime,
    /// Event attributes.
    pub attributes: Vec<KeyValue>,
    /// The number of attributes that were above the limit, and thus dropped.
    pub dropped_attributes_count: u32,
}

impl Event {
    /// Create a new event.
    pub fn new<T: Into<Cow<'static, str>>>(
        name: T,
        timestamp: SystemTime,
        attributes: Vec<KeyValue>,
        dropped_attributes_count: u32,
    ) -> Self {
        Event {
            name: name.into(),
            timestamp,
            attributes,
            dropped_attributes_count,
        }
    }

    /// Create a new event with a name and no attributes.
    pub fn with_name<T: Into<Cow<'static, str>>>(name: T) -> Self {
        Event {
            name: name.into(),
            timestamp: crate::time::now(),
            attributes: Vec::new(),
            dropped_attributes_count: 0,
        }
    }
}

/// A causal link from one span to another.
#[derive(Clone, Debug, PartialEq)]
pub struct Link {
    /// The span context of the linked span.
    pub span_context: SpanContext,
    /// Link attributes.
    pub attributes: Vec<KeyValue>,
    /// The number of attributes that were above the limit, and thus dropped.
    pub dropped_attributes_count: u32,
}

impl Link {
    /// Create a new link.
    pub fn new(span_context: SpanContext, attributes: Vec<KeyValue>) -> Self {
        Link {
            span_context,
            attributes,
            dropped_attributes_count: 0,
        }
    }
}

/// Methods for storing and retrieving trace identity in a [`Context`].
pub trait TraceContextExt {
    /// Returns a derived context marked as carrying the span context of a
    /// remote parent, as produced by propagator extraction.
    fn with_remote_span_context(&self, span_context: SpanContext) -> Self;
}

impl TraceContextExt for Context {
    fn with_remote_span_context(&self, span_context: SpanContext) -> Self {
        debug_assert!(span_context.is_remote());
        self.with_span_context(span_context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_constructors() {
        assert_eq!(Status::default(), Status::Unset);
        assert_eq!(
            Status::error("boom"),
            Status::Error {
                description: "boom".into()
            }
        );
    }

    #[test]
    fn remote_context_slot() {
        let sc = SpanContext::new(
            TraceId::from_u128(1),
            SpanId::from_u64(2),
            TraceFlags::SAMPLED,
            true,
            TraceState::default(),
        );
        let cx = Context::new().with_remote_span_context(sc.clone());
        assert_eq!(cx.span_context(), Some(&sc));
        assert!(cx.has_active_span());
    }
}
