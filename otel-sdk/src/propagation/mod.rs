//! Propagators for the W3C `traceparent`/`tracestate` and `baggage`
//! header formats.

mod baggage;
mod trace_context;

pub use baggage::BaggagePropagator;
pub use trace_context::TraceContextPropagator;
