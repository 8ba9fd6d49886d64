//! API layer for the `otel` telemetry pipeline.
//!
//! This crate carries everything instrumentation code touches directly: the
//! ambient [`Context`], [`Baggage`], the trace identity types
//! ([`trace::TraceId`], [`trace::SpanContext`], ...), common attribute
//! values ([`KeyValue`]), and the text-map propagation seam. The pipeline
//! itself (processors, exporters, readers) lives in `otel-sdk`.
//!
//! [`Baggage`]: baggage::Baggage
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]

#[macro_use]
mod internal_logging;

pub mod baggage;

mod common;
pub use common::{Array, Key, KeyValue, StringValue, Value};

mod context;
pub use context::{Context, ContextGuard, FutureExt, WithContext};

pub mod global;

mod instrumentation;
pub use instrumentation::{InstrumentationScope, InstrumentationScopeBuilder};

pub mod propagation;

pub mod trace;

#[doc(hidden)]
pub mod time {
    //! Single source for "now" so tests and wasm-like targets can be adapted
    //! in one place.
    use std::time::SystemTime;

    #[doc(hidden)]
    pub fn now() -> SystemTime {
        SystemTime::now()
    }
}
