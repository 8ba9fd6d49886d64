//! The telemetry pipeline core.
//!
//! This crate implements the pipeline behind the `otel` API types: span,
//! log and metric signals flow from instrumentation through processors and
//! readers into exporters, asynchronously and without blocking the
//! instrumented code.
//!
//! - [`trace`]: span lifecycle, simple/batch span processors, samplers.
//! - [`logs`]: log record lifecycle and processors.
//! - [`metrics`]: instruments, aggregation storage, readers.
//! - [`resource`]: identity of the telemetry-producing entity.
//! - [`propagation`]: the W3C `traceparent`/`tracestate`/`baggage` formats.
//! - [`global`]: process-wide provider registry with init-once/shutdown
//!   lifecycle.
//!
//! Instrumentation entry points (starting and ending spans, recording
//! measurements, emitting logs) only do in-memory work under short-held
//! locks; all network I/O happens on background workers owned by the
//! processors and readers.
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unused
)]

mod error;
pub use error::{SdkError, SdkResult};

pub mod global;
pub mod logs;
pub mod metrics;
pub mod propagation;
pub mod resource;
pub mod trace;

pub use resource::Resource;
