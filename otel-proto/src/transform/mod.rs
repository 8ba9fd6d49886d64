//! Mapping from the SDK's in-memory records to the OTLP messages.
//!
//! Spans and logs are grouped two levels deep: by resource, then by
//! instrumentation scope. Timestamps become nanoseconds since the Unix
//! epoch and trace/span ids travel as raw bytes.

pub mod common;
pub mod logs;
pub mod metrics;
pub mod trace;
