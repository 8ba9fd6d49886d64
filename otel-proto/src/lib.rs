//! OTLP wire schema and record transformations.
//!
//! The message definitions under [`proto`] mirror the published
//! OpenTelemetry protocol schema; field numbers and service paths are the
//! protocol's and must not drift. The [`transform`] module maps the SDK's
//! in-memory records onto those messages.
#![warn(
    future_incompatible,
    nonstandard_style,
    rust_2018_idioms,
    unused
)]

pub mod proto;
pub mod transform;
