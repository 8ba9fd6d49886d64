//! OTLP exporters for the `otel` pipeline.
//!
//! Exports spans, metrics and logs to an OTLP-speaking collector over
//! gRPC (tonic) or HTTP/protobuf (reqwest), with bounded retries,
//! per-call deadlines, optional gzip compression and TLS.
//!
//! ```no_run
//! fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
//!     // gRPC to http://localhost:4317, within a tokio runtime
//!     let runtime = tokio::runtime::Runtime::new()?;
//!     let _guard = runtime.enter();
//!     let exporter = otel_otlp::SpanExporter::builder().with_tonic().build()?;
//!
//!     let provider = otel_sdk::trace::SdkTracerProvider::builder()
//!         .with_batch_exporter(exporter)
//!         .build();
//!
//!     provider.tracer("app").start("op").end();
//!     provider.shutdown()?;
//!     Ok(())
//! }
//! ```
//!
//! The [`bootstrap`] module wires the whole pipeline (providers,
//! propagators, registry) from the standard environment variables in one
//! shot.
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unused
)]

pub mod bootstrap;
mod exporter;
mod logs;
mod metric;
pub mod retry;
mod span;

pub use exporter::{
    Compression, ExportConfig, HasExportConfig, HasHttpConfig, HasTonicConfig, HttpConfig,
    HttpExporterBuilder, Protocol, TonicConfig, TonicExporterBuilder, WithExportConfig,
    WithHttpConfig, WithTonicConfig, OTEL_EXPORTER_OTLP_COMPRESSION,
    OTEL_EXPORTER_OTLP_ENDPOINT, OTEL_EXPORTER_OTLP_HEADERS, OTEL_EXPORTER_OTLP_PROTOCOL,
    OTEL_EXPORTER_OTLP_TIMEOUT,
};
pub use logs::{LogExporter, LogExporterBuilder};
pub use metric::{MetricExporter, MetricExporterBuilder};
pub use span::{
    HttpExporterBuilderSet, NoExporterBuilderSet, SpanExporter, SpanExporterBuilder,
    TonicExporterBuilderSet,
};

use std::time::Duration;
use thiserror::Error;

/// Default force-flush bound while awaiting in-flight exports.
pub(crate) const DEFAULT_FORCE_FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors surfaced while building an exporter.
///
/// These are configuration errors in the sense of the pipeline's error
/// taxonomy: they appear synchronously at construction and are never
/// silently tolerated.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ExporterBuildError {
    /// The endpoint could not be parsed.
    #[error("invalid OTLP endpoint {0}: {1}")]
    InvalidUri(String, String),

    /// A TLS material file could not be read.
    #[error("failed to read {0}: {1}")]
    ReadFile(String, String),

    /// TLS configuration was rejected by the transport.
    #[error("invalid TLS configuration: {0}")]
    InvalidTlsConfig(String),

    /// The retry policy bounds are inconsistent.
    #[error("invalid retry policy: {0}")]
    InvalidRetryPolicy(String),

    /// gRPC and HTTP transports drive their I/O through a tokio runtime,
    /// and the builder was called outside of one.
    #[error("no tokio runtime available: {0}")]
    NoTokioRuntime(String),

    /// Building the HTTP client failed.
    #[error("failed to build the HTTP client: {0}")]
    HttpClient(String),
}
