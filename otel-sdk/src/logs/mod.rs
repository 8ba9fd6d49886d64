//! The log pipeline.
//!
//! Log records are created by an [`SdkLogger`], enriched with the current
//! trace identity at emit time, and handed to the registered
//! [`LogProcessor`]s. Processors mirror the span pair: a synchronous
//! [`SimpleLogProcessor`] and a queue-backed [`BatchLogProcessor`] with the
//! same configuration semantics and defaults.

mod batch_log_processor;
mod export;
mod in_memory_exporter;
mod log_processor;
mod logger;
mod logger_provider;
mod record;

pub use batch_log_processor::{
    BatchConfig, BatchConfigBuilder, BatchLogProcessor, BatchLogProcessorBuilder,
};
pub use export::LogExporter;
pub use in_memory_exporter::InMemoryLogExporter;
pub use log_processor::{LogProcessor, SimpleLogProcessor};
pub use logger::SdkLogger;
pub use logger_provider::{LoggerProviderBuilder, SdkLoggerProvider};
pub use record::{AnyValue, SdkLogRecord, Severity, TraceContext};
