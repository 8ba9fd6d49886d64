//! One-shot pipeline assembly.
//!
//! [`init`] reads the standard environment, builds an OTLP exporter and a
//! provider per enabled signal, installs the providers in the
//! process-wide registry and the W3C propagators in the global
//! propagator slot. It can run once per process; re-initialization fails
//! deterministically. Callers needing alternate targets build additional
//! providers by hand instead of re-initializing.
//!
//! ```no_run
//! fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
//!     let runtime = tokio::runtime::Runtime::new()?;
//!     let _guard = runtime.enter();
//!
//!     otel_otlp::bootstrap::init()?;
//!
//!     if let Some(tracer) = otel_sdk::global::tracer("app") {
//!         tracer.in_span("startup", |_cx| {
//!             // application logic
//!         });
//!     }
//!
//!     otel_otlp::bootstrap::shutdown()?;
//!     Ok(())
//! }
//! ```

use crate::exporter::{resolve_protocol, Protocol, LOGS_SIGNAL, METRICS_SIGNAL, TRACES_SIGNAL};
use crate::{ExporterBuildError, LogExporter, MetricExporter, SpanExporter};
use otel::propagation::TextMapCompositePropagator;
use otel_sdk::logs::SdkLoggerProvider;
use otel_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use otel_sdk::propagation::{BaggagePropagator, TraceContextPropagator};
use otel_sdk::trace::SdkTracerProvider;
use otel_sdk::{Resource, SdkResult};
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;

/// Selects the span exporter: `otlp` (default) or `none`.
pub const OTEL_TRACES_EXPORTER: &str = "OTEL_TRACES_EXPORTER";
/// Selects the metric exporter: `otlp` (default) or `none`.
pub const OTEL_METRICS_EXPORTER: &str = "OTEL_METRICS_EXPORTER";
/// Selects the log exporter: `otlp` (default) or `none`.
pub const OTEL_LOGS_EXPORTER: &str = "OTEL_LOGS_EXPORTER";

static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Errors surfaced by [`init`].
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum BootstrapError {
    /// [`init`] already ran in this process.
    #[error("telemetry pipeline already initialized")]
    AlreadyInitialized,

    /// An exporter-selection variable holds a value this build does not
    /// ship (`console` pretty-printers are not part of this workspace).
    #[error("unsupported value {value:?} for {variable}")]
    UnsupportedExporter {
        /// The environment variable holding the value.
        variable: &'static str,
        /// The rejected value.
        value: String,
    },

    /// Building one of the exporters failed.
    #[error(transparent)]
    Build(#[from] ExporterBuildError),
}

#[derive(Debug, PartialEq)]
enum ExporterSelection {
    Otlp,
    None,
}

fn exporter_selection(variable: &'static str) -> Result<ExporterSelection, BootstrapError> {
    match env::var(variable) {
        Ok(value) => match value.trim() {
            "" | "otlp" => Ok(ExporterSelection::Otlp),
            "none" => Ok(ExporterSelection::None),
            other => Err(BootstrapError::UnsupportedExporter {
                variable,
                value: other.to_string(),
            }),
        },
        Err(_) => Ok(ExporterSelection::Otlp),
    }
}

/// Construct the whole pipeline once: resource, exporters, providers,
/// propagators, registry.
///
/// Must run within a tokio runtime, since the OTLP transports drive their
/// I/O through it. A failed attempt leaves the process uninitialized so a
/// corrected configuration can retry; a successful one is final.
pub fn init() -> Result<(), BootstrapError> {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return Err(BootstrapError::AlreadyInitialized);
    }

    match build_pipeline() {
        Ok(()) => Ok(()),
        Err(err) => {
            INITIALIZED.store(false, Ordering::SeqCst);
            Err(err)
        }
    }
}

fn build_pipeline() -> Result<(), BootstrapError> {
    let resource = Resource::builder().build();

    otel::global::set_text_map_propagator(TextMapCompositePropagator::new(vec![
        Box::new(TraceContextPropagator::new()),
        Box::new(BaggagePropagator::new()),
    ]));

    if exporter_selection(OTEL_TRACES_EXPORTER)? == ExporterSelection::Otlp {
        let exporter = match resolve_protocol(TRACES_SIGNAL) {
            Protocol::Grpc => SpanExporter::builder().with_tonic().build()?,
            Protocol::HttpBinary => SpanExporter::builder().with_http().build()?,
        };
        otel_sdk::global::set_tracer_provider(
            SdkTracerProvider::builder()
                .with_batch_exporter(exporter)
                .with_resource(resource.clone())
                .build(),
        );
    }

    if exporter_selection(OTEL_METRICS_EXPORTER)? == ExporterSelection::Otlp {
        let exporter = match resolve_protocol(METRICS_SIGNAL) {
            Protocol::Grpc => MetricExporter::builder().with_tonic().build()?,
            Protocol::HttpBinary => MetricExporter::builder().with_http().build()?,
        };
        otel_sdk::global::set_meter_provider(
            SdkMeterProvider::builder()
                .with_reader(PeriodicReader::builder(exporter).build())
                .with_resource(resource.clone())
                .build(),
        );
    }

    if exporter_selection(OTEL_LOGS_EXPORTER)? == ExporterSelection::Otlp {
        let exporter = match resolve_protocol(LOGS_SIGNAL) {
            Protocol::Grpc => LogExporter::builder().with_tonic().build()?,
            Protocol::HttpBinary => LogExporter::builder().with_http().build()?,
        };
        otel_sdk::global::set_logger_provider(
            SdkLoggerProvider::builder()
                .with_batch_exporter(exporter)
                .with_resource(resource)
                .build(),
        );
    }

    Ok(())
}

/// Flush and shut down every provider, log → metric → trace, within the
/// default 10s budget.
pub fn shutdown() -> SdkResult {
    otel_sdk::global::shutdown_providers()
}

/// Flush and shut down every provider within the given total budget.
pub fn shutdown_with_timeout(timeout: Duration) -> SdkResult {
    otel_sdk::global::shutdown_providers_with_timeout(timeout)
}

/// Clear the init-once latch and the registry, for tests pinning the
/// lifecycle.
#[doc(hidden)]
pub fn reset_for_tests() {
    INITIALIZED.store(false, Ordering::SeqCst);
    otel_sdk::global::reset();
}

#[cfg(test)]
mod tests {
    use super::*;

    // INITIALIZED is process-wide, so the whole lifecycle lives in one
    // test.
    #[tokio::test]
    async fn lifecycle() {
        reset_for_tests();

        // unsupported selections fail deterministically and leave the
        // process uninitialized
        temp_env::with_var(OTEL_TRACES_EXPORTER, Some("console"), || {
            assert!(matches!(
                init(),
                Err(BootstrapError::UnsupportedExporter { .. })
            ));
        });

        // all signals disabled: init succeeds without installing providers
        temp_env::with_vars(
            [
                (OTEL_TRACES_EXPORTER, Some("none")),
                (OTEL_METRICS_EXPORTER, Some("none")),
                (OTEL_LOGS_EXPORTER, Some("none")),
            ],
            || {
                init().unwrap();
                assert!(otel_sdk::global::tracer_provider().is_none());

                // re-initialization is an error
                assert!(matches!(init(), Err(BootstrapError::AlreadyInitialized)));
            },
        );

        reset_for_tests();

        // enabled signals build real exporters and install providers
        temp_env::with_vars(
            [
                (OTEL_TRACES_EXPORTER, Some("otlp")),
                (OTEL_METRICS_EXPORTER, Some("none")),
                (OTEL_LOGS_EXPORTER, Some("none")),
            ],
            || {
                init().unwrap();
                assert!(otel_sdk::global::tracer_provider().is_some());
                assert!(otel_sdk::global::meter_provider().is_none());
                shutdown().unwrap();
            },
        );

        reset_for_tests();
    }

    #[test]
    fn selection_parsing() {
        temp_env::with_var(OTEL_TRACES_EXPORTER, None::<&str>, || {
            assert_eq!(
                exporter_selection(OTEL_TRACES_EXPORTER).unwrap(),
                ExporterSelection::Otlp
            );
        });
        temp_env::with_var(OTEL_TRACES_EXPORTER, Some("none"), || {
            assert_eq!(
                exporter_selection(OTEL_TRACES_EXPORTER).unwrap(),
                ExporterSelection::None
            );
        });
    }
}
