//! Process-wide provider registry.
//!
//! Instrumentation libraries emit telemetry without threading provider
//! handles through every call: the bootstrap installs the three providers
//! here once, and cross-cutting access goes through the accessors. The
//! registry has an explicit lifecycle: providers are set at
//! initialization, read anywhere, and quiesced together by
//! [`shutdown_providers`], which flushes and shuts down in log → metric →
//! trace order under a shared deadline.
//!
//! Tests pin the lifecycle with [`reset`] between cases.

use crate::logs::SdkLoggerProvider;
use crate::metrics::SdkMeterProvider;
use crate::trace::SdkTracerProvider;
use crate::{SdkError, SdkResult};
use otel::otel_warn;
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

/// Default bound on the total time spent flushing and shutting down all
/// providers.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Default)]
struct Registry {
    tracer_provider: Option<SdkTracerProvider>,
    meter_provider: Option<SdkMeterProvider>,
    logger_provider: Option<SdkLoggerProvider>,
}

fn registry() -> &'static Mutex<Registry> {
    static REGISTRY: OnceLock<Mutex<Registry>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(Registry::default()))
}

fn lock() -> std::sync::MutexGuard<'static, Registry> {
    match registry().lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Install the process-wide tracer provider, returning the previous one.
pub fn set_tracer_provider(provider: SdkTracerProvider) -> Option<SdkTracerProvider> {
    lock().tracer_provider.replace(provider)
}

/// Install the process-wide meter provider, returning the previous one.
pub fn set_meter_provider(provider: SdkMeterProvider) -> Option<SdkMeterProvider> {
    lock().meter_provider.replace(provider)
}

/// Install the process-wide logger provider, returning the previous one.
pub fn set_logger_provider(provider: SdkLoggerProvider) -> Option<SdkLoggerProvider> {
    lock().logger_provider.replace(provider)
}

/// The installed tracer provider, if any.
pub fn tracer_provider() -> Option<SdkTracerProvider> {
    lock().tracer_provider.clone()
}

/// The installed meter provider, if any.
pub fn meter_provider() -> Option<SdkMeterProvider> {
    lock().meter_provider.clone()
}

/// The installed logger provider, if any.
pub fn logger_provider() -> Option<SdkLoggerProvider> {
    lock().logger_provider.clone()
}

/// A tracer from the installed provider, or `None` before initialization.
pub fn tracer(name: &'static str) -> Option<crate::trace::SdkTracer> {
    tracer_provider().map(|provider| provider.tracer(name))
}

/// A meter from the installed provider, or `None` before initialization.
pub fn meter(name: &'static str) -> Option<crate::metrics::SdkMeter> {
    meter_provider().map(|provider| provider.meter(name))
}

/// A logger from the installed provider, or `None` before initialization.
pub fn logger(name: &'static str) -> Option<crate::logs::SdkLogger> {
    logger_provider().map(|provider| provider.logger(name))
}

/// Flush and shut down every installed provider with the default budget.
pub fn shutdown_providers() -> SdkResult {
    shutdown_providers_with_timeout(DEFAULT_SHUTDOWN_TIMEOUT)
}

/// Flush and shut down every installed provider, in log → metric → trace
/// order, bounded by the given total budget.
///
/// Idempotent: a second call finds the registry empty and reports
/// [`SdkError::AlreadyShutdown`]. A timeout on one provider is reported
/// but does not stop the remaining providers from shutting down.
pub fn shutdown_providers_with_timeout(timeout: Duration) -> SdkResult {
    let (logger, meter, tracer) = {
        let mut registry = lock();
        (
            registry.logger_provider.take(),
            registry.meter_provider.take(),
            registry.tracer_provider.take(),
        )
    };

    if logger.is_none() && meter.is_none() && tracer.is_none() {
        return Err(SdkError::AlreadyShutdown);
    }

    let deadline = Instant::now() + timeout;
    let mut result = Ok(());

    if let Some(provider) = logger {
        merge(&mut result, quiesce(deadline, || provider.force_flush(), || provider.shutdown()));
    }
    if let Some(provider) = meter {
        merge(&mut result, quiesce(deadline, || provider.force_flush(), || provider.shutdown()));
    }
    if let Some(provider) = tracer {
        merge(&mut result, quiesce(deadline, || provider.force_flush(), || provider.shutdown()));
    }

    result
}

/// Clear the registry without shutting anything down.
///
/// For tests that pin the init-once lifecycle; production code goes
/// through [`shutdown_providers`].
#[doc(hidden)]
pub fn reset() {
    let mut registry = lock();
    *registry = Registry::default();
}

fn quiesce(
    deadline: Instant,
    force_flush: impl FnOnce() -> SdkResult,
    shutdown: impl FnOnce() -> SdkResult,
) -> SdkResult {
    if Instant::now() >= deadline {
        otel_warn!(
            name: "Registry.ShutdownBudgetExhausted",
            message = "shutdown budget exhausted before this provider was flushed"
        );
        // still release the provider's resources
        let _ = shutdown();
        return Err(SdkError::Timeout(Duration::ZERO));
    }

    let mut result = force_flush();
    match shutdown() {
        Ok(()) | Err(SdkError::AlreadyShutdown) => {}
        Err(err) => result = Err(err),
    }
    result
}

fn merge(result: &mut SdkResult, next: SdkResult) {
    if result.is_ok() {
        *result = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::InMemoryLogExporter;
    use crate::metrics::{InMemoryMetricExporter, PeriodicReader};
    use crate::trace::InMemorySpanExporter;
    use crate::Resource;

    // The registry is process-wide state, so every interaction lives in
    // this single test to avoid cross-test interference.
    #[test]
    fn lifecycle() {
        reset();

        assert!(tracer_provider().is_none());
        assert!(tracer("early").is_none());
        assert!(matches!(
            shutdown_providers(),
            Err(SdkError::AlreadyShutdown)
        ));

        let span_exporter = InMemorySpanExporter::default();
        let log_exporter = InMemoryLogExporter::default();
        let metric_exporter = InMemoryMetricExporter::default();

        let resource = Resource::builder_empty().with_service_name("svc").build();
        set_tracer_provider(
            SdkTracerProvider::builder()
                .with_simple_exporter(span_exporter.clone())
                .with_resource(resource.clone())
                .build(),
        );
        set_meter_provider(
            SdkMeterProvider::builder()
                .with_reader(PeriodicReader::builder(metric_exporter.clone()).build())
                .with_resource(resource.clone())
                .build(),
        );
        set_logger_provider(
            SdkLoggerProvider::builder()
                .with_simple_exporter(log_exporter.clone())
                .with_resource(resource)
                .build(),
        );

        let tracer = tracer("lib").unwrap();
        tracer.start("op").end();
        let logger = logger("lib").unwrap();
        logger.emit(logger.create_log_record());
        let meter = meter("lib").unwrap();
        meter.i64_counter("hits").build().add(1, &[]);

        assert_eq!(shutdown_providers(), Ok(()));
        assert_eq!(span_exporter.get_finished_spans().len(), 1);
        assert_eq!(log_exporter.get_emitted_logs().len(), 1);
        assert_eq!(metric_exporter.get_finished_metrics().len(), 1);
        assert!(span_exporter.is_shutdown_called());
        assert!(log_exporter.is_shutdown_called());
        assert!(metric_exporter.is_shutdown_called());

        // second shutdown is a benign failure
        assert!(matches!(
            shutdown_providers(),
            Err(SdkError::AlreadyShutdown)
        ));
    }
}
