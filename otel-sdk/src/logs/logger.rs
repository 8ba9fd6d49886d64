use crate::logs::{SdkLogRecord, SdkLoggerProvider, Severity, TraceContext};
use otel::{Context, InstrumentationScope};

/// Emits log records for a single instrumentation scope.
#[derive(Clone, Debug)]
pub struct SdkLogger {
    scope: InstrumentationScope,
    provider: SdkLoggerProvider,
}

impl SdkLogger {
    pub(crate) fn new(scope: InstrumentationScope, provider: SdkLoggerProvider) -> Self {
        SdkLogger { scope, provider }
    }

    /// The scope this logger reports under.
    pub fn instrumentation_scope(&self) -> &InstrumentationScope {
        &self.scope
    }

    /// Create an empty record to fill and [`emit`](SdkLogger::emit).
    pub fn create_log_record(&self) -> SdkLogRecord {
        SdkLogRecord::new()
    }

    /// Emit a record to every registered processor.
    ///
    /// The observed timestamp is stamped if absent, and the trace identity
    /// is captured from the current context's span-context slot. After
    /// every processor has seen the record its observable state is frozen
    /// (the record is consumed).
    pub fn emit(&self, mut record: SdkLogRecord) {
        if self.provider.is_shutdown() {
            return;
        }

        if record.observed_timestamp.is_none() {
            record.observed_timestamp = Some(otel::time::now());
        }

        if record.trace_context.is_none() {
            record.trace_context = Context::map_current(|cx| {
                cx.span_context()
                    .filter(|sc| sc.is_valid())
                    .map(TraceContext::from)
            });
        }

        for processor in self.provider.processors() {
            processor.emit(&mut record, &self.scope);
        }
    }

    /// Whether any registered processor wants records at the given
    /// severity for this scope.
    ///
    /// Callers use this to skip building records nobody will consume.
    pub fn enabled(&self, severity: Option<Severity>, event_name: Option<&str>) -> bool {
        if self.provider.is_shutdown() {
            return false;
        }
        Context::map_current(|cx| {
            self.provider
                .processors()
                .iter()
                .any(|processor| processor.enabled(cx, &self.scope, severity, event_name))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::{InMemoryLogExporter, LogProcessor, SimpleLogProcessor};
    use crate::trace::{ContextExt as _, InMemorySpanExporter, SdkTracerProvider};
    use crate::SdkResult;

    #[test]
    fn emit_stamps_observed_timestamp() {
        let exporter = InMemoryLogExporter::default();
        let provider = SdkLoggerProvider::builder()
            .with_log_processor(SimpleLogProcessor::new(Box::new(exporter.clone())))
            .build();
        let logger = provider.logger("test");

        logger.emit(logger.create_log_record());
        let logs = exporter.get_emitted_logs();
        assert!(logs[0].0.observed_timestamp.is_some());
    }

    #[test]
    fn emit_captures_active_span_identity() {
        let log_exporter = InMemoryLogExporter::default();
        let logger_provider = SdkLoggerProvider::builder()
            .with_log_processor(SimpleLogProcessor::new(Box::new(log_exporter.clone())))
            .build();
        let logger = logger_provider.logger("test");

        let tracer_provider = SdkTracerProvider::builder()
            .with_simple_exporter(InMemorySpanExporter::default())
            .build();
        let tracer = tracer_provider.tracer("test");

        let span = tracer.start("op");
        let span_context = span.span_context().clone();
        let cx = Context::current().with_span(span);
        let _guard = cx.attach();

        logger.emit(logger.create_log_record());

        let logs = log_exporter.get_emitted_logs();
        let trace_context = logs[0].0.trace_context.as_ref().unwrap();
        assert_eq!(trace_context.trace_id, span_context.trace_id());
        assert_eq!(trace_context.span_id, span_context.span_id());
    }

    #[derive(Debug)]
    struct DisabledProcessor;

    impl LogProcessor for DisabledProcessor {
        fn emit(&self, _record: &mut SdkLogRecord, _scope: &InstrumentationScope) {}

        fn force_flush(&self) -> SdkResult {
            Ok(())
        }

        fn shutdown(&self) -> SdkResult {
            Ok(())
        }

        fn enabled(
            &self,
            _cx: &Context,
            _scope: &InstrumentationScope,
            _severity: Option<Severity>,
            _event_name: Option<&str>,
        ) -> bool {
            false
        }
    }

    #[test]
    fn logger_enabled_iff_any_processor_enabled() {
        let provider = SdkLoggerProvider::builder()
            .with_log_processor(DisabledProcessor)
            .build();
        assert!(!provider.logger("test").enabled(Some(Severity::Info), None));

        let provider = SdkLoggerProvider::builder()
            .with_log_processor(DisabledProcessor)
            .with_log_processor(SimpleLogProcessor::new(Box::new(
                InMemoryLogExporter::default(),
            )))
            .build();
        assert!(provider.logger("test").enabled(Some(Severity::Info), None));
    }
}
