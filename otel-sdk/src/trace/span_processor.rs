//! Span processors: the bridge between ended spans and exporters.
//!
//! [`SimpleSpanProcessor`] hands each ended span to the exporter
//! synchronously and is meant for tests and tooling.
//! [`BatchSpanProcessor`] buffers ended spans in a bounded queue drained by
//! a dedicated background thread, so ending a span never does network I/O
//! on the caller's thread.

use crate::trace::export::{SpanData, SpanExporter};
use crate::{Resource, SdkError, SdkResult};
use futures_util::future::{self, Either};
use otel::{otel_debug, otel_error, otel_warn, Context};
use std::cmp::min;
use std::env;
use std::fmt::{self, Debug, Formatter};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Delay interval between two consecutive exports.
pub(crate) const OTEL_BSP_SCHEDULE_DELAY: &str = "OTEL_BSP_SCHEDULE_DELAY";
/// Default delay interval between two consecutive exports.
pub(crate) const OTEL_BSP_SCHEDULE_DELAY_DEFAULT: Duration = Duration::from_millis(5_000);
/// Maximum queue size.
pub(crate) const OTEL_BSP_MAX_QUEUE_SIZE: &str = "OTEL_BSP_MAX_QUEUE_SIZE";
/// Default maximum queue size.
pub(crate) const OTEL_BSP_MAX_QUEUE_SIZE_DEFAULT: usize = 2_048;
/// Maximum batch size, must be less than or equal to OTEL_BSP_MAX_QUEUE_SIZE.
pub(crate) const OTEL_BSP_MAX_EXPORT_BATCH_SIZE: &str = "OTEL_BSP_MAX_EXPORT_BATCH_SIZE";
/// Default maximum batch size.
pub(crate) const OTEL_BSP_MAX_EXPORT_BATCH_SIZE_DEFAULT: usize = 512;
/// Maximum allowed time to export data.
pub(crate) const OTEL_BSP_EXPORT_TIMEOUT: &str = "OTEL_BSP_EXPORT_TIMEOUT";
/// Default maximum allowed time to export data.
pub(crate) const OTEL_BSP_EXPORT_TIMEOUT_DEFAULT: Duration = Duration::from_millis(30_000);

/// Hooks into the span lifecycle, invoked on the thread that starts or
/// ends the span.
///
/// Processors registered on a provider are invoked in registration order.
/// `on_start`/`on_end` must not block; batching and I/O belong on a
/// processor-owned worker.
pub trait SpanProcessor: Send + Sync + Debug {
    /// Called when a span starts. Receives the parent context.
    fn on_start(&self, span: &mut crate::trace::Span, cx: &Context);

    /// Called when a span ends, with the frozen snapshot.
    fn on_end(&self, span: SpanData);

    /// Export all ended spans still held, blocking until delivered or
    /// timed out.
    fn force_flush(&self) -> SdkResult;

    /// Drain, then release the exporter. Idempotent.
    fn shutdown(&self) -> SdkResult;

    /// Hand the processor the provider's resource before any span flows.
    fn set_resource(&mut self, _resource: &Resource) {}
}

/// A [`SpanProcessor`] that exports each span synchronously on end.
///
/// Export failures are logged and swallowed; the span is gone either way.
/// Spans whose context is not sampled are skipped entirely.
pub struct SimpleSpanProcessor {
    exporter: Mutex<Box<dyn SpanExporter>>,
    is_shutdown: AtomicBool,
}

impl Debug for SimpleSpanProcessor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleSpanProcessor").finish()
    }
}

impl SimpleSpanProcessor {
    /// Create a simple processor around the given exporter.
    pub fn new(exporter: Box<dyn SpanExporter>) -> Self {
        SimpleSpanProcessor {
            exporter: Mutex::new(exporter),
            is_shutdown: AtomicBool::new(false),
        }
    }
}

impl SpanProcessor for SimpleSpanProcessor {
    fn on_start(&self, _span: &mut crate::trace::Span, _cx: &Context) {
        // Ignored
    }

    fn on_end(&self, span: SpanData) {
        if !span.span_context.is_sampled() {
            return;
        }

        if self.is_shutdown.load(Ordering::Relaxed) {
            otel_warn!(
                name: "SimpleSpanProcessor.Emit.AfterShutdown",
                message = "span received after shutdown, dropped"
            );
            return;
        }

        let result = self
            .exporter
            .lock()
            .map_err(|_| SdkError::InternalFailure("SimpleSpanProcessor mutex poisoned".into()))
            .and_then(|mut exporter| futures_executor::block_on(exporter.export(vec![span])));

        if let Err(err) = result {
            otel_error!(
                name: "SimpleSpanProcessor.ExportError",
                error = format!("{err}")
            );
        }
    }

    fn force_flush(&self) -> SdkResult {
        match self.exporter.lock() {
            Ok(mut exporter) => exporter.force_flush(),
            Err(_) => Err(SdkError::InternalFailure(
                "SimpleSpanProcessor mutex poisoned".into(),
            )),
        }
    }

    fn shutdown(&self) -> SdkResult {
        if self.is_shutdown.swap(true, Ordering::SeqCst) {
            return Err(SdkError::AlreadyShutdown);
        }
        match self.exporter.lock() {
            Ok(mut exporter) => {
                exporter.shutdown();
                Ok(())
            }
            Err(_) => Err(SdkError::InternalFailure(
                "SimpleSpanProcessor mutex poisoned".into(),
            )),
        }
    }

    fn set_resource(&mut self, resource: &Resource) {
        if let Ok(mut exporter) = self.exporter.lock() {
            exporter.set_resource(resource);
        }
    }
}

/// Messages sent between the application threads and the batch worker.
#[derive(Debug)]
enum BatchMessage {
    /// The data channel reached `max_export_batch_size`; drain now rather
    /// than waiting for the tick.
    ExportSpan(Arc<AtomicBool>),
    /// Flush the queue and report completion.
    ForceFlush(SyncSender<SdkResult>),
    /// Flush, shut the exporter down, and exit the worker.
    Shutdown(SyncSender<SdkResult>),
    /// Resource for the exporter.
    SetResource(Arc<Resource>),
}

/// A [`SpanProcessor`] that batches ended spans on a dedicated background
/// thread.
///
/// Ended spans go into a bounded queue; when the queue is full, the newest
/// span is dropped and counted, and the producer never blocks. The worker
/// drains up to `max_export_batch_size` spans per export, triggered by
/// queue growth, by the `scheduled_delay` tick, by `force_flush`, or by
/// `shutdown`. At most one export is in flight at any time, and spans keep
/// their enqueue order within a batch.
pub struct BatchSpanProcessor {
    span_sender: SyncSender<SpanData>,
    message_sender: SyncSender<BatchMessage>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
    forceflush_timeout: Duration,
    shutdown_timeout: Duration,
    export_span_message_sent: Arc<AtomicBool>,
    current_batch_size: Arc<AtomicUsize>,
    max_export_batch_size: usize,
    dropped_spans_count: AtomicUsize,
    max_queue_size: usize,
}

impl Debug for BatchSpanProcessor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchSpanProcessor")
            .field("max_queue_size", &self.max_queue_size)
            .field("max_export_batch_size", &self.max_export_batch_size)
            .finish()
    }
}

impl BatchSpanProcessor {
    /// Create a batch processor with the given configuration.
    pub(crate) fn new(mut exporter: Box<dyn SpanExporter>, config: BatchConfig) -> Self {
        let (span_sender, span_receiver) = mpsc::sync_channel::<SpanData>(config.max_queue_size);
        let (message_sender, message_receiver) = mpsc::sync_channel::<BatchMessage>(64);
        let max_queue_size = config.max_queue_size;
        let max_export_batch_size = config.max_export_batch_size;
        let current_batch_size = Arc::new(AtomicUsize::new(0));
        let current_batch_size_for_thread = current_batch_size.clone();

        let handle = thread::Builder::new()
            .name("otel.Trace.BatchProcessor".to_string())
            .spawn(move || {
                otel_debug!(
                    name: "BatchSpanProcessor.ThreadStarted",
                    interval_in_millisecs = config.scheduled_delay.as_millis(),
                    max_export_batch_size = config.max_export_batch_size,
                    max_queue_size = max_queue_size
                );
                let mut last_export_time = Instant::now();
                let current_batch_size = current_batch_size_for_thread;

                loop {
                    let remaining_time = config
                        .scheduled_delay
                        .checked_sub(last_export_time.elapsed())
                        .unwrap_or(config.scheduled_delay);

                    match message_receiver.recv_timeout(remaining_time) {
                        Ok(BatchMessage::ExportSpan(export_span_message_sent)) => {
                            otel_debug!(name: "BatchSpanProcessor.ExportingDueToBatchSize");
                            let _ = drain_and_export(
                                &span_receiver,
                                &mut exporter,
                                &current_batch_size,
                                &config,
                                &mut last_export_time,
                            );
                            // allow the next size-trigger now that the drain ran
                            export_span_message_sent.store(false, Ordering::Relaxed);
                        }
                        Ok(BatchMessage::ForceFlush(sender)) => {
                            otel_debug!(name: "BatchSpanProcessor.ExportingDueToForceFlush");
                            let result = drain_and_export(
                                &span_receiver,
                                &mut exporter,
                                &current_batch_size,
                                &config,
                                &mut last_export_time,
                            );
                            let _ = sender.send(result);
                        }
                        Ok(BatchMessage::Shutdown(sender)) => {
                            otel_debug!(name: "BatchSpanProcessor.ExportingDueToShutdown");
                            let result = drain_and_export(
                                &span_receiver,
                                &mut exporter,
                                &current_batch_size,
                                &config,
                                &mut last_export_time,
                            );
                            exporter.shutdown();
                            let _ = sender.send(result);
                            otel_debug!(
                                name: "BatchSpanProcessor.ThreadExiting",
                                reason = "ShutdownRequested"
                            );
                            break;
                        }
                        Ok(BatchMessage::SetResource(resource)) => {
                            exporter.set_resource(&resource);
                        }
                        Err(RecvTimeoutError::Timeout) => {
                            otel_debug!(name: "BatchSpanProcessor.ExportingDueToTimer");
                            let _ = drain_and_export(
                                &span_receiver,
                                &mut exporter,
                                &current_batch_size,
                                &config,
                                &mut last_export_time,
                            );
                        }
                        Err(RecvTimeoutError::Disconnected) => {
                            otel_debug!(
                                name: "BatchSpanProcessor.ThreadExiting",
                                reason = "MessageSenderDisconnected"
                            );
                            break;
                        }
                    }
                }
            })
            .expect("failed to spawn thread");

        BatchSpanProcessor {
            span_sender,
            message_sender,
            handle: Mutex::new(Some(handle)),
            forceflush_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(5),
            export_span_message_sent: Arc::new(AtomicBool::new(false)),
            current_batch_size,
            max_export_batch_size,
            dropped_spans_count: AtomicUsize::new(0),
            max_queue_size,
        }
    }

    /// Create a builder around the given exporter.
    pub fn builder<E: SpanExporter + 'static>(exporter: E) -> BatchSpanProcessorBuilder<E> {
        BatchSpanProcessorBuilder {
            exporter,
            config: BatchConfig::default(),
        }
    }
}

/// Drain up to the recorded queue depth, one `max_export_batch_size` batch
/// at a time, and export each batch with the configured deadline.
fn drain_and_export(
    span_receiver: &mpsc::Receiver<SpanData>,
    exporter: &mut Box<dyn SpanExporter>,
    current_batch_size: &AtomicUsize,
    config: &BatchConfig,
    last_export_time: &mut Instant,
) -> SdkResult {
    let target = current_batch_size.load(Ordering::Relaxed);
    let mut result = Ok(());
    let mut total_exported = 0usize;

    while target > 0 && total_exported < target {
        let mut batch = Vec::with_capacity(config.max_export_batch_size);
        while let Ok(span) = span_receiver.try_recv() {
            batch.push(span);
            if batch.len() == config.max_export_batch_size {
                break;
            }
        }
        if batch.is_empty() {
            break;
        }

        let count = batch.len();
        total_exported += count;
        if let Err(err) = export_with_timeout(exporter, batch, config.max_export_timeout) {
            otel_error!(
                name: "BatchSpanProcessor.ExportError",
                error = format!("{err}")
            );
            result = Err(err);
        }
        current_batch_size.fetch_sub(count, Ordering::Relaxed);
        *last_export_time = Instant::now();
    }

    result
}

/// Export one batch, bounded by the processor's export deadline. On
/// deadline the batch is dropped, not re-queued.
fn export_with_timeout(
    exporter: &mut Box<dyn SpanExporter>,
    batch: Vec<SpanData>,
    timeout: Duration,
) -> SdkResult {
    if batch.is_empty() {
        return Ok(());
    }

    let export = exporter.export(batch);
    let deadline = futures_timer::Delay::new(timeout);
    match futures_executor::block_on(future::select(export, deadline)) {
        Either::Left((result, _)) => result,
        Either::Right(_) => Err(SdkError::Timeout(timeout)),
    }
}

impl SpanProcessor for BatchSpanProcessor {
    fn on_start(&self, _span: &mut crate::trace::Span, _cx: &Context) {
        // Ignored
    }

    fn on_end(&self, span: SpanData) {
        if !span.span_context.is_sampled() {
            return;
        }

        match self.span_sender.try_send(span) {
            Ok(()) => {
                if self.current_batch_size.fetch_add(1, Ordering::Relaxed) + 1
                    >= self.max_export_batch_size
                    && !self.export_span_message_sent.swap(true, Ordering::Relaxed)
                {
                    if self
                        .message_sender
                        .try_send(BatchMessage::ExportSpan(
                            self.export_span_message_sent.clone(),
                        ))
                        .is_err()
                    {
                        self.export_span_message_sent.store(false, Ordering::Relaxed);
                    }
                }
            }
            Err(mpsc::TrySendError::Full(_)) => {
                // queue full: the newest span is the one dropped, and the
                // producer is never blocked
                if self.dropped_spans_count.fetch_add(1, Ordering::Relaxed) == 0 {
                    otel_warn!(
                        name: "BatchSpanProcessor.SpanDroppingStarted",
                        message = "queue full, dropping spans; total count reported at shutdown"
                    );
                }
            }
            Err(mpsc::TrySendError::Disconnected(_)) => {
                otel_warn!(
                    name: "BatchSpanProcessor.Emit.AfterShutdown",
                    message = "span received after shutdown, dropped"
                );
            }
        }
    }

    fn force_flush(&self) -> SdkResult {
        let (sender, receiver) = mpsc::sync_channel(1);
        match self.message_sender.try_send(BatchMessage::ForceFlush(sender)) {
            Ok(()) => receiver
                .recv_timeout(self.forceflush_timeout)
                .map_err(|err| match err {
                    RecvTimeoutError::Timeout => SdkError::Timeout(self.forceflush_timeout),
                    _ => SdkError::InternalFailure(format!("{err}")),
                })?,
            Err(mpsc::TrySendError::Full(_)) => Err(SdkError::InternalFailure(
                "force_flush control channel full; a flush or shutdown is already pending".into(),
            )),
            Err(mpsc::TrySendError::Disconnected(_)) => Err(SdkError::AlreadyShutdown),
        }
    }

    fn shutdown(&self) -> SdkResult {
        let dropped = self.dropped_spans_count.load(Ordering::Relaxed);
        if dropped > 0 {
            otel_warn!(
                name: "BatchSpanProcessor.SpansDropped",
                dropped_spans_count = dropped,
                max_queue_size = self.max_queue_size,
                message = "spans dropped because the queue was full over this processor's lifetime"
            );
        }

        let (sender, receiver) = mpsc::sync_channel(1);
        match self.message_sender.try_send(BatchMessage::Shutdown(sender)) {
            Ok(()) => {
                let result = receiver
                    .recv_timeout(self.shutdown_timeout)
                    .map_err(|err| match err {
                        RecvTimeoutError::Timeout => {
                            otel_error!(name: "BatchSpanProcessor.Shutdown.Timeout");
                            SdkError::Timeout(self.shutdown_timeout)
                        }
                        _ => SdkError::InternalFailure(format!("{err}")),
                    })?;
                if let Ok(mut handle) = self.handle.lock() {
                    if let Some(handle) = handle.take() {
                        let _ = handle.join();
                    }
                }
                result
            }
            Err(mpsc::TrySendError::Full(_)) => Err(SdkError::InternalFailure(
                "shutdown control channel full; a flush or shutdown is already pending".into(),
            )),
            Err(mpsc::TrySendError::Disconnected(_)) => Err(SdkError::AlreadyShutdown),
        }
    }

    fn set_resource(&mut self, resource: &Resource) {
        let _ = self
            .message_sender
            .try_send(BatchMessage::SetResource(Arc::new(resource.clone())));
    }
}

/// A builder for [`BatchSpanProcessor`].
#[derive(Debug)]
pub struct BatchSpanProcessorBuilder<E> {
    exporter: E,
    config: BatchConfig,
}

impl<E> BatchSpanProcessorBuilder<E>
where
    E: SpanExporter + 'static,
{
    /// Set the batch configuration.
    pub fn with_batch_config(self, config: BatchConfig) -> Self {
        BatchSpanProcessorBuilder { config, ..self }
    }

    /// Build the processor, spawning its worker thread.
    pub fn build(self) -> BatchSpanProcessor {
        BatchSpanProcessor::new(Box::new(self.exporter), self.config)
    }

    #[cfg(test)]
    pub(crate) fn config(&self) -> &BatchConfig {
        &self.config
    }
}

/// Batch span processor configuration.
/// Use [`BatchConfigBuilder`] to construct one.
#[derive(Debug)]
pub struct BatchConfig {
    /// Hard cap on queued spans; excess is dropped and counted.
    pub(crate) max_queue_size: usize,

    /// Max wait before flushing a partial batch.
    pub(crate) scheduled_delay: Duration,

    /// Max spans in a single export call.
    pub(crate) max_export_batch_size: usize,

    /// Per-export deadline.
    pub(crate) max_export_timeout: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfigBuilder::default().build()
    }
}

/// A builder for [`BatchConfig`].
#[derive(Debug)]
pub struct BatchConfigBuilder {
    max_queue_size: usize,
    scheduled_delay: Duration,
    max_export_batch_size: usize,
    max_export_timeout: Duration,
}

impl Default for BatchConfigBuilder {
    /// Defaults as per the specification, overridden by the
    /// `OTEL_BSP_MAX_QUEUE_SIZE`, `OTEL_BSP_SCHEDULE_DELAY`,
    /// `OTEL_BSP_MAX_EXPORT_BATCH_SIZE` and `OTEL_BSP_EXPORT_TIMEOUT`
    /// environment variables. Programmatic values override the
    /// environment.
    fn default() -> Self {
        BatchConfigBuilder {
            max_queue_size: OTEL_BSP_MAX_QUEUE_SIZE_DEFAULT,
            scheduled_delay: OTEL_BSP_SCHEDULE_DELAY_DEFAULT,
            max_export_batch_size: OTEL_BSP_MAX_EXPORT_BATCH_SIZE_DEFAULT,
            max_export_timeout: OTEL_BSP_EXPORT_TIMEOUT_DEFAULT,
        }
        .init_from_env_vars()
    }
}

impl BatchConfigBuilder {
    /// Cap on queued spans. Default 2048.
    pub fn with_max_queue_size(mut self, max_queue_size: usize) -> Self {
        self.max_queue_size = max_queue_size;
        self
    }

    /// Max wait before flushing a partial batch. Default 5s.
    pub fn with_scheduled_delay(mut self, scheduled_delay: Duration) -> Self {
        self.scheduled_delay = scheduled_delay;
        self
    }

    /// Max spans per export call. Default 512.
    pub fn with_max_export_batch_size(mut self, max_export_batch_size: usize) -> Self {
        self.max_export_batch_size = max_export_batch_size;
        self
    }

    /// Per-export deadline. Default 30s.
    pub fn with_max_export_timeout(mut self, max_export_timeout: Duration) -> Self {
        self.max_export_timeout = max_export_timeout;
        self
    }

    /// Build the config, capping the batch size at the queue size.
    pub fn build(self) -> BatchConfig {
        let max_export_batch_size = min(self.max_export_batch_size, self.max_queue_size);

        BatchConfig {
            max_queue_size: self.max_queue_size,
            scheduled_delay: self.scheduled_delay,
            max_export_batch_size,
            max_export_timeout: self.max_export_timeout,
        }
    }

    fn init_from_env_vars(mut self) -> Self {
        if let Some(max_queue_size) = env::var(OTEL_BSP_MAX_QUEUE_SIZE)
            .ok()
            .and_then(|queue_size| usize::from_str(&queue_size).ok())
        {
            self.max_queue_size = max_queue_size;
        }

        if let Some(scheduled_delay) = env::var(OTEL_BSP_SCHEDULE_DELAY)
            .ok()
            .and_then(|delay| u64::from_str(&delay).ok())
        {
            self.scheduled_delay = Duration::from_millis(scheduled_delay);
        }

        if let Some(max_export_batch_size) = env::var(OTEL_BSP_MAX_EXPORT_BATCH_SIZE)
            .ok()
            .and_then(|batch_size| usize::from_str(&batch_size).ok())
        {
            self.max_export_batch_size = max_export_batch_size;
        }

        if let Some(max_export_timeout) = env::var(OTEL_BSP_EXPORT_TIMEOUT)
            .ok()
            .and_then(|timeout| u64::from_str(&timeout).ok())
        {
            self.max_export_timeout = Duration::from_millis(max_export_timeout);
        }

        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{InMemorySpanExporter, SpanEvents, SpanLinks};
    use otel::trace::{SpanContext, SpanId, SpanKind, Status, TraceFlags, TraceId, TraceState};
    use otel::InstrumentationScope;

    fn sampled_span_data(name: &str) -> SpanData {
        SpanData {
            span_context: SpanContext::new(
                TraceId::from_u128(1),
                SpanId::from_u64(1),
                TraceFlags::SAMPLED,
                false,
                TraceState::default(),
            ),
            parent_span_id: SpanId::INVALID,
            span_kind: SpanKind::Internal,
            name: name.to_string().into(),
            start_time: otel::time::now(),
            end_time: otel::time::now(),
            attributes: Vec::new(),
            dropped_attributes_count: 0,
            events: SpanEvents::default(),
            links: SpanLinks::default(),
            status: Status::Unset,
            instrumentation_scope: InstrumentationScope::builder("test").build(),
        }
    }

    fn unsampled_span_data() -> SpanData {
        let mut data = sampled_span_data("unsampled");
        data.span_context = SpanContext::empty_context();
        data
    }

    #[test]
    fn simple_processor_exports_on_end() {
        let exporter = InMemorySpanExporter::default();
        let processor = SimpleSpanProcessor::new(Box::new(exporter.clone()));
        processor.on_end(sampled_span_data("op"));
        assert_eq!(exporter.get_finished_spans().len(), 1);
        processor.shutdown().unwrap();
        assert!(exporter.is_shutdown_called());
    }

    #[test]
    fn simple_processor_skips_unsampled() {
        let exporter = InMemorySpanExporter::default();
        let processor = SimpleSpanProcessor::new(Box::new(exporter.clone()));
        processor.on_end(unsampled_span_data());
        assert!(exporter.get_finished_spans().is_empty());
    }

    #[test]
    fn simple_processor_shutdown_is_idempotent() {
        let processor =
            SimpleSpanProcessor::new(Box::new(InMemorySpanExporter::default()));
        assert_eq!(processor.shutdown(), Ok(()));
        assert_eq!(processor.shutdown(), Err(SdkError::AlreadyShutdown));
    }

    #[test]
    fn default_batch_config_adheres_to_specification() {
        let config = temp_env::with_vars_unset(
            [
                OTEL_BSP_SCHEDULE_DELAY,
                OTEL_BSP_EXPORT_TIMEOUT,
                OTEL_BSP_MAX_QUEUE_SIZE,
                OTEL_BSP_MAX_EXPORT_BATCH_SIZE,
            ],
            BatchConfig::default,
        );
        assert_eq!(config.max_queue_size, 2048);
        assert_eq!(config.scheduled_delay, Duration::from_secs(5));
        assert_eq!(config.max_export_batch_size, 512);
        assert_eq!(config.max_export_timeout, Duration::from_secs(30));
    }

    #[test]
    fn batch_config_configurable_by_env_vars() {
        let env_vars = vec![
            (OTEL_BSP_SCHEDULE_DELAY, Some("2000")),
            (OTEL_BSP_EXPORT_TIMEOUT, Some("60000")),
            (OTEL_BSP_MAX_QUEUE_SIZE, Some("4096")),
            (OTEL_BSP_MAX_EXPORT_BATCH_SIZE, Some("1024")),
        ];

        let config = temp_env::with_vars(env_vars, BatchConfig::default);

        assert_eq!(config.scheduled_delay, Duration::from_millis(2000));
        assert_eq!(config.max_export_timeout, Duration::from_millis(60000));
        assert_eq!(config.max_queue_size, 4096);
        assert_eq!(config.max_export_batch_size, 1024);
    }

    #[test]
    fn batch_size_capped_to_queue_size() {
        let env_vars = vec![
            (OTEL_BSP_MAX_QUEUE_SIZE, Some("256")),
            (OTEL_BSP_MAX_EXPORT_BATCH_SIZE, Some("1024")),
        ];
        let config = temp_env::with_vars(env_vars, BatchConfig::default);
        assert_eq!(config.max_queue_size, 256);
        assert_eq!(config.max_export_batch_size, 256);
    }

    #[test]
    fn code_based_config_overrides_env_vars() {
        temp_env::with_var(OTEL_BSP_SCHEDULE_DELAY, Some("2000"), || {
            let config = BatchConfigBuilder::default()
                .with_scheduled_delay(Duration::from_millis(1000))
                .build();
            assert_eq!(config.scheduled_delay, Duration::from_millis(1000));
        });
    }

    #[test]
    fn batch_flushes_partial_batch_on_interval() {
        let exporter = InMemorySpanExporter::default();
        let processor = BatchSpanProcessor::new(
            Box::new(exporter.clone()),
            BatchConfigBuilder::default()
                .with_scheduled_delay(Duration::from_millis(100))
                .with_max_export_batch_size(512)
                .build(),
        );

        for _ in 0..3 {
            processor.on_end(sampled_span_data("op"));
        }
        std::thread::sleep(Duration::from_millis(150));

        let batches = exporter.get_export_batches();
        assert_eq!(batches.len(), 1, "expected a single batch, got {batches:?}");
        assert_eq!(batches[0].len(), 3);
        processor.shutdown().unwrap();
    }

    #[test]
    fn force_flush_delivers_each_span_exactly_once() {
        let exporter = InMemorySpanExporter::default();
        let processor = BatchSpanProcessor::new(
            Box::new(exporter.clone()),
            BatchConfigBuilder::default()
                .with_scheduled_delay(Duration::from_secs(60 * 60 * 24))
                .build(),
        );

        for _ in 0..10 {
            processor.on_end(sampled_span_data("op"));
        }
        processor.force_flush().unwrap();
        assert_eq!(exporter.get_finished_spans().len(), 10);

        // nothing left to deliver
        processor.force_flush().unwrap();
        assert_eq!(exporter.get_finished_spans().len(), 10);
        processor.shutdown().unwrap();
    }

    #[test]
    fn queue_full_drops_newest_without_blocking() {
        let exporter = InMemorySpanExporter::default();
        let processor = BatchSpanProcessor::new(
            Box::new(exporter.clone()),
            BatchConfigBuilder::default()
                .with_max_queue_size(4)
                .with_max_export_batch_size(4)
                .with_scheduled_delay(Duration::from_secs(60 * 60 * 24))
                .build(),
        );

        for _ in 0..9 {
            processor.on_end(sampled_span_data("op"));
        }
        processor.force_flush().unwrap();

        // 4 accepted, 5 dropped, producer never blocked
        assert_eq!(exporter.get_finished_spans().len(), 4);
        assert_eq!(processor.dropped_spans_count.load(Ordering::Relaxed), 5);
        processor.shutdown().unwrap();
    }

    #[test]
    fn no_exports_after_shutdown() {
        let exporter = InMemorySpanExporter::default();
        let processor =
            BatchSpanProcessor::new(Box::new(exporter.clone()), BatchConfig::default());
        processor.on_end(sampled_span_data("op"));
        processor.shutdown().unwrap();
        let exported = exporter.get_finished_spans().len();
        assert_eq!(exported, 1);
        assert!(exporter.is_shutdown_called());

        processor.on_end(sampled_span_data("late"));
        assert_eq!(exporter.get_finished_spans().len(), exported);
        assert_eq!(processor.shutdown(), Err(SdkError::AlreadyShutdown));
    }

    #[test]
    fn export_deadline_is_enforced() {
        use futures_util::future::BoxFuture;

        #[derive(Debug)]
        struct BlockingExporter {
            delay: Duration,
        }

        impl SpanExporter for BlockingExporter {
            fn export(&mut self, _batch: Vec<SpanData>) -> BoxFuture<'static, SdkResult> {
                let delay = self.delay;
                Box::pin(async move {
                    futures_timer::Delay::new(delay).await;
                    Ok(())
                })
            }
        }

        let processor = BatchSpanProcessor::new(
            Box::new(BlockingExporter {
                delay: Duration::from_secs(60),
            }),
            BatchConfigBuilder::default()
                .with_max_export_timeout(Duration::from_millis(20))
                .with_scheduled_delay(Duration::from_secs(60 * 60 * 24))
                .build(),
        );
        processor.on_end(sampled_span_data("op"));
        assert!(matches!(
            processor.force_flush(),
            Err(SdkError::Timeout(_))
        ));
        let _ = processor.shutdown();
    }
}
