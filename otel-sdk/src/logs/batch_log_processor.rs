//! The queue-backed log processor.
//!
//! Symmetric to the batch span processor: a bounded data channel drained
//! by a dedicated worker thread, drop-newest on overflow, and the same
//! configuration defaults, read from the `OTEL_BLRP_*` environment
//! variables.

use crate::logs::{LogExporter, SdkLogRecord};
use crate::{Resource, SdkError, SdkResult};
use futures_util::future::{self, Either};
use otel::{otel_debug, otel_error, otel_warn, InstrumentationScope};
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
pub(crate) const OTEL_BLRP_SCHEDULE_DELAY: &str = "OTEL_BLRP_SCHEDULE_DELAY";
/// Default delay interval between two consecutive exports.
pub(crate) const OTEL_BLRP_SCHEDULE_DELAY_DEFAULT: Duration = Duration::from_millis(5_000);
/// Maximum queue size.
pub(crate) const OTEL_BLRP_MAX_QUEUE_SIZE: &str = "OTEL_BLRP_MAX_QUEUE_SIZE";
/// Default maximum queue size.
pub(crate) const OTEL_BLRP_MAX_QUEUE_SIZE_DEFAULT: usize = 2_048;
/// Maximum batch size, must be less than or equal to OTEL_BLRP_MAX_QUEUE_SIZE.
pub(crate) const OTEL_BLRP_MAX_EXPORT_BATCH_SIZE: &str = "OTEL_BLRP_MAX_EXPORT_BATCH_SIZE";
/// Default maximum batch size.
pub(crate) const OTEL_BLRP_MAX_EXPORT_BATCH_SIZE_DEFAULT: usize = 512;
/// Maximum allowed time to export data.
pub(crate) const OTEL_BLRP_EXPORT_TIMEOUT: &str = "OTEL_BLRP_EXPORT_TIMEOUT";
/// Default maximum allowed time to export data.
pub(crate) const OTEL_BLRP_EXPORT_TIMEOUT_DEFAULT: Duration = Duration::from_millis(30_000);

type LogsData = Box<(SdkLogRecord, InstrumentationScope)>;

#[derive(Debug)]
enum BatchMessage {
    /// The data channel reached `max_export_batch_size`.
    ExportLog(Arc<AtomicBool>),
    /// Flush the queue and report completion.
    ForceFlush(SyncSender<SdkResult>),
    /// Flush, shut the exporter down, and exit the worker.
    Shutdown(SyncSender<SdkResult>),
    /// Resource for the exporter.
    SetResource(Arc<Resource>),
}

/// A [`crate::logs::LogProcessor`] that batches emitted records on a
/// dedicated background thread.
///
/// Overflow drops the newest record, counted and reported at shutdown;
/// emitting never blocks the caller.
pub struct BatchLogProcessor {
    logs_sender: SyncSender<LogsData>,
    message_sender: SyncSender<BatchMessage>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
    forceflush_timeout: Duration,
    shutdown_timeout: Duration,
    export_log_message_sent: Arc<AtomicBool>,
    current_batch_size: Arc<AtomicUsize>,
    max_export_batch_size: usize,
    dropped_logs_count: AtomicUsize,
    max_queue_size: usize,
}

impl Debug for BatchLogProcessor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchLogProcessor")
            .field("max_queue_size", &self.max_queue_size)
            .field("max_export_batch_size", &self.max_export_batch_size)
            .finish()
    }
}

impl BatchLogProcessor {
    pub(crate) fn new(mut exporter: Box<dyn LogExporter>, config: BatchConfig) -> Self {
        let (logs_sender, logs_receiver) = mpsc::sync_channel::<LogsData>(config.max_queue_size);
        let (message_sender, message_receiver) = mpsc::sync_channel::<BatchMessage>(64);
        let max_queue_size = config.max_queue_size;
        let max_export_batch_size = config.max_export_batch_size;
        let current_batch_size = Arc::new(AtomicUsize::new(0));
        let current_batch_size_for_thread = current_batch_size.clone();

        let handle = thread::Builder::new()
            .name("otel.Logs.BatchProcessor".to_string())
            .spawn(move || {
                otel_debug!(
                    name: "BatchLogProcessor.ThreadStarted",
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
                        Ok(BatchMessage::ExportLog(export_log_message_sent)) => {
                            otel_debug!(name: "BatchLogProcessor.ExportingDueToBatchSize");
                            let _ = drain_and_export(
                                &logs_receiver,
                                &mut exporter,
                                &current_batch_size,
                                &config,
                                &mut last_export_time,
                            );
                            export_log_message_sent.store(false, Ordering::Relaxed);
                        }
                        Ok(BatchMessage::ForceFlush(sender)) => {
                            otel_debug!(name: "BatchLogProcessor.ExportingDueToForceFlush");
                            let result = drain_and_export(
                                &logs_receiver,
                                &mut exporter,
                                &current_batch_size,
                                &config,
                                &mut last_export_time,
                            );
                            let _ = sender.send(result);
                        }
                        Ok(BatchMessage::Shutdown(sender)) => {
                            otel_debug!(name: "BatchLogProcessor.ExportingDueToShutdown");
                            let result = drain_and_export(
                                &logs_receiver,
                                &mut exporter,
                                &current_batch_size,
                                &config,
                                &mut last_export_time,
                            );
                            exporter.shutdown();
                            let _ = sender.send(result);
                            otel_debug!(
                                name: "BatchLogProcessor.ThreadExiting",
                                reason = "ShutdownRequested"
                            );
                            break;
                        }
                        Ok(BatchMessage::SetResource(resource)) => {
                            exporter.set_resource(&resource);
                        }
                        Err(RecvTimeoutError::Timeout) => {
                            otel_debug!(name: "BatchLogProcessor.ExportingDueToTimer");
                            let _ = drain_and_export(
                                &logs_receiver,
                                &mut exporter,
                                &current_batch_size,
                                &config,
                                &mut last_export_time,
                            );
                        }
                        Err(RecvTimeoutError::Disconnected) => {
                            otel_debug!(
                                name: "BatchLogProcessor.ThreadExiting",
                                reason = "MessageSenderDisconnected"
                            );
                            break;
                        }
                    }
                }
            })
            .expect("failed to spawn thread");

        BatchLogProcessor {
            logs_sender,
            message_sender,
            handle: Mutex::new(Some(handle)),
            forceflush_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(5),
            export_log_message_sent: Arc::new(AtomicBool::new(false)),
            current_batch_size,
            max_export_batch_size,
            dropped_logs_count: AtomicUsize::new(0),
            max_queue_size,
        }
    }

    /// Create a builder around the given exporter.
    pub fn builder<E: LogExporter + 'static>(exporter: E) -> BatchLogProcessorBuilder<E> {
        BatchLogProcessorBuilder {
            exporter,
            config: BatchConfig::default(),
        }
    }
}

fn drain_and_export(
    logs_receiver: &mpsc::Receiver<LogsData>,
    exporter: &mut Box<dyn LogExporter>,
    current_batch_size: &AtomicUsize,
    config: &BatchConfig,
    last_export_time: &mut Instant,
) -> SdkResult {
    let target = current_batch_size.load(Ordering::Relaxed);
    let mut result = Ok(());
    let mut total_exported = 0usize;

    while target > 0 && total_exported < target {
        let mut batch = Vec::with_capacity(config.max_export_batch_size);
        while let Ok(log) = logs_receiver.try_recv() {
            batch.push(*log);
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
                name: "BatchLogProcessor.ExportError",
                error = format!("{err}")
            );
            result = Err(err);
        }
        current_batch_size.fetch_sub(count, Ordering::Relaxed);
        *last_export_time = Instant::now();
    }

    result
}

fn export_with_timeout(
    exporter: &mut Box<dyn LogExporter>,
    batch: Vec<(SdkLogRecord, InstrumentationScope)>,
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

impl crate::logs::LogProcessor for BatchLogProcessor {
    fn emit(&self, record: &mut SdkLogRecord, scope: &InstrumentationScope) {
        match self
            .logs_sender
            .try_send(Box::new((record.clone(), scope.clone())))
        {
            Ok(()) => {
                if self.current_batch_size.fetch_add(1, Ordering::Relaxed) + 1
                    >= self.max_export_batch_size
                    && !self.export_log_message_sent.swap(true, Ordering::Relaxed)
                {
                    if self
                        .message_sender
                        .try_send(BatchMessage::ExportLog(self.export_log_message_sent.clone()))
                        .is_err()
                    {
                        self.export_log_message_sent.store(false, Ordering::Relaxed);
                    }
                }
            }
            Err(mpsc::TrySendError::Full(_)) => {
                if self.dropped_logs_count.fetch_add(1, Ordering::Relaxed) == 0 {
                    otel_warn!(
                        name: "BatchLogProcessor.LogDroppingStarted",
                        message = "queue full, dropping log records; total count reported at shutdown"
                    );
                }
            }
            Err(mpsc::TrySendError::Disconnected(_)) => {
                otel_warn!(
                    name: "BatchLogProcessor.Emit.AfterShutdown",
                    message = "log record received after shutdown, dropped"
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
        let dropped = self.dropped_logs_count.load(Ordering::Relaxed);
        if dropped > 0 {
            otel_warn!(
                name: "BatchLogProcessor.LogsDropped",
                dropped_logs_count = dropped,
                max_queue_size = self.max_queue_size,
                message = "log records dropped because the queue was full over this processor's lifetime"
            );
        }

        let (sender, receiver) = mpsc::sync_channel(1);
        match self.message_sender.try_send(BatchMessage::Shutdown(sender)) {
            Ok(()) => {
                let result = receiver
                    .recv_timeout(self.shutdown_timeout)
                    .map_err(|err| match err {
                        RecvTimeoutError::Timeout => {
                            otel_error!(name: "BatchLogProcessor.Shutdown.Timeout");
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

/// A builder for [`BatchLogProcessor`].
#[derive(Debug)]
pub struct BatchLogProcessorBuilder<E> {
    exporter: E,
    config: BatchConfig,
}

impl<E> BatchLogProcessorBuilder<E>
where
    E: LogExporter + 'static,
{
    /// Set the batch configuration.
    pub fn with_batch_config(self, config: BatchConfig) -> Self {
        BatchLogProcessorBuilder { config, ..self }
    }

    /// Build the processor, spawning its worker thread.
    pub fn build(self) -> BatchLogProcessor {
        BatchLogProcessor::new(Box::new(self.exporter), self.config)
    }
}

/// Batch log processor configuration, sharing the span batcher's defaults.
#[derive(Debug)]
pub struct BatchConfig {
    pub(crate) max_queue_size: usize,
    pub(crate) scheduled_delay: Duration,
    pub(crate) max_export_batch_size: usize,
    pub(crate) max_export_timeout: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfigBuilder::default().build()
    }
}

/// A builder for the log [`BatchConfig`].
#[derive(Debug)]
pub struct BatchConfigBuilder {
    max_queue_size: usize,
    scheduled_delay: Duration,
    max_export_batch_size: usize,
    max_export_timeout: Duration,
}

impl Default for BatchConfigBuilder {
    /// Defaults as per the specification, overridden by the
    /// `OTEL_BLRP_MAX_QUEUE_SIZE`, `OTEL_BLRP_SCHEDULE_DELAY`,
    /// `OTEL_BLRP_MAX_EXPORT_BATCH_SIZE` and `OTEL_BLRP_EXPORT_TIMEOUT`
    /// environment variables. Programmatic values override the
    /// environment.
    fn default() -> Self {
        BatchConfigBuilder {
            max_queue_size: OTEL_BLRP_MAX_QUEUE_SIZE_DEFAULT,
            scheduled_delay: OTEL_BLRP_SCHEDULE_DELAY_DEFAULT,
            max_export_batch_size: OTEL_BLRP_MAX_EXPORT_BATCH_SIZE_DEFAULT,
            max_export_timeout: OTEL_BLRP_EXPORT_TIMEOUT_DEFAULT,
        }
        .init_from_env_vars()
    }
}

impl BatchConfigBuilder {
    /// Cap on queued records. Default 2048.
    pub fn with_max_queue_size(mut self, max_queue_size: usize) -> Self {
        self.max_queue_size = max_queue_size;
        self
    }

    /// Max wait before flushing a partial batch. Default 5s.
    pub fn with_scheduled_delay(mut self, scheduled_delay: Duration) -> Self {
        self.scheduled_delay = scheduled_delay;
        self
    }

    /// Max records per export call. Default 512.
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
        if let Some(max_queue_size) = env::var(OTEL_BLRP_MAX_QUEUE_SIZE)
            .ok()
            .and_then(|queue_size| usize::from_str(&queue_size).ok())
        {
            self.max_queue_size = max_queue_size;
        }

        if let Some(scheduled_delay) = env::var(OTEL_BLRP_SCHEDULE_DELAY)
            .ok()
            .and_then(|delay| u64::from_str(&delay).ok())
        {
            self.scheduled_delay = Duration::from_millis(scheduled_delay);
        }

        if let Some(max_export_batch_size) = env::var(OTEL_BLRP_MAX_EXPORT_BATCH_SIZE)
            .ok()
            .and_then(|batch_size| usize::from_str(&batch_size).ok())
        {
            self.max_export_batch_size = max_export_batch_size;
        }

        if let Some(max_export_timeout) = env::var(OTEL_BLRP_EXPORT_TIMEOUT)
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
    use crate::logs::{InMemoryLogExporter, LogProcessor};

    fn test_record() -> (SdkLogRecord, InstrumentationScope) {
        let mut record = SdkLogRecord::new();
        record.set_body("hello".into());
        (record, InstrumentationScope::builder("test").build())
    }

    #[test]
    fn default_config_matches_span_batcher() {
        let config = temp_env::with_vars_unset(
            [
                OTEL_BLRP_SCHEDULE_DELAY,
                OTEL_BLRP_EXPORT_TIMEOUT,
                OTEL_BLRP_MAX_QUEUE_SIZE,
                OTEL_BLRP_MAX_EXPORT_BATCH_SIZE,
            ],
            BatchConfig::default,
        );
        assert_eq!(config.max_queue_size, 2048);
        assert_eq!(config.scheduled_delay, Duration::from_secs(5));
        assert_eq!(config.max_export_batch_size, 512);
        assert_eq!(config.max_export_timeout, Duration::from_secs(30));
    }

    #[test]
    fn env_vars_configure_the_batcher() {
        let env_vars = vec![
            (OTEL_BLRP_SCHEDULE_DELAY, Some("2000")),
            (OTEL_BLRP_MAX_QUEUE_SIZE, Some("4096")),
            (OTEL_BLRP_MAX_EXPORT_BATCH_SIZE, Some("1024")),
        ];
        let config = temp_env::with_vars(env_vars, BatchConfig::default);
        assert_eq!(config.scheduled_delay, Duration::from_millis(2000));
        assert_eq!(config.max_queue_size, 4096);
        assert_eq!(config.max_export_batch_size, 1024);
    }

    #[test]
    fn flush_and_shutdown_deliver_records() {
        let exporter = InMemoryLogExporter::default();
        let processor = BatchLogProcessor::new(
            Box::new(exporter.clone()),
            BatchConfigBuilder::default()
                .with_scheduled_delay(Duration::from_secs(60 * 60 * 24))
                .build(),
        );

        let (mut record, scope) = test_record();
        processor.emit(&mut record, &scope);
        processor.force_flush().unwrap();
        assert_eq!(exporter.get_emitted_logs().len(), 1);

        processor.shutdown().unwrap();
        assert!(exporter.is_shutdown_called());
        assert_eq!(processor.shutdown(), Err(SdkError::AlreadyShutdown));
    }

    #[test]
    fn queue_overflow_drops_newest_record() {
        let exporter = InMemoryLogExporter::default();
        let processor = BatchLogProcessor::new(
            Box::new(exporter.clone()),
            BatchConfigBuilder::default()
                .with_max_queue_size(2)
                .with_max_export_batch_size(2)
                .with_scheduled_delay(Duration::from_secs(60 * 60 * 24))
                .build(),
        );

        for _ in 0..5 {
            let (mut record, scope) = test_record();
            processor.emit(&mut record, &scope);
        }
        processor.force_flush().unwrap();
        assert_eq!(exporter.get_emitted_logs().len(), 2);
        processor.shutdown().unwrap();
    }
}
