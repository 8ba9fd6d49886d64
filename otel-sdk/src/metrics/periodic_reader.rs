use crate::metrics::data::{ResourceMetrics, Temporality};
use crate::metrics::exporter::PushMetricExporter;
use crate::metrics::instrument::InstrumentKind;
use crate::metrics::pipeline::Pipeline;
use crate::metrics::reader::MetricReader;
use crate::{SdkError, SdkResult};
use futures_util::future::{self, Either};
use otel::{otel_debug, otel_error};
use std::env;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::Duration;

const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const OTEL_METRIC_EXPORT_INTERVAL: &str = "OTEL_METRIC_EXPORT_INTERVAL";
const OTEL_METRIC_EXPORT_TIMEOUT: &str = "OTEL_METRIC_EXPORT_TIMEOUT";

#[derive(Debug)]
enum Message {
    ForceFlush(SyncSender<SdkResult>),
    Shutdown(SyncSender<SdkResult>),
}

/// A [`MetricReader`] that drives collection at a fixed interval on a
/// dedicated background thread and forwards to a [`PushMetricExporter`].
///
/// Defaults to a 60s interval and a 30s per-export deadline, overridable
/// with `OTEL_METRIC_EXPORT_INTERVAL` / `OTEL_METRIC_EXPORT_TIMEOUT`
/// (milliseconds) or programmatically.
#[derive(Clone)]
pub struct PeriodicReader {
    inner: Arc<PeriodicReaderInner>,
}

struct PeriodicReaderInner {
    exporter: Box<dyn PushMetricExporter>,
    pipeline: Mutex<Option<Weak<Pipeline>>>,
    message_sender: SyncSender<Message>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
    timeout: Duration,
    is_shutdown: AtomicBool,
}

impl fmt::Debug for PeriodicReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeriodicReader").finish()
    }
}

impl PeriodicReader {
    /// A builder around the given exporter.
    pub fn builder<E: PushMetricExporter + 'static>(exporter: E) -> PeriodicReaderBuilder<E> {
        PeriodicReaderBuilder::new(exporter)
    }

    fn new<E: PushMetricExporter + 'static>(
        exporter: E,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        let (message_sender, message_receiver) = mpsc::sync_channel::<Message>(64);
        let inner = Arc::new(PeriodicReaderInner {
            exporter: Box::new(exporter),
            pipeline: Mutex::new(None),
            message_sender,
            handle: Mutex::new(None),
            timeout,
            is_shutdown: AtomicBool::new(false),
        });

        let worker_inner = inner.clone();
        let handle = thread::Builder::new()
            .name("otel.Metrics.PeriodicReader".to_string())
            .spawn(move || {
                otel_debug!(
                    name: "PeriodicReader.ThreadStarted",
                    interval_in_millisecs = interval.as_millis()
                );
                loop {
                    match message_receiver.recv_timeout(interval) {
                        Ok(Message::ForceFlush(sender)) => {
                            let result = worker_inner.collect_and_export();
                            let _ = sender.send(result);
                        }
                        Ok(Message::Shutdown(sender)) => {
                            let result = worker_inner.collect_and_export();
                            worker_inner.exporter.shutdown();
                            let _ = sender.send(result);
                            otel_debug!(
                                name: "PeriodicReader.ThreadExiting",
                                reason = "ShutdownRequested"
                            );
                            break;
                        }
                        Err(RecvTimeoutError::Timeout) => {
                            if let Err(err) = worker_inner.collect_and_export() {
                                otel_error!(
                                    name: "PeriodicReader.ExportError",
                                    error = format!("{err}")
                                );
                            }
                        }
                        Err(RecvTimeoutError::Disconnected) => {
                            otel_debug!(
                                name: "PeriodicReader.ThreadExiting",
                                reason = "MessageSenderDisconnected"
                            );
                            break;
                        }
                    }
                }
            })
            .expect("failed to spawn thread");

        if let Ok(mut stored) = inner.handle.lock() {
            *stored = Some(handle);
        }

        PeriodicReader { inner }
    }
}

impl PeriodicReaderInner {
    fn collect(&self, rm: &mut ResourceMetrics) -> SdkResult {
        let pipeline = self
            .pipeline
            .lock()
            .ok()
            .and_then(|stored| stored.as_ref().and_then(Weak::upgrade));
        match pipeline {
            Some(pipeline) => pipeline.produce(rm),
            None => Err(SdkError::InternalFailure(
                "reader is not registered with a meter provider".into(),
            )),
        }
    }

    fn collect_and_export(&self) -> SdkResult {
        let mut rm = ResourceMetrics::default();
        self.collect(&mut rm)?;

        // nothing to report, no network call
        if rm.scope_metrics.is_empty() {
            return Ok(());
        }

        let export = self.exporter.export(&rm);
        let deadline = futures_timer::Delay::new(self.timeout);
        match futures_executor::block_on(future::select(export, deadline)) {
            Either::Left((result, _)) => result,
            Either::Right(_) => Err(SdkError::Timeout(self.timeout)),
        }
    }
}

impl MetricReader for PeriodicReader {
    fn register_pipeline(&self, pipeline: Weak<Pipeline>) {
        if let Ok(mut stored) = self.inner.pipeline.lock() {
            *stored = Some(pipeline);
        }
    }

    fn collect(&self, rm: &mut ResourceMetrics) -> SdkResult {
        if self.inner.is_shutdown.load(Ordering::Relaxed) {
            return Err(SdkError::AlreadyShutdown);
        }
        self.inner.collect(rm)
    }

    fn force_flush(&self) -> SdkResult {
        if self.inner.is_shutdown.load(Ordering::Relaxed) {
            return Err(SdkError::AlreadyShutdown);
        }
        let (sender, receiver) = mpsc::sync_channel(1);
        self.inner
            .message_sender
            .try_send(Message::ForceFlush(sender))
            .map_err(|err| SdkError::InternalFailure(format!("{err}")))?;
        receiver
            .recv_timeout(self.inner.timeout)
            .map_err(|err| match err {
                RecvTimeoutError::Timeout => SdkError::Timeout(self.inner.timeout),
                _ => SdkError::InternalFailure(format!("{err}")),
            })?
    }

    fn shutdown(&self) -> SdkResult {
        if self.inner.is_shutdown.swap(true, Ordering::SeqCst) {
            return Err(SdkError::AlreadyShutdown);
        }

        let (sender, receiver) = mpsc::sync_channel(1);
        self.inner
            .message_sender
            .try_send(Message::Shutdown(sender))
            .map_err(|err| SdkError::InternalFailure(format!("{err}")))?;
        let result = receiver
            .recv_timeout(self.inner.timeout)
            .map_err(|err| match err {
                RecvTimeoutError::Timeout => SdkError::Timeout(self.inner.timeout),
                _ => SdkError::InternalFailure(format!("{err}")),
            })?;

        if let Ok(mut handle) = self.inner.handle.lock() {
            if let Some(handle) = handle.take() {
                let _ = handle.join();
            }
        }
        result
    }

    fn temporality(&self, _kind: InstrumentKind) -> Temporality {
        self.inner.exporter.temporality()
    }
}

/// Configuration for a [`PeriodicReader`].
#[derive(Debug)]
pub struct PeriodicReaderBuilder<E> {
    interval: Duration,
    timeout: Duration,
    exporter: E,
}

impl<E> PeriodicReaderBuilder<E>
where
    E: PushMetricExporter + 'static,
{
    fn new(exporter: E) -> Self {
        let interval = env::var(OTEL_METRIC_EXPORT_INTERVAL)
            .ok()
            .and_then(|v| v.parse().map(Duration::from_millis).ok())
            .unwrap_or(DEFAULT_INTERVAL);
        let timeout = env::var(OTEL_METRIC_EXPORT_TIMEOUT)
            .ok()
            .and_then(|v| v.parse().map(Duration::from_millis).ok())
            .unwrap_or(DEFAULT_TIMEOUT);

        PeriodicReaderBuilder {
            interval,
            timeout,
            exporter,
        }
    }

    /// The time between collections. Ignored when zero.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        if !interval.is_zero() {
            self.interval = interval;
        }
        self
    }

    /// The per-export deadline. Ignored when zero.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        if !timeout.is_zero() {
            self.timeout = timeout;
        }
        self
    }

    /// Build the reader, spawning its worker thread.
    pub fn build(self) -> PeriodicReader {
        PeriodicReader::new(self.exporter, self.interval, self.timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{InMemoryMetricExporter, SdkMeterProvider};
    use crate::Resource;
    use otel::KeyValue;

    #[test]
    fn periodic_reader_exports_on_interval() {
        let exporter = InMemoryMetricExporter::default();
        let reader = PeriodicReader::builder(exporter.clone())
            .with_interval(Duration::from_millis(50))
            .build();
        let provider = SdkMeterProvider::builder()
            .with_reader(reader)
            .with_resource(Resource::builder_empty().build())
            .build();

        let counter = provider.meter("test").i64_counter("ticks").build();
        counter.add(1, &[KeyValue::new("k", "v")]);

        std::thread::sleep(Duration::from_millis(200));
        assert!(!exporter.get_finished_metrics().is_empty());
        provider.shutdown().unwrap();
    }

    #[test]
    fn shutdown_flushes_pending_state() {
        let exporter = InMemoryMetricExporter::default();
        let reader = PeriodicReader::builder(exporter.clone())
            .with_interval(Duration::from_secs(3600))
            .build();
        let provider = SdkMeterProvider::builder()
            .with_reader(reader)
            .with_resource(Resource::builder_empty().build())
            .build();

        let counter = provider.meter("test").i64_counter("ticks").build();
        counter.add(5, &[]);
        provider.shutdown().unwrap();

        let exports = exporter.get_finished_metrics();
        assert_eq!(exports.len(), 1);
        assert!(exporter.is_shutdown_called());
    }
}
