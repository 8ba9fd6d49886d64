use crate::metrics::data::{ResourceMetrics, Temporality};
use crate::metrics::instrument::InstrumentKind;
use crate::metrics::pipeline::Pipeline;
use crate::metrics::reader::MetricReader;
use crate::{SdkError, SdkResult};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, Weak};

/// A [`MetricReader`] that collects only when asked.
///
/// Useful for tests and for embedding collection into an external
/// scheduler; production pipelines normally use the periodic reader.
pub struct ManualReader {
    pipeline: Mutex<Option<Weak<Pipeline>>>,
    temporality: Temporality,
    is_shutdown: AtomicBool,
}

impl fmt::Debug for ManualReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualReader")
            .field("temporality", &self.temporality)
            .finish()
    }
}

impl Default for ManualReader {
    fn default() -> Self {
        ManualReader::builder().build()
    }
}

impl ManualReader {
    /// A builder for a manual reader.
    pub fn builder() -> ManualReaderBuilder {
        ManualReaderBuilder::default()
    }
}

impl MetricReader for ManualReader {
    fn register_pipeline(&self, pipeline: Weak<Pipeline>) {
        if let Ok(mut stored) = self.pipeline.lock() {
            *stored = Some(pipeline);
        }
    }

    fn collect(&self, rm: &mut ResourceMetrics) -> SdkResult {
        if self.is_shutdown.load(Ordering::Relaxed) {
            return Err(SdkError::AlreadyShutdown);
        }
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

    fn force_flush(&self) -> SdkResult {
        Ok(())
    }

    fn shutdown(&self) -> SdkResult {
        if self.is_shutdown.swap(true, Ordering::SeqCst) {
            return Err(SdkError::AlreadyShutdown);
        }
        Ok(())
    }

    fn temporality(&self, _kind: InstrumentKind) -> Temporality {
        self.temporality
    }
}

/// Configuration for a [`ManualReader`].
#[derive(Debug, Default)]
pub struct ManualReaderBuilder {
    temporality: Temporality,
}

impl ManualReaderBuilder {
    /// Set the temporality for every instrument kind. Defaults to
    /// cumulative.
    pub fn with_temporality(mut self, temporality: Temporality) -> Self {
        self.temporality = temporality;
        self
    }

    /// Build the reader.
    pub fn build(self) -> ManualReader {
        ManualReader {
            pipeline: Mutex::new(None),
            temporality: self.temporality,
            is_shutdown: AtomicBool::new(false),
        }
    }
}
