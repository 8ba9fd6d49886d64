use crate::metrics::data::{ResourceMetrics, Temporality};
use crate::SdkResult;
use futures_util::future::BoxFuture;
use std::fmt::Debug;

/// Serializes collected metrics and delivers them to an external
/// receiver.
///
/// Driven by the periodic reader at its collection cadence. The
/// temporality an exporter reports determines the temporality of every
/// pipeline feeding it.
pub trait PushMetricExporter: Send + Sync + Debug {
    /// Export the given metrics.
    ///
    /// An empty collection is never passed down.
    fn export(&self, metrics: &ResourceMetrics) -> BoxFuture<'static, SdkResult>;

    /// Await any in-flight exports.
    fn force_flush(&self) -> SdkResult {
        Ok(())
    }

    /// Shut the exporter down, releasing transport resources. Idempotent.
    fn shutdown(&self);

    /// The temporality this exporter consumes.
    fn temporality(&self) -> Temporality;
}
