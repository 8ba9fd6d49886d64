use crate::metrics::data::{ResourceMetrics, Temporality};
use crate::metrics::instrument::InstrumentKind;
use crate::metrics::pipeline::Pipeline;
use crate::SdkResult;
use std::fmt::Debug;
use std::sync::Weak;

/// A polling subscriber to a meter provider.
///
/// Registering a reader on a provider gives it a pipeline of aggregate
/// state to pull from; `collect` asks every instrument to materialize its
/// current point set. `force_flush` and `shutdown` follow the same
/// quiescence rules as span processors: flush blocks until delivered or
/// timed out, shutdown is idempotent and stops all further collection.
pub trait MetricReader: Send + Sync + Debug + 'static {
    /// Called by the provider at build time with the pipeline this reader
    /// pulls from.
    fn register_pipeline(&self, pipeline: Weak<Pipeline>);

    /// Materialize the current point set of every instrument into `rm`.
    fn collect(&self, rm: &mut ResourceMetrics) -> SdkResult;

    /// Export everything collected so far, blocking until delivered or
    /// timed out.
    fn force_flush(&self) -> SdkResult;

    /// Flush, then stop collecting. Idempotent.
    fn shutdown(&self) -> SdkResult;

    /// The temporality this reader wants for the given instrument kind.
    fn temporality(&self, kind: InstrumentKind) -> Temporality;
}
