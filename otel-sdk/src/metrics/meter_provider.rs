use crate::metrics::meter::SdkMeter;
use crate::metrics::pipeline::Pipeline;
use crate::metrics::reader::MetricReader;
use crate::metrics::view::View;
use crate::{Resource, SdkError, SdkResult};
use otel::{otel_debug, InstrumentationScope};
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Creates and manages meters, and owns one aggregation pipeline per
/// registered reader.
///
/// Same lifecycle as the other providers: cheap clones sharing state,
/// idempotent shutdown, implicit shutdown when the last handle drops.
#[derive(Clone, Debug)]
pub struct SdkMeterProvider {
    inner: Arc<MeterProviderInner>,
}

struct MeterProviderInner {
    pipelines: Arc<Vec<Arc<Pipeline>>>,
    is_shutdown: AtomicBool,
}

impl std::fmt::Debug for MeterProviderInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeterProviderInner")
            .field("pipelines", &self.pipelines.len())
            .finish()
    }
}

impl Drop for MeterProviderInner {
    fn drop(&mut self) {
        if !self.is_shutdown.load(Ordering::SeqCst) {
            otel_debug!(
                name: "MeterProvider.ShutdownOnDrop",
                message = "provider dropped without explicit shutdown, shutting readers down"
            );
            for pipeline in self.pipelines.iter() {
                let _ = pipeline.reader.shutdown();
            }
        }
    }
}

impl SdkMeterProvider {
    /// Return a builder for a provider.
    pub fn builder() -> MeterProviderBuilder {
        MeterProviderBuilder::default()
    }

    /// Create a meter reporting under the given scope name.
    pub fn meter(&self, name: impl Into<Cow<'static, str>>) -> SdkMeter {
        self.meter_with_scope(InstrumentationScope::builder(name).build())
    }

    /// Create a meter reporting under the given scope.
    pub fn meter_with_scope(&self, scope: InstrumentationScope) -> SdkMeter {
        SdkMeter::new(scope, self.inner.pipelines.clone())
    }

    /// Ask every reader to export its current state, blocking until done.
    pub fn force_flush(&self) -> SdkResult {
        let mut result = Ok(());
        for pipeline in self.inner.pipelines.iter() {
            if let Err(err) = pipeline.reader.force_flush() {
                result = Err(err);
            }
        }
        result
    }

    /// Quiesce every reader, flushing remaining state through their
    /// exporters.
    pub fn shutdown(&self) -> SdkResult {
        if self
            .inner
            .is_shutdown
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SdkError::AlreadyShutdown);
        }

        let mut result = Ok(());
        for pipeline in self.inner.pipelines.iter() {
            match pipeline.reader.shutdown() {
                Ok(()) | Err(SdkError::AlreadyShutdown) => {}
                Err(err) => result = Err(err),
            }
        }
        result
    }
}

/// Configures an [`SdkMeterProvider`].
#[derive(Debug, Default)]
pub struct MeterProviderBuilder {
    readers: Vec<Box<dyn MetricReader>>,
    views: Vec<View>,
    resource: Option<Resource>,
}

impl MeterProviderBuilder {
    /// Register a reader; each reader gets an independent pipeline of
    /// aggregate state.
    pub fn with_reader<R: MetricReader>(mut self, reader: R) -> Self {
        self.readers.push(Box::new(reader));
        self
    }

    /// Register a view rewriting matched instrument streams.
    pub fn with_view(mut self, view: View) -> Self {
        self.views.push(view);
        self
    }

    /// Use the given resource; defaults to the detector-assembled one.
    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resource = Some(resource);
        self
    }

    /// Build the provider, wiring every reader to its pipeline.
    pub fn build(self) -> SdkMeterProvider {
        let resource = self.resource.unwrap_or_else(|| Resource::builder().build());
        let pipelines: Vec<Arc<Pipeline>> = self
            .readers
            .into_iter()
            .map(|reader| {
                let pipeline = Arc::new(Pipeline::new(
                    resource.clone(),
                    reader,
                    self.views.clone(),
                ));
                pipeline.reader.register_pipeline(Arc::downgrade(&pipeline));
                pipeline
            })
            .collect();

        SdkMeterProvider {
            inner: Arc::new(MeterProviderInner {
                pipelines: Arc::new(pipelines),
                is_shutdown: AtomicBool::new(false),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::data::{AggregatedMetrics, MetricData, ResourceMetrics, Temporality};
    use crate::metrics::{Aggregation, InstrumentKind, ManualReader, View};
    use otel::KeyValue;
    use std::sync::Weak;

    /// A `ManualReader` that can be handed to a provider while the test
    /// keeps a collecting handle.
    #[derive(Debug, Clone)]
    struct SharedReader(Arc<ManualReader>);

    impl SharedReader {
        fn new(temporality: Temporality) -> Self {
            SharedReader(Arc::new(
                ManualReader::builder().with_temporality(temporality).build(),
            ))
        }

        fn collect(&self) -> ResourceMetrics {
            let mut rm = ResourceMetrics::default();
            self.0.collect(&mut rm).unwrap();
            rm
        }
    }

    impl MetricReader for SharedReader {
        fn register_pipeline(&self, pipeline: Weak<Pipeline>) {
            self.0.register_pipeline(pipeline)
        }
        fn collect(&self, rm: &mut ResourceMetrics) -> SdkResult {
            self.0.collect(rm)
        }
        fn force_flush(&self) -> SdkResult {
            self.0.force_flush()
        }
        fn shutdown(&self) -> SdkResult {
            self.0.shutdown()
        }
        fn temporality(&self, kind: InstrumentKind) -> Temporality {
            self.0.temporality(kind)
        }
    }

    fn provider_with(reader: &SharedReader, views: Vec<View>) -> SdkMeterProvider {
        let mut builder = SdkMeterProvider::builder()
            .with_reader(reader.clone())
            .with_resource(Resource::builder_empty().build());
        for view in views {
            builder = builder.with_view(view);
        }
        builder.build()
    }

    fn as_i64_sum(metric: &crate::metrics::data::Metric) -> &crate::metrics::data::Sum<i64> {
        match &metric.data {
            AggregatedMetrics::I64(MetricData::Sum(sum)) => sum,
            other => panic!("expected an i64 sum, got {other:?}"),
        }
    }

    #[test]
    fn counter_sum_invariance() {
        let reader = SharedReader::new(Temporality::Cumulative);
        let provider = provider_with(&reader, vec![]);
        let counter = provider.meter("app").i64_counter("requests").build();
        for _ in 0..5 {
            counter.add(1, &[KeyValue::new("route", "a")]);
        }
        for _ in 0..3 {
            counter.add(2, &[KeyValue::new("route", "b")]);
        }

        let rm = reader.collect();
        assert_eq!(rm.scope_metrics.len(), 1);
        let metric = &rm.scope_metrics[0].metrics[0];
        assert_eq!(metric.name, "requests");

        let sum = as_i64_sum(metric);
        assert!(sum.is_monotonic);
        assert_eq!(sum.temporality, Temporality::Cumulative);

        let mut values: Vec<i64> = sum.data_points.iter().map(|p| p.value).collect();
        values.sort_unstable();
        assert_eq!(values, vec![5, 6]);
        let _ = provider.shutdown();
    }

    #[test]
    fn view_renames_and_filters() {
        let reader = SharedReader::new(Temporality::Cumulative);
        let provider = provider_with(
            &reader,
            vec![View::new("requests")
                .with_name("requests_total")
                .with_attribute_filter(["route"])],
        );

        let counter = provider.meter("app").i64_counter("requests").build();
        counter.add(1, &[KeyValue::new("route", "a"), KeyValue::new("user", "u1")]);
        counter.add(1, &[KeyValue::new("route", "a"), KeyValue::new("user", "u2")]);

        let rm = reader.collect();
        let metric = &rm.scope_metrics[0].metrics[0];
        assert_eq!(metric.name, "requests_total");
        let sum = as_i64_sum(metric);
        assert_eq!(sum.data_points.len(), 1);
        assert_eq!(sum.data_points[0].value, 2);
        let _ = provider.shutdown();
    }

    #[test]
    fn observable_counter_reports_observed_value() {
        let reader = SharedReader::new(Temporality::Cumulative);
        let provider = provider_with(&reader, vec![]);
        let _observable = provider
            .meter("app")
            .i64_observable_counter("queue.depth")
            .with_callback(|observer| observer.observe(42, &[]))
            .build();

        // callbacks re-run and their observations replace on every collect
        for _ in 0..2 {
            let rm = reader.collect();
            let sum = as_i64_sum(&rm.scope_metrics[0].metrics[0]);
            assert_eq!(sum.data_points[0].value, 42);
        }
        let _ = provider.shutdown();
    }

    #[test]
    fn panicking_callback_contribution_is_dropped() {
        let reader = SharedReader::new(Temporality::Cumulative);
        let provider = provider_with(&reader, vec![]);
        let _bad = provider
            .meter("app")
            .i64_observable_gauge("broken")
            .with_callback(|observer| {
                observer.observe(1, &[]);
                panic!("callback failure");
            })
            .build();
        let _good = provider
            .meter("app")
            .i64_observable_gauge("working")
            .with_callback(|observer| observer.observe(7, &[]))
            .build();

        let rm = reader.collect();
        let metrics = &rm.scope_metrics[0].metrics;
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].name, "working");
        let _ = provider.shutdown();
    }

    #[test]
    fn invalid_instrument_name_records_nothing() {
        let reader = SharedReader::new(Temporality::Cumulative);
        let provider = provider_with(&reader, vec![]);
        let counter = provider.meter("app").i64_counter("9bad name").build();
        counter.add(1, &[]);
        assert!(reader.collect().scope_metrics.is_empty());
        let _ = provider.shutdown();
    }

    #[test]
    fn shutdown_is_idempotent() {
        let reader = SharedReader::new(Temporality::Cumulative);
        let provider = provider_with(&reader, vec![]);
        assert_eq!(provider.shutdown(), Ok(()));
        assert_eq!(provider.shutdown(), Err(SdkError::AlreadyShutdown));
    }

    #[test]
    fn histogram_default_bucketing() {
        let reader = SharedReader::new(Temporality::Cumulative);
        let provider = provider_with(&reader, vec![]);
        let histogram = provider.meter("app").i64_histogram("latency").build();
        for value in [1, 6, 11, 30] {
            histogram.record(value, &[]);
        }

        let rm = reader.collect();
        let metric = &rm.scope_metrics[0].metrics[0];
        let AggregatedMetrics::I64(MetricData::Histogram(histogram)) = &metric.data else {
            panic!("expected a histogram");
        };
        let point = &histogram.data_points[0];
        assert_eq!(point.count, 4);
        assert_eq!(point.sum, 48);
        assert_eq!(point.bounds.len(), 15);
        assert_eq!(point.bucket_counts.len(), 16);
        assert_eq!(&point.bucket_counts[1..5], &[1, 1, 1, 1]);
        let _ = provider.shutdown();
    }

    #[test]
    fn delta_reader_resets_between_collections() {
        let reader = SharedReader::new(Temporality::Delta);
        let provider = provider_with(&reader, vec![]);
        let counter = provider.meter("app").i64_counter("requests").build();
        counter.add(3, &[]);

        let rm = reader.collect();
        let sum = as_i64_sum(&rm.scope_metrics[0].metrics[0]);
        assert_eq!(sum.temporality, Temporality::Delta);
        assert_eq!(sum.data_points[0].value, 3);

        // nothing recorded since: nothing reported
        assert!(reader.collect().scope_metrics.is_empty());

        counter.add(2, &[]);
        let rm = reader.collect();
        assert_eq!(as_i64_sum(&rm.scope_metrics[0].metrics[0]).data_points[0].value, 2);
        let _ = provider.shutdown();
    }

    #[test]
    fn drop_aggregation_suppresses_stream() {
        let reader = SharedReader::new(Temporality::Cumulative);
        let provider = provider_with(
            &reader,
            vec![View::new("noisy.*").with_aggregation(Aggregation::Drop)],
        );

        let counter = provider.meter("app").i64_counter("noisy.counter").build();
        counter.add(1, &[]);
        assert!(reader.collect().scope_metrics.is_empty());
        let _ = provider.shutdown();
    }

    #[test]
    fn two_readers_see_independent_state() {
        let cumulative = SharedReader::new(Temporality::Cumulative);
        let delta = SharedReader::new(Temporality::Delta);
        let provider = SdkMeterProvider::builder()
            .with_reader(cumulative.clone())
            .with_reader(delta.clone())
            .with_resource(Resource::builder_empty().build())
            .build();

        let counter = provider.meter("app").i64_counter("requests").build();
        counter.add(5, &[]);

        assert_eq!(
            as_i64_sum(&cumulative.collect().scope_metrics[0].metrics[0]).data_points[0].value,
            5
        );
        assert_eq!(
            as_i64_sum(&delta.collect().scope_metrics[0].metrics[0]).data_points[0].value,
            5
        );

        counter.add(1, &[]);
        // cumulative keeps the running total, delta reports the change
        assert_eq!(
            as_i64_sum(&cumulative.collect().scope_metrics[0].metrics[0]).data_points[0].value,
            6
        );
        assert_eq!(
            as_i64_sum(&delta.collect().scope_metrics[0].metrics[0]).data_points[0].value,
            1
        );
        let _ = provider.shutdown();
    }
}
