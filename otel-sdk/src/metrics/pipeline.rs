//! The per-reader pipeline: registered instrument streams and the
//! machinery that resolves instruments through views into aggregate
//! storage.

use crate::metrics::data::{Metric, ResourceMetrics, ScopeMetrics};
use crate::metrics::instrument::{Aggregation, InstrumentDescriptor, Observer};
use crate::metrics::internal::{
    AttributeSetFilter, ComputeAggregation, ExplicitBucketHistogram, LastValue, Measure, Number,
    PrecomputedSum, Sum, DEFAULT_BUCKET_BOUNDARIES, DEFAULT_CARDINALITY_LIMIT,
};
use crate::metrics::reader::MetricReader;
use crate::metrics::view::{Stream, View};
use crate::{Resource, SdkResult};
use otel::{otel_debug, InstrumentationScope};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

/// The aggregation state of one reader.
///
/// Each reader registered on a meter provider gets its own pipeline, so
/// readers never share (or double-report) aggregate state. The reader
/// holds a weak reference back to the pipeline and pulls from it on
/// collection.
pub struct Pipeline {
    pub(crate) resource: Resource,
    pub(crate) reader: Box<dyn MetricReader>,
    pub(crate) views: Vec<View>,
    inner: Mutex<PipelineInner>,
}

#[derive(Default)]
struct PipelineInner {
    aggregations: HashMap<InstrumentationScope, Vec<InstrumentSync>>,
    callbacks: Vec<Box<dyn Fn() + Send + Sync>>,
}

struct InstrumentSync {
    name: Cow<'static, str>,
    description: Cow<'static, str>,
    unit: Cow<'static, str>,
    comp_agg: Arc<dyn ComputeAggregation>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("resource", &self.resource)
            .field("reader", &self.reader)
            .finish()
    }
}

impl Pipeline {
    pub(crate) fn new(resource: Resource, reader: Box<dyn MetricReader>, views: Vec<View>) -> Self {
        Pipeline {
            resource,
            reader,
            views,
            inner: Mutex::new(PipelineInner::default()),
        }
    }

    fn add_sync(&self, scope: InstrumentationScope, instrument: InstrumentSync) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.aggregations.entry(scope).or_default().push(instrument);
        }
    }

    fn add_callback(&self, callback: Box<dyn Fn() + Send + Sync>) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.callbacks.push(callback);
        }
    }

    /// Materialize every registered stream into `rm`.
    ///
    /// Observable callbacks run first, refreshing their storage; then each
    /// stream's aggregate state is read out. Collection is atomic per
    /// instrument stream: a concurrent measurement lands wholly in this
    /// collection or wholly in the next.
    pub(crate) fn produce(&self, rm: &mut ResourceMetrics) -> SdkResult {
        rm.resource = self.resource.clone();
        rm.scope_metrics.clear();

        let inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };

        for callback in &inner.callbacks {
            callback();
        }

        for (scope, instruments) in inner.aggregations.iter() {
            let metrics = instruments
                .iter()
                .filter_map(|instrument| {
                    instrument.comp_agg.call().map(|data| Metric {
                        name: instrument.name.clone(),
                        description: instrument.description.clone(),
                        unit: instrument.unit.clone(),
                        data,
                    })
                })
                .collect::<Vec<_>>();
            if !metrics.is_empty() {
                rm.scope_metrics.push(ScopeMetrics {
                    scope: scope.clone(),
                    metrics,
                });
            }
        }

        Ok(())
    }
}

fn default_aggregation(descriptor: &InstrumentDescriptor, boundaries: Option<&[f64]>) -> Aggregation {
    use crate::metrics::instrument::InstrumentKind::*;
    match descriptor.kind {
        Counter | UpDownCounter | ObservableCounter | ObservableUpDownCounter => Aggregation::Sum,
        Gauge | ObservableGauge => Aggregation::LastValue,
        Histogram => Aggregation::ExplicitBucketHistogram {
            boundaries: boundaries
                .map(|b| b.to_vec())
                .unwrap_or_else(|| DEFAULT_BUCKET_BOUNDARIES.to_vec()),
        },
    }
}

/// Resolve an instrument through one pipeline's views into aggregate
/// storage, registering the collect side and returning the update side.
fn build_streams_for_pipeline<T: Number>(
    pipeline: &Pipeline,
    scope: &InstrumentationScope,
    descriptor: &InstrumentDescriptor,
    boundaries: Option<&[f64]>,
) -> Vec<Arc<dyn Measure<T>>> {
    let temporality = pipeline.reader.temporality(descriptor.kind);
    let mut streams: Vec<Stream> = pipeline
        .views
        .iter()
        .filter(|view| view.matches(&descriptor.name))
        .map(|view| view.stream(descriptor))
        .collect();
    if streams.is_empty() {
        streams.push(Stream::default_for(descriptor));
    }

    let mut measures: Vec<Arc<dyn Measure<T>>> = Vec::with_capacity(streams.len());
    for stream in streams {
        let aggregation = stream
            .aggregation
            .clone()
            .unwrap_or_else(|| default_aggregation(descriptor, boundaries));
        if aggregation == Aggregation::Drop {
            continue;
        }

        let filter = AttributeSetFilter::new(stream.attribute_keys.clone());
        let cardinality_limit = stream.cardinality_limit.unwrap_or(DEFAULT_CARDINALITY_LIMIT);

        let (measure, comp_agg): (Arc<dyn Measure<T>>, Arc<dyn ComputeAggregation>) =
            match aggregation {
                Aggregation::Sum if descriptor.kind.is_observable() => {
                    let aggregate = PrecomputedSum::new(
                        temporality,
                        filter,
                        descriptor.kind.is_monotonic(),
                        cardinality_limit,
                    );
                    (aggregate.clone(), aggregate)
                }
                Aggregation::Sum => {
                    let aggregate = Sum::new(
                        temporality,
                        filter,
                        descriptor.kind.is_monotonic(),
                        cardinality_limit,
                    );
                    (aggregate.clone(), aggregate)
                }
                Aggregation::LastValue => {
                    let aggregate = LastValue::new(temporality, filter, cardinality_limit);
                    (aggregate.clone(), aggregate)
                }
                Aggregation::ExplicitBucketHistogram { boundaries } => {
                    let aggregate = ExplicitBucketHistogram::new(
                        temporality,
                        filter,
                        boundaries,
                        cardinality_limit,
                    );
                    (aggregate.clone(), aggregate)
                }
                Aggregation::Drop => continue,
            };

        pipeline.add_sync(
            scope.clone(),
            InstrumentSync {
                name: stream.name,
                description: stream.description,
                unit: stream.unit,
                comp_agg,
            },
        );
        measures.push(measure);
    }

    measures
}

/// Resolve a synchronous instrument across every pipeline.
pub(crate) fn resolve_measures<T: Number>(
    pipelines: &[Arc<Pipeline>],
    scope: &InstrumentationScope,
    descriptor: &InstrumentDescriptor,
    boundaries: Option<&[f64]>,
) -> Vec<Arc<dyn Measure<T>>> {
    let mut measures = Vec::new();
    for pipeline in pipelines {
        measures.extend(build_streams_for_pipeline::<T>(
            pipeline, scope, descriptor, boundaries,
        ));
    }
    measures
}

/// The callbacks of one observable instrument.
pub(crate) type Callback<T> = Box<dyn Fn(&Observer<T>) + Send + Sync>;

/// Resolve an observable instrument across every pipeline, registering a
/// per-pipeline collection hook that runs the callbacks and replaces the
/// stored values with their observations.
pub(crate) fn register_async_instrument<T: Number>(
    pipelines: &[Arc<Pipeline>],
    scope: &InstrumentationScope,
    descriptor: &InstrumentDescriptor,
    callbacks: Vec<Callback<T>>,
) {
    let callbacks = Arc::new(callbacks);
    for pipeline in pipelines {
        let measures = build_streams_for_pipeline::<T>(pipeline, scope, descriptor, None);
        if measures.is_empty() {
            continue;
        }
        let callbacks = callbacks.clone();
        pipeline.add_callback(Box::new(move || {
            for measure in &measures {
                measure.reset_observations();
            }
            for callback in callbacks.iter() {
                let observer = Observer::new();
                match catch_unwind(AssertUnwindSafe(|| callback(&observer))) {
                    Ok(()) => {
                        for (value, attributes) in observer.take() {
                            for measure in &measures {
                                measure.call(value, &attributes);
                            }
                        }
                    }
                    Err(_) => {
                        // the faulty callback's observations die with its
                        // observer buffer
                        otel_debug!(
                            name: "Observable.CallbackFailed",
                            message = "observable instrument callback panicked, observations discarded"
                        );
                    }
                }
            }
        }));
    }
}
