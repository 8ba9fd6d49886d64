//! The materialized output of metric collection.
//!
//! A collection pass walks every instrument's aggregation storage and
//! produces a [`ResourceMetrics`] tree: resource → scope → metric →
//! points. The tree is what metric exporters consume.

mod temporality;
pub use temporality::Temporality;

use crate::Resource;
use otel::trace::{SpanId, TraceId};
use otel::{InstrumentationScope, KeyValue};
use std::borrow::Cow;
use std::time::SystemTime;

/// A collection of [`ScopeMetrics`] and the associated [`Resource`].
#[derive(Clone, Debug)]
pub struct ResourceMetrics {
    /// The entity that collected the metrics.
    pub resource: Resource,
    /// The collection of metrics with unique [`InstrumentationScope`]s.
    pub scope_metrics: Vec<ScopeMetrics>,
}

impl Default for ResourceMetrics {
    fn default() -> Self {
        ResourceMetrics {
            resource: Resource::empty(),
            scope_metrics: Vec::new(),
        }
    }
}

/// A collection of metrics produced by a single meter scope.
#[derive(Clone, Debug, Default)]
pub struct ScopeMetrics {
    /// The [`InstrumentationScope`] that the meter was created with.
    pub scope: InstrumentationScope,
    /// The list of aggregations created by the meter.
    pub metrics: Vec<Metric>,
}

/// A collection of one or more aggregated time series.
#[derive(Clone, Debug)]
pub struct Metric {
    /// The name of the instrument that created this data.
    pub name: Cow<'static, str>,
    /// The description of the instrument, which can be used in documentation.
    pub description: Cow<'static, str>,
    /// The unit in which the instrument reports.
    pub unit: Cow<'static, str>,
    /// The aggregated data.
    pub data: AggregatedMetrics,
}

/// Aggregated data from an instrument, tagged with its value kind.
#[derive(Clone, Debug)]
pub enum AggregatedMetrics {
    /// Metric data of `f64` values.
    F64(MetricData<f64>),
    /// Metric data of `i64` values.
    I64(MetricData<i64>),
}

/// Metric data of a specific value type.
#[derive(Clone, Debug)]
pub enum MetricData<T> {
    /// Last-value points.
    Gauge(Gauge<T>),
    /// Running-total points.
    Sum(Sum<T>),
    /// Bucketed distribution points.
    Histogram(Histogram<T>),
}

impl From<MetricData<f64>> for AggregatedMetrics {
    fn from(data: MetricData<f64>) -> Self {
        AggregatedMetrics::F64(data)
    }
}

impl From<MetricData<i64>> for AggregatedMetrics {
    fn from(data: MetricData<i64>) -> Self {
        AggregatedMetrics::I64(data)
    }
}

impl<T> From<Gauge<T>> for MetricData<T> {
    fn from(data: Gauge<T>) -> Self {
        MetricData::Gauge(data)
    }
}

impl<T> From<Sum<T>> for MetricData<T> {
    fn from(data: Sum<T>) -> Self {
        MetricData::Sum(data)
    }
}

impl<T> From<Histogram<T>> for MetricData<T> {
    fn from(data: Histogram<T>) -> Self {
        MetricData::Histogram(data)
    }
}

/// A measurement of the current value of an instrument.
#[derive(Clone, Debug)]
pub struct Gauge<T> {
    /// Represents individual aggregated measurements with unique attributes.
    pub data_points: Vec<GaugeDataPoint<T>>,
    /// The time when the time series was started.
    pub start_time: Option<SystemTime>,
    /// The time when the time series was recorded.
    pub time: SystemTime,
}

/// An individual gauge data point.
#[derive(Debug, Clone)]
pub struct GaugeDataPoint<T> {
    /// Attributes which identify the time series.
    pub attributes: Vec<KeyValue>,
    /// The value of this data point.
    pub value: T,
    /// The sampled measurements collected during the time series.
    pub exemplars: Vec<Exemplar<T>>,
}

/// Represents a sum of numeric measurements.
#[derive(Clone, Debug)]
pub struct Sum<T> {
    /// Represents individual aggregated measurements with unique attributes.
    pub data_points: Vec<SumDataPoint<T>>,
    /// The time when the time series was started.
    pub start_time: SystemTime,
    /// The time when the time series was recorded.
    pub time: SystemTime,
    /// Describes if the aggregation is reported as the change from the last
    /// report time, or the cumulative changes since a fixed start time.
    pub temporality: Temporality,
    /// Whether this aggregation only increases or decreases.
    pub is_monotonic: bool,
}

/// An individual sum data point.
#[derive(Debug, Clone)]
pub struct SumDataPoint<T> {
    /// Attributes which identify the time series.
    pub attributes: Vec<KeyValue>,
    /// The value of this data point.
    pub value: T,
    /// The sampled measurements collected during the time series.
    pub exemplars: Vec<Exemplar<T>>,
}

/// Represents the histogram of all measurements of values from an
/// instrument.
#[derive(Clone, Debug)]
pub struct Histogram<T> {
    /// Individual aggregated measurements with unique attributes.
    pub data_points: Vec<HistogramDataPoint<T>>,
    /// The time when the time series was started.
    pub start_time: SystemTime,
    /// The time when the time series was recorded.
    pub time: SystemTime,
    /// Describes if the aggregation is reported as the change from the last
    /// report time, or the cumulative changes since a fixed start time.
    pub temporality: Temporality,
}

/// A single histogram data point.
#[derive(Debug, Clone)]
pub struct HistogramDataPoint<T> {
    /// Attributes which identify the time series.
    pub attributes: Vec<KeyValue>,
    /// The number of updates this histogram has been calculated with.
    pub count: u64,
    /// The upper bounds of the buckets of the histogram.
    ///
    /// Because the last boundary is +infinity this one is implied.
    pub bounds: Vec<f64>,
    /// The count of each of the buckets.
    pub bucket_counts: Vec<u64>,
    /// The sum of the values recorded.
    pub sum: T,
    /// The minimum value recorded.
    pub min: Option<T>,
    /// The maximum value recorded.
    pub max: Option<T>,
    /// The sampled measurements collected during the time series.
    pub exemplars: Vec<Exemplar<T>>,
}

/// A measurement sampled from a time series providing a typical example.
#[derive(Debug, Clone)]
pub struct Exemplar<T> {
    /// The attributes recorded with the measurement but filtered out of the
    /// time series' aggregated data.
    pub filtered_attributes: Vec<KeyValue>,
    /// The time when the measurement was recorded.
    pub time: SystemTime,
    /// The measured value.
    pub value: T,
    /// The ID of the span that was active during the measurement.
    ///
    /// `SpanId::INVALID` if no span was active.
    pub span_id: SpanId,
    /// The ID of the trace the active span belonged to.
    pub trace_id: TraceId,
}
