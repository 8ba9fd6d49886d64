use super::{
    AggregateTimeInitiator, Aggregator, AttributeSetFilter, ComputeAggregation, Measure, Number,
    ValueMap,
};
use crate::metrics::data::{self, AggregatedMetrics, Exemplar, HistogramDataPoint};
use crate::metrics::Temporality;
use otel::KeyValue;
use std::sync::Arc;

/// The default explicit bucket boundaries.
pub(crate) const DEFAULT_BUCKET_BOUNDARIES: [f64; 15] = [
    0.0, 5.0, 10.0, 25.0, 50.0, 75.0, 100.0, 250.0, 500.0, 750.0, 1000.0, 2500.0, 5000.0, 7500.0,
    10000.0,
];

pub(crate) struct Buckets<T: Number> {
    counts: Vec<u64>,
    count: u64,
    sum: T,
    min: Option<T>,
    max: Option<T>,
    // one exemplar slot per bucket, holding the latest sampled measurement
    exemplars: Vec<Option<Exemplar<T>>>,
}

impl<T: Number> Aggregator for Buckets<T> {
    type InitConfig = Vec<f64>;

    fn create(bounds: &Vec<f64>) -> Self {
        Buckets {
            counts: vec![0; bounds.len() + 1],
            count: 0,
            sum: T::default(),
            min: None,
            max: None,
            exemplars: vec![None; bounds.len() + 1],
        }
    }
}

/// Summarizes a set of measurements as a bucketed distribution.
///
/// A measurement lands in the bucket whose upper bound is the lowest
/// boundary greater than or equal to the value; values above every
/// boundary land in the implicit `+Inf` bucket.
pub(crate) struct ExplicitBucketHistogram<T: Number> {
    value_map: ValueMap<Buckets<T>>,
    bounds: Vec<f64>,
    init_time: AggregateTimeInitiator,
    temporality: Temporality,
    filter: AttributeSetFilter,
}

impl<T: Number> ExplicitBucketHistogram<T> {
    pub(crate) fn new(
        temporality: Temporality,
        filter: AttributeSetFilter,
        mut bounds: Vec<f64>,
        cardinality_limit: usize,
    ) -> Arc<Self> {
        // boundaries must be sorted and free of duplicates for the bucket
        // lookup to be meaningful
        bounds.retain(|v| !v.is_nan());
        bounds.sort_by(|a, b| a.partial_cmp(b).expect("NaNs filtered"));
        bounds.dedup();

        Arc::new(ExplicitBucketHistogram {
            value_map: ValueMap::new(bounds.clone(), cardinality_limit),
            bounds,
            init_time: AggregateTimeInitiator::default(),
            temporality,
            filter,
        })
    }

    fn data_point(
        attributes: Vec<KeyValue>,
        bounds: &[f64],
        counts: Vec<u64>,
        count: u64,
        sum: T,
        min: Option<T>,
        max: Option<T>,
        exemplars: Vec<Option<Exemplar<T>>>,
    ) -> HistogramDataPoint<T> {
        HistogramDataPoint {
            attributes,
            count,
            bounds: bounds.to_vec(),
            bucket_counts: counts,
            sum,
            min,
            max,
            exemplars: exemplars.into_iter().flatten().collect(),
        }
    }
}

impl<T: Number> Measure<T> for ExplicitBucketHistogram<T> {
    fn call(&self, measurement: T, attributes: &[KeyValue]) {
        let value = measurement.as_f64();
        let index = self.bounds.partition_point(|&bound| bound < value);

        let (aggregated, filtered) = self.filter.apply(attributes);
        self.value_map.measure(&aggregated, |buckets| {
            buckets.counts[index] += 1;
            buckets.count += 1;
            buckets.sum += measurement;
            buckets.min = Some(match buckets.min {
                Some(min) if min < measurement => min,
                _ => measurement,
            });
            buckets.max = Some(match buckets.max {
                Some(max) if max > measurement => max,
                _ => measurement,
            });
            // reservoir of one per bucket: keep the latest
            if let Some(sampled) = sample_exemplar(measurement, &filtered) {
                buckets.exemplars[index] = Some(sampled);
            }
        });
    }
}

/// Build an exemplar for the measurement when it happened inside a
/// sampled span.
fn sample_exemplar<T: Number>(value: T, filtered: &[KeyValue]) -> Option<Exemplar<T>> {
    otel::Context::map_current(|cx| {
        cx.span_context()
            .filter(|sc| sc.is_valid() && sc.is_sampled())
            .map(|sc| Exemplar {
                filtered_attributes: filtered.to_vec(),
                time: otel::time::now(),
                value,
                span_id: sc.span_id(),
                trace_id: sc.trace_id(),
            })
    })
}

impl<T: Number> ComputeAggregation for ExplicitBucketHistogram<T> {
    fn call(&self) -> Option<AggregatedMetrics> {
        let mut data_points = Vec::new();
        let time = match self.temporality {
            Temporality::Delta => {
                let time = self.init_time.delta();
                self.value_map
                    .collect_and_reset(&mut data_points, |attributes, buckets| {
                        Self::data_point(
                            attributes,
                            &self.bounds,
                            buckets.counts,
                            buckets.count,
                            buckets.sum,
                            buckets.min,
                            buckets.max,
                            buckets.exemplars,
                        )
                    });
                time
            }
            Temporality::Cumulative => {
                let time = self.init_time.cumulative();
                self.value_map
                    .collect_readonly(&mut data_points, |attributes, buckets| {
                        Self::data_point(
                            attributes,
                            &self.bounds,
                            buckets.counts.clone(),
                            buckets.count,
                            buckets.sum,
                            buckets.min,
                            buckets.max,
                            buckets.exemplars.clone(),
                        )
                    });
                time
            }
        };

        if data_points.is_empty() {
            return None;
        }

        Some(T::wrap_data(
            data::Histogram {
                data_points,
                start_time: time.start,
                time: time.current,
                temporality: self.temporality,
            }
            .into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::data::MetricData;
    use crate::metrics::internal::DEFAULT_CARDINALITY_LIMIT;

    fn collect(histogram: &ExplicitBucketHistogram<i64>) -> Vec<HistogramDataPoint<i64>> {
        match ComputeAggregation::call(&*histogram) {
            Some(AggregatedMetrics::I64(MetricData::Histogram(data))) => data.data_points,
            None => Vec::new(),
            other => panic!("unexpected aggregation {other:?}"),
        }
    }

    #[test]
    fn default_boundaries_bucket_each_value() {
        let histogram = ExplicitBucketHistogram::new(
            Temporality::Cumulative,
            AttributeSetFilter::default(),
            DEFAULT_BUCKET_BOUNDARIES.to_vec(),
            DEFAULT_CARDINALITY_LIMIT,
        );
        for value in [1, 6, 11, 30] {
            Measure::call(&*histogram, value, &[]);
        }

        let points = collect(&histogram);
        assert_eq!(points.len(), 1);
        let point = &points[0];
        assert_eq!(point.count, 4);
        assert_eq!(point.sum, 48);
        assert_eq!(point.bucket_counts.len(), DEFAULT_BUCKET_BOUNDARIES.len() + 1);
        // 1 ∈ (0,5], 6 ∈ (5,10], 11 ∈ (10,25], 30 ∈ (25,50]
        let mut expected = vec![0u64; DEFAULT_BUCKET_BOUNDARIES.len() + 1];
        expected[1] = 1;
        expected[2] = 1;
        expected[3] = 1;
        expected[4] = 1;
        assert_eq!(point.bucket_counts, expected);
        assert_eq!(point.min, Some(1));
        assert_eq!(point.max, Some(30));
    }

    #[test]
    fn boundary_values_are_upper_inclusive() {
        let histogram = ExplicitBucketHistogram::new(
            Temporality::Cumulative,
            AttributeSetFilter::default(),
            vec![0.0, 5.0, 10.0],
            DEFAULT_CARDINALITY_LIMIT,
        );
        Measure::call(&*histogram, 5, &[]); // exactly on a boundary: bucket with bound 5
        Measure::call(&*histogram, 11, &[]); // above all bounds: +Inf bucket

        let points = collect(&histogram);
        assert_eq!(points[0].bucket_counts, vec![0, 1, 0, 1]);
    }

    #[test]
    fn delta_resets_buckets() {
        let histogram = ExplicitBucketHistogram::new(
            Temporality::Delta,
            AttributeSetFilter::default(),
            vec![10.0],
            DEFAULT_CARDINALITY_LIMIT,
        );
        Measure::call(&*histogram, 1, &[]);
        assert_eq!(collect(&histogram).len(), 1);
        assert!(collect(&histogram).is_empty());
    }
}
