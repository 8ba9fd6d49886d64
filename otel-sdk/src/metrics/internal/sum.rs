use super::{
    AggregateTimeInitiator, Aggregator, AttributeSetFilter, ComputeAggregation, ExemplarReservoir,
    Measure, Number, ValueMap,
};
use crate::metrics::data::{self, AggregatedMetrics, SumDataPoint};
use crate::metrics::Temporality;
use otel::{otel_debug, KeyValue};
use std::sync::Arc;

/// Exemplar reservoir size for scalar aggregates.
pub(crate) const SCALAR_RESERVOIR_SIZE: usize = 10;

pub(crate) struct Increment<T: Number> {
    value: T,
    exemplars: ExemplarReservoir<T>,
}

impl<T: Number> Aggregator for Increment<T> {
    type InitConfig = ();

    fn create(_init: &()) -> Self {
        Increment {
            value: T::default(),
            exemplars: ExemplarReservoir::new(SCALAR_RESERVOIR_SIZE),
        }
    }
}

/// Summarizes a set of measurements as their arithmetic sum.
///
/// Backs both `Counter` (monotonic) and `UpDownCounter` instruments.
pub(crate) struct Sum<T: Number> {
    value_map: ValueMap<Increment<T>>,
    init_time: AggregateTimeInitiator,
    temporality: Temporality,
    filter: AttributeSetFilter,
    monotonic: bool,
}

impl<T: Number> Sum<T> {
    pub(crate) fn new(
        temporality: Temporality,
        filter: AttributeSetFilter,
        monotonic: bool,
        cardinality_limit: usize,
    ) -> Arc<Self> {
        Arc::new(Sum {
            value_map: ValueMap::new((), cardinality_limit),
            init_time: AggregateTimeInitiator::default(),
            temporality,
            filter,
            monotonic,
        })
    }
}

impl<T: Number> Measure<T> for Sum<T> {
    fn call(&self, measurement: T, attributes: &[KeyValue]) {
        if self.monotonic && measurement.is_negative() {
            otel_debug!(
                name: "Sum.NegativeValueOnMonotonic",
                message = "negative value rejected by a monotonic counter"
            );
            return;
        }

        let (aggregated, filtered) = self.filter.apply(attributes);
        self.value_map.measure(&aggregated, |tracker| {
            tracker.value += measurement;
            tracker.exemplars.offer(measurement, &filtered);
        });
    }
}

impl<T: Number> ComputeAggregation for Sum<T> {
    fn call(&self) -> Option<AggregatedMetrics> {
        let mut data_points = Vec::new();
        let time = match self.temporality {
            Temporality::Delta => {
                let time = self.init_time.delta();
                self.value_map
                    .collect_and_reset(&mut data_points, |attributes, tracker| SumDataPoint {
                        attributes,
                        value: tracker.value,
                        exemplars: tracker.exemplars.collect(),
                    });
                time
            }
            Temporality::Cumulative => {
                let time = self.init_time.cumulative();
                self.value_map
                    .collect_readonly(&mut data_points, |attributes, tracker| SumDataPoint {
                        attributes,
                        value: tracker.value,
                        exemplars: tracker.exemplars.collect(),
                    });
                time
            }
        };

        if data_points.is_empty() {
            return None;
        }

        Some(T::wrap_data(
            data::Sum {
                data_points,
                start_time: time.start,
                time: time.current,
                temporality: self.temporality,
                is_monotonic: self.monotonic,
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

    fn collect(sum: &Sum<i64>) -> Vec<SumDataPoint<i64>> {
        match ComputeAggregation::call(&*sum) {
            Some(AggregatedMetrics::I64(MetricData::Sum(data))) => data.data_points,
            None => Vec::new(),
            other => panic!("unexpected aggregation {other:?}"),
        }
    }

    #[test]
    fn sums_per_attribute_set() {
        let sum = Sum::new(
            Temporality::Cumulative,
            AttributeSetFilter::default(),
            true,
            DEFAULT_CARDINALITY_LIMIT,
        );
        for _ in 0..5 {
            Measure::call(&*sum, 1, &[KeyValue::new("route", "a")]);
        }
        for _ in 0..3 {
            Measure::call(&*sum, 2, &[KeyValue::new("route", "b")]);
        }

        let mut points = collect(&sum);
        points.sort_by(|a, b| a.value.cmp(&b.value));
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].value, 5);
        assert_eq!(points[1].value, 6);
    }

    #[test]
    fn monotonic_rejects_negative() {
        let sum = Sum::new(
            Temporality::Cumulative,
            AttributeSetFilter::default(),
            true,
            DEFAULT_CARDINALITY_LIMIT,
        );
        Measure::call(&*sum, 5, &[]);
        Measure::call(&*sum, -3, &[]);
        assert_eq!(collect(&sum)[0].value, 5);
    }

    #[test]
    fn up_down_accepts_negative() {
        let sum = Sum::new(
            Temporality::Cumulative,
            AttributeSetFilter::default(),
            false,
            DEFAULT_CARDINALITY_LIMIT,
        );
        Measure::call(&*sum, 5, &[]);
        Measure::call(&*sum, -3, &[]);
        assert_eq!(collect(&sum)[0].value, 2);
    }

    #[test]
    fn delta_resets_state() {
        let sum = Sum::new(
            Temporality::Delta,
            AttributeSetFilter::default(),
            true,
            DEFAULT_CARDINALITY_LIMIT,
        );
        Measure::call(&*sum, 4, &[]);
        assert_eq!(collect(&sum)[0].value, 4);
        assert!(collect(&sum).is_empty());
        Measure::call(&*sum, 2, &[]);
        assert_eq!(collect(&sum)[0].value, 2);
    }

    #[test]
    fn attribute_filter_drops_keys_before_grouping() {
        let sum = Sum::new(
            Temporality::Cumulative,
            AttributeSetFilter::new(Some(vec![otel::Key::new("route")])),
            true,
            DEFAULT_CARDINALITY_LIMIT,
        );
        Measure::call(&*sum, 1, &[KeyValue::new("route", "a"), KeyValue::new("user", "1")]);
        Measure::call(&*sum, 1, &[KeyValue::new("route", "a"), KeyValue::new("user", "2")]);

        let points = collect(&sum);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].value, 2);
        assert_eq!(points[0].attributes, vec![KeyValue::new("route", "a")]);
    }
}
