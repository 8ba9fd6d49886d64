use super::sum::SCALAR_RESERVOIR_SIZE;
use super::{
    AggregateTimeInitiator, Aggregator, AttributeSetFilter, ComputeAggregation, ExemplarReservoir,
    Measure, Number, ValueMap,
};
use crate::metrics::data::{self, AggregatedMetrics, GaugeDataPoint};
use crate::metrics::Temporality;
use otel::KeyValue;
use std::sync::Arc;

pub(crate) struct Assign<T: Number> {
    value: T,
    exemplars: ExemplarReservoir<T>,
}

impl<T: Number> Aggregator for Assign<T> {
    type InitConfig = ();

    fn create(_init: &()) -> Self {
        Assign {
            value: T::default(),
            exemplars: ExemplarReservoir::new(SCALAR_RESERVOIR_SIZE),
        }
    }
}

/// Summarizes a set of measurements as the last one recorded.
///
/// Backs `Gauge` instruments and, with replace semantics at collection
/// time, `ObservableGauge`.
pub(crate) struct LastValue<T: Number> {
    value_map: ValueMap<Assign<T>>,
    init_time: AggregateTimeInitiator,
    temporality: Temporality,
    filter: AttributeSetFilter,
}

impl<T: Number> LastValue<T> {
    pub(crate) fn new(
        temporality: Temporality,
        filter: AttributeSetFilter,
        cardinality_limit: usize,
    ) -> Arc<Self> {
        Arc::new(LastValue {
            value_map: ValueMap::new((), cardinality_limit),
            init_time: AggregateTimeInitiator::default(),
            temporality,
            filter,
        })
    }
}

impl<T: Number> Measure<T> for LastValue<T> {
    fn call(&self, measurement: T, attributes: &[KeyValue]) {
        let (aggregated, filtered) = self.filter.apply(attributes);
        self.value_map.measure(&aggregated, |tracker| {
            tracker.value = measurement;
            tracker.exemplars.offer(measurement, &filtered);
        });
    }

    fn reset_observations(&self) {
        self.value_map.clear();
    }
}

impl<T: Number> ComputeAggregation for LastValue<T> {
    fn call(&self) -> Option<AggregatedMetrics> {
        let mut data_points = Vec::new();
        let time = match self.temporality {
            Temporality::Delta => {
                let time = self.init_time.delta();
                self.value_map
                    .collect_and_reset(&mut data_points, |attributes, tracker| GaugeDataPoint {
                        attributes,
                        value: tracker.value,
                        exemplars: tracker.exemplars.collect(),
                    });
                time
            }
            Temporality::Cumulative => {
                let time = self.init_time.cumulative();
                self.value_map
                    .collect_readonly(&mut data_points, |attributes, tracker| GaugeDataPoint {
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
            data::Gauge {
                data_points,
                start_time: Some(time.start),
                time: time.current,
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

    fn collect(last_value: &LastValue<f64>) -> Vec<GaugeDataPoint<f64>> {
        match ComputeAggregation::call(&*last_value) {
            Some(AggregatedMetrics::F64(MetricData::Gauge(data))) => data.data_points,
            None => Vec::new(),
            other => panic!("unexpected aggregation {other:?}"),
        }
    }

    #[test]
    fn keeps_last_value_per_attribute_set() {
        let last_value = LastValue::new(
            Temporality::Cumulative,
            AttributeSetFilter::default(),
            DEFAULT_CARDINALITY_LIMIT,
        );
        Measure::call(&*last_value, 1.0, &[KeyValue::new("host", "a")]);
        Measure::call(&*last_value, 2.5, &[KeyValue::new("host", "a")]);

        let points = collect(&last_value);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].value, 2.5);
    }
}
