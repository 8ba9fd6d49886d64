use super::{
    AggregateTimeInitiator, Aggregator, AttributeSetFilter, ComputeAggregation, Measure, Number,
    ValueMap,
};
use crate::metrics::data::{self, AggregatedMetrics, SumDataPoint};
use crate::metrics::Temporality;
use otel::{otel_debug, KeyValue};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub(crate) struct Observed<T: Number> {
    value: T,
}

impl<T: Number> Aggregator for Observed<T> {
    type InitConfig = ();

    fn create(_init: &()) -> Self {
        Observed {
            value: T::default(),
        }
    }
}

/// A sum whose value is observed whole at collection time rather than
/// accumulated measurement by measurement.
///
/// Backs `ObservableCounter` and `ObservableUpDownCounter`: each
/// collection's observations replace the stored values, and delta
/// temporality is derived by subtracting the previously reported values.
pub(crate) struct PrecomputedSum<T: Number> {
    value_map: ValueMap<Observed<T>>,
    init_time: AggregateTimeInitiator,
    temporality: Temporality,
    filter: AttributeSetFilter,
    monotonic: bool,
    reported: Mutex<HashMap<Vec<KeyValue>, T>>,
}

impl<T: Number> PrecomputedSum<T> {
    pub(crate) fn new(
        temporality: Temporality,
        filter: AttributeSetFilter,
        monotonic: bool,
        cardinality_limit: usize,
    ) -> Arc<Self> {
        Arc::new(PrecomputedSum {
            value_map: ValueMap::new((), cardinality_limit),
            init_time: AggregateTimeInitiator::default(),
            temporality,
            filter,
            monotonic,
            reported: Mutex::new(HashMap::new()),
        })
    }
}

impl<T: Number> Measure<T> for PrecomputedSum<T> {
    fn call(&self, measurement: T, attributes: &[KeyValue]) {
        if self.monotonic && measurement.is_negative() {
            otel_debug!(
                name: "PrecomputedSum.NegativeValueOnMonotonic",
                message = "negative observation rejected by a monotonic counter"
            );
            return;
        }

        let (aggregated, _filtered) = self.filter.apply(attributes);
        self.value_map.measure(&aggregated, |tracker| {
            tracker.value = measurement;
        });
    }

    fn reset_observations(&self) {
        self.value_map.clear();
    }
}

impl<T: Number> ComputeAggregation for PrecomputedSum<T> {
    fn call(&self) -> Option<AggregatedMetrics> {
        let mut data_points: Vec<SumDataPoint<T>> = Vec::new();
        let time = match self.temporality {
            Temporality::Delta => {
                let time = self.init_time.delta();
                let mut reported = match self.reported.lock() {
                    Ok(reported) => reported,
                    Err(_) => return None,
                };
                let mut new_reported = HashMap::new();
                self.value_map
                    .collect_readonly(&mut data_points, |attributes, tracker| {
                        let previous = reported.get(&attributes).copied().unwrap_or_default();
                        new_reported.insert(attributes.clone(), tracker.value);
                        SumDataPoint {
                            attributes,
                            value: tracker.value - previous,
                            exemplars: Vec::new(),
                        }
                    });
                *reported = new_reported;
                time
            }
            Temporality::Cumulative => {
                let time = self.init_time.cumulative();
                self.value_map
                    .collect_readonly(&mut data_points, |attributes, tracker| SumDataPoint {
                        attributes,
                        value: tracker.value,
                        exemplars: Vec::new(),
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

    fn collect(sum: &PrecomputedSum<i64>) -> Vec<SumDataPoint<i64>> {
        match ComputeAggregation::call(&*sum) {
            Some(AggregatedMetrics::I64(MetricData::Sum(data))) => data.data_points,
            None => Vec::new(),
            other => panic!("unexpected aggregation {other:?}"),
        }
    }

    #[test]
    fn observations_replace_rather_than_add() {
        let sum = PrecomputedSum::new(
            Temporality::Cumulative,
            AttributeSetFilter::default(),
            true,
            DEFAULT_CARDINALITY_LIMIT,
        );
        Measure::call(&*sum, 10, &[]);
        Measure::call(&*sum, 25, &[]);
        assert_eq!(collect(&sum)[0].value, 25);
    }

    #[test]
    fn delta_reports_change_since_last_collection() {
        let sum = PrecomputedSum::new(
            Temporality::Delta,
            AttributeSetFilter::default(),
            true,
            DEFAULT_CARDINALITY_LIMIT,
        );
        Measure::call(&*sum, 10, &[]);
        assert_eq!(collect(&sum)[0].value, 10);

        Measure::call(&*sum, 25, &[]);
        assert_eq!(collect(&sum)[0].value, 15);
    }
}
