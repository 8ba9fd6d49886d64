use crate::proto::common::v1::KeyValue;
use crate::proto::metrics::v1::{
    exemplar, metric, number_data_point, AggregationTemporality, Exemplar, Gauge, Histogram,
    HistogramDataPoint, Metric, MetricsData, NumberDataPoint, ResourceMetrics, ScopeMetrics, Sum,
};
use crate::transform::common::{to_nanos, Attributes};
use otel_sdk::metrics::data;
use otel_sdk::metrics::Temporality;

/// The numeric value kinds a data point can carry on the wire.
pub(crate) trait Numeric {
    fn to_number_value(self) -> number_data_point::Value;
    fn to_exemplar_value(self) -> exemplar::Value;
    fn to_f64(self) -> f64;
}

impl Numeric for i64 {
    fn to_number_value(self) -> number_data_point::Value {
        number_data_point::Value::AsInt(self)
    }

    fn to_exemplar_value(self) -> exemplar::Value {
        exemplar::Value::AsInt(self)
    }

    fn to_f64(self) -> f64 {
        self as f64
    }
}

impl Numeric for f64 {
    fn to_number_value(self) -> number_data_point::Value {
        number_data_point::Value::AsDouble(self)
    }

    fn to_exemplar_value(self) -> exemplar::Value {
        exemplar::Value::AsDouble(self)
    }

    fn to_f64(self) -> f64 {
        self
    }
}

impl From<Temporality> for AggregationTemporality {
    fn from(temporality: Temporality) -> Self {
        match temporality {
            Temporality::Cumulative => AggregationTemporality::Cumulative,
            Temporality::Delta => AggregationTemporality::Delta,
            _ => AggregationTemporality::Unspecified,
        }
    }
}

impl From<&data::ResourceMetrics> for MetricsData {
    fn from(rm: &data::ResourceMetrics) -> Self {
        MetricsData {
            resource_metrics: vec![rm.into()],
        }
    }
}

impl From<&data::ResourceMetrics> for ResourceMetrics {
    fn from(rm: &data::ResourceMetrics) -> Self {
        ResourceMetrics {
            resource: Some((&rm.resource).into()),
            scope_metrics: rm.scope_metrics.iter().map(Into::into).collect(),
            schema_url: rm
                .resource
                .schema_url()
                .map(ToString::to_string)
                .unwrap_or_default(),
        }
    }
}

impl From<&data::ScopeMetrics> for ScopeMetrics {
    fn from(sm: &data::ScopeMetrics) -> Self {
        ScopeMetrics {
            scope: Some((&sm.scope).into()),
            metrics: sm.metrics.iter().map(Into::into).collect(),
            schema_url: sm
                .scope
                .schema_url()
                .map(ToString::to_string)
                .unwrap_or_default(),
        }
    }
}

impl From<&data::Metric> for Metric {
    fn from(metric: &data::Metric) -> Self {
        Metric {
            name: metric.name.to_string(),
            description: metric.description.to_string(),
            unit: metric.unit.to_string(),
            data: Some(match &metric.data {
                data::AggregatedMetrics::F64(metric_data) => metric_data.into(),
                data::AggregatedMetrics::I64(metric_data) => metric_data.into(),
            }),
        }
    }
}

impl<T: Numeric + Copy> From<&data::MetricData<T>> for metric::Data {
    fn from(metric_data: &data::MetricData<T>) -> Self {
        match metric_data {
            data::MetricData::Gauge(gauge) => metric::Data::Gauge(gauge.into()),
            data::MetricData::Sum(sum) => metric::Data::Sum(sum.into()),
            data::MetricData::Histogram(histogram) => metric::Data::Histogram(histogram.into()),
        }
    }
}

impl<T: Numeric + Copy> From<&data::Gauge<T>> for Gauge {
    fn from(gauge: &data::Gauge<T>) -> Self {
        Gauge {
            data_points: gauge
                .data_points
                .iter()
                .map(|dp| NumberDataPoint {
                    attributes: Attributes::from(dp.attributes.clone()).0,
                    start_time_unix_nano: gauge.start_time.map(to_nanos).unwrap_or_default(),
                    time_unix_nano: to_nanos(gauge.time),
                    exemplars: dp.exemplars.iter().map(Into::into).collect(),
                    flags: 0,
                    value: Some(dp.value.to_number_value()),
                })
                .collect(),
        }
    }
}

impl<T: Numeric + Copy> From<&data::Sum<T>> for Sum {
    fn from(sum: &data::Sum<T>) -> Self {
        Sum {
            data_points: sum
                .data_points
                .iter()
                .map(|dp| NumberDataPoint {
                    attributes: Attributes::from(dp.attributes.clone()).0,
                    start_time_unix_nano: to_nanos(sum.start_time),
                    time_unix_nano: to_nanos(sum.time),
                    exemplars: dp.exemplars.iter().map(Into::into).collect(),
                    flags: 0,
                    value: Some(dp.value.to_number_value()),
                })
                .collect(),
            aggregation_temporality: AggregationTemporality::from(sum.temporality).into(),
            is_monotonic: sum.is_monotonic,
        }
    }
}

impl<T: Numeric + Copy> From<&data::Histogram<T>> for Histogram {
    fn from(histogram: &data::Histogram<T>) -> Self {
        Histogram {
            data_points: histogram
                .data_points
                .iter()
                .map(|dp| HistogramDataPoint {
                    attributes: Attributes::from(dp.attributes.clone()).0,
                    start_time_unix_nano: to_nanos(histogram.start_time),
                    time_unix_nano: to_nanos(histogram.time),
                    count: dp.count,
                    sum: Some(dp.sum.to_f64()),
                    bucket_counts: dp.bucket_counts.clone(),
                    explicit_bounds: dp.bounds.clone(),
                    exemplars: dp.exemplars.iter().map(Into::into).collect(),
                    flags: 0,
                    min: dp.min.map(Numeric::to_f64),
                    max: dp.max.map(Numeric::to_f64),
                })
                .collect(),
            aggregation_temporality: AggregationTemporality::from(histogram.temporality).into(),
        }
    }
}

impl<T: Numeric + Copy> From<&data::Exemplar<T>> for Exemplar {
    fn from(exemplar: &data::Exemplar<T>) -> Self {
        Exemplar {
            filtered_attributes: exemplar
                .filtered_attributes
                .iter()
                .map(|kv| KeyValue::from(kv.clone()))
                .collect(),
            time_unix_nano: to_nanos(exemplar.time),
            span_id: exemplar.span_id.to_bytes().to_vec(),
            trace_id: exemplar.trace_id.to_bytes().to_vec(),
            value: Some(exemplar.value.to_exemplar_value()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otel::{InstrumentationScope, KeyValue as SdkKeyValue};
    use otel_sdk::Resource;
    use std::time::{Duration, UNIX_EPOCH};

    fn sample_metrics() -> data::ResourceMetrics {
        data::ResourceMetrics {
            resource: Resource::builder_empty().with_service_name("svc").build(),
            scope_metrics: vec![data::ScopeMetrics {
                scope: InstrumentationScope::builder("app").build(),
                metrics: vec![data::Metric {
                    name: "requests".into(),
                    description: "".into(),
                    unit: "1".into(),
                    data: data::AggregatedMetrics::I64(data::MetricData::Sum(data::Sum {
                        data_points: vec![data::SumDataPoint {
                            attributes: vec![SdkKeyValue::new("route", "a")],
                            value: 5,
                            exemplars: vec![],
                        }],
                        start_time: UNIX_EPOCH + Duration::from_secs(1),
                        time: UNIX_EPOCH + Duration::from_secs(2),
                        temporality: Temporality::Cumulative,
                        is_monotonic: true,
                    })),
                }],
            }],
        }
    }

    #[test]
    fn sum_mapping() {
        let proto: ResourceMetrics = (&sample_metrics()).into();
        let metric = &proto.scope_metrics[0].metrics[0];
        assert_eq!(metric.name, "requests");

        let Some(metric::Data::Sum(sum)) = &metric.data else {
            panic!("expected sum data");
        };
        assert!(sum.is_monotonic);
        assert_eq!(
            sum.aggregation_temporality,
            AggregationTemporality::Cumulative as i32
        );
        let point = &sum.data_points[0];
        assert_eq!(point.value, Some(number_data_point::Value::AsInt(5)));
        assert_eq!(point.start_time_unix_nano, 1_000_000_000);
        assert_eq!(point.time_unix_nano, 2_000_000_000);
    }

    #[test]
    fn histogram_mapping_with_exemplar() {
        let histogram = data::Histogram {
            data_points: vec![data::HistogramDataPoint {
                attributes: vec![],
                count: 2,
                bounds: vec![0.0, 5.0],
                bucket_counts: vec![0, 2, 0],
                sum: 6.0f64,
                min: Some(1.0),
                max: Some(5.0),
                exemplars: vec![data::Exemplar {
                    filtered_attributes: vec![SdkKeyValue::new("user", "u1")],
                    time: UNIX_EPOCH + Duration::from_secs(3),
                    value: 5.0,
                    span_id: otel::trace::SpanId::from_u64(8),
                    trace_id: otel::trace::TraceId::from_u128(7),
                }],
            }],
            start_time: UNIX_EPOCH,
            time: UNIX_EPOCH + Duration::from_secs(4),
            temporality: Temporality::Delta,
        };

        let proto: Histogram = (&histogram).into();
        assert_eq!(
            proto.aggregation_temporality,
            AggregationTemporality::Delta as i32
        );
        let point = &proto.data_points[0];
        assert_eq!(point.count, 2);
        assert_eq!(point.sum, Some(6.0));
        assert_eq!(point.explicit_bounds, vec![0.0, 5.0]);
        assert_eq!(point.bucket_counts, vec![0, 2, 0]);

        let exemplar = &point.exemplars[0];
        assert_eq!(exemplar.trace_id.len(), 16);
        assert_eq!(exemplar.span_id.len(), 8);
        assert_eq!(exemplar.filtered_attributes.len(), 1);
        assert_eq!(exemplar.value, Some(exemplar::Value::AsDouble(5.0)));
    }
}
