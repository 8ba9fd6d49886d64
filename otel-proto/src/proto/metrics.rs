/// `opentelemetry.proto.metrics.v1`
pub mod v1 {
    /// MetricsData represents the metrics data that can be stored in a persistent
    /// storage, OR can be embedded by other protocols that transfer OTLP metrics
    /// data but do not implement the OTLP protocol.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct MetricsData {
        /// An array of ResourceMetrics.
        #[prost(message, repeated, tag = "1")]
        pub resource_metrics: ::prost::alloc::vec::Vec<ResourceMetrics>,
    }
    /// A collection of ScopeMetrics from a Resource.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ResourceMetrics {
        /// The resource for the metrics in this message.
        /// If this field is not set then no resource info is known.
        #[prost(message, optional, tag = "1")]
        pub resource: ::core::option::Option<crate::proto::resource::v1::Resource>,
        /// A list of metrics that originate from a resource.
        #[prost(message, repeated, tag = "2")]
        pub scope_metrics: ::prost::alloc::vec::Vec<ScopeMetrics>,
        /// This schema_url applies to the data in the "resource" field. It does not apply
        /// to the data in the "scope_metrics" field which have their own schema_url field.
        #[prost(string, tag = "3")]
        pub schema_url: ::prost::alloc::string::String,
    }
    /// A collection of Metrics produced by an Scope.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ScopeMetrics {
        /// The instrumentation scope information for the metrics in this message.
        /// Semantically when InstrumentationScope isn't set, it is equivalent with
        /// an empty instrumentation scope name (unknown).
        #[prost(message, optional, tag = "1")]
        pub scope: ::core::option::Option<crate::proto::common::v1::InstrumentationScope>,
        /// A list of metrics that originate from an instrumentation library.
        #[prost(message, repeated, tag = "2")]
        pub metrics: ::prost::alloc::vec::Vec<Metric>,
        /// This schema_url applies to all metrics in the "metrics" field.
        #[prost(string, tag = "3")]
        pub schema_url: ::prost::alloc::string::String,
    }
    /// Defines a Metric which has one or more timeseries.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Metric {
        /// name of the metric.
        #[prost(string, tag = "1")]
        pub name: ::prost::alloc::string::String,
        /// description of the metric, which can be used in documentation.
        #[prost(string, tag = "2")]
        pub description: ::prost::alloc::string::String,
        /// unit in which the metric value is reported. Follows the format
        /// described by <http://unitsofmeasure.org/ucum.html>.
        #[prost(string, tag = "3")]
        pub unit: ::prost::alloc::string::String,
        /// Data determines the aggregation type (if any) of the metric, what is the
        /// reported value type for the data points, as well as the relatationship to
        /// the time interval over which they are reported.
        #[prost(oneof = "metric::Data", tags = "5, 7, 9, 11")]
        pub data: ::core::option::Option<metric::Data>,
    }
    /// Nested message and enum types in `Metric`.
    pub mod metric {
        /// Data determines the aggregation type (if any) of the metric, what is the
        /// reported value type for the data points, as well as the relatationship to
        /// the time interval over which they are reported.
        #[derive(Clone, PartialEq, ::prost::Oneof)]
        pub enum Data {
            #[prost(message, tag = "5")]
            Gauge(super::Gauge),
            #[prost(message, tag = "7")]
            Sum(super::Sum),
            #[prost(message, tag = "9")]
            Histogram(super::Histogram),
            #[prost(message, tag = "11")]
            Summary(super::Summary),
        }
    }
    /// Gauge represents the type of a scalar metric that always exports the
    /// "current value" for every data point. It should be used for an "unknown"
    /// aggregation.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Gauge {
        #[prost(message, repeated, tag = "1")]
        pub data_points: ::prost::alloc::vec::Vec<NumberDataPoint>,
    }
    /// Sum represents the type of a scalar metric that is calculated as a sum of all
    /// reported measurements over a time interval.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Sum {
        #[prost(message, repeated, tag = "1")]
        pub data_points: ::prost::alloc::vec::Vec<NumberDataPoint>,
        /// aggregation_temporality describes if the aggregator reports delta changes
        /// since last report time, or cumulative changes since a fixed start time.
        #[prost(enumeration = "AggregationTemporality", tag = "2")]
        pub aggregation_temporality: i32,
        /// If "true" means that the sum is monotonic.
        #[prost(bool, tag = "3")]
        pub is_monotonic: bool,
    }
    /// Histogram represents the type of a metric that is calculated by aggregating
    /// as a Histogram of all reported measurements over a time interval.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Histogram {
        #[prost(message, repeated, tag = "1")]
        pub data_points: ::prost::alloc::vec::Vec<HistogramDataPoint>,
        /// aggregation_temporality describes if the aggregator reports delta changes
        /// since last report time, or cumulative changes since a fixed start time.
        #[prost(enumeration = "AggregationTemporality", tag = "2")]
        pub aggregation_temporality: i32,
    }
    /// Summary metric data are used to convey quantile summaries.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Summary {
        #[prost(message, repeated, tag = "1")]
        pub data_points: ::prost::alloc::vec::Vec<SummaryDataPoint>,
    }
    /// NumberDataPoint is a single data point in a timeseries that describes the
    /// time-varying scalar value of a metric.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct NumberDataPoint {
        /// The set of key/value pairs that uniquely identify the timeseries from
        /// where this point belongs.
        #[prost(message, repeated, tag = "7")]
        pub attributes: ::prost::alloc::vec::Vec<crate::proto::common::v1::KeyValue>,
        /// StartTimeUnixNano is optional but strongly encouraged, see the
        /// the detailed comments above Metric.
        #[prost(fixed64, tag = "2")]
        pub start_time_unix_nano: u64,
        /// TimeUnixNano is required, see the detailed comments above Metric.
        #[prost(fixed64, tag = "3")]
        pub time_unix_nano: u64,
        /// (Optional) List of exemplars collected from
        /// measurements that were used to form the data point
        #[prost(message, repeated, tag = "5")]
        pub exemplars: ::prost::alloc::vec::Vec<Exemplar>,
        /// Flags that apply to this specific data point.
        #[prost(uint32, tag = "8")]
        pub flags: u32,
        /// The value itself.
        #[prost(oneof = "number_data_point::Value", tags = "4, 6")]
        pub value: ::core::option::Option<number_data_point::Value>,
    }
    /// Nested message and enum types in `NumberDataPoint`.
    pub mod number_data_point {
        /// The value itself.
        #[derive(Clone, Copy, PartialEq, ::prost::Oneof)]
        pub enum Value {
            #[prost(double, tag = "4")]
            AsDouble(f64),
            #[prost(sfixed64, tag = "6")]
            AsInt(i64),
        }
    }
    /// HistogramDataPoint is a single data point in a timeseries that describes the
    /// time-varying values of a Histogram.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct HistogramDataPoint {
        /// The set of key/value pairs that uniquely identify the timeseries from
        /// where this point belongs.
        #[prost(message, repeated, tag = "9")]
        pub attributes: ::prost::alloc::vec::Vec<crate::proto::common::v1::KeyValue>,
        /// StartTimeUnixNano is optional but strongly encouraged, see the
        /// the detailed comments above Metric.
        #[prost(fixed64, tag = "2")]
        pub start_time_unix_nano: u64,
        /// TimeUnixNano is required, see the detailed comments above Metric.
        #[prost(fixed64, tag = "3")]
        pub time_unix_nano: u64,
        /// count is the number of values in the population. Must be non-negative.
        #[prost(fixed64, tag = "4")]
        pub count: u64,
        /// sum of the values in the population. If count is zero then this field
        /// must be zero.
        #[prost(double, optional, tag = "5")]
        pub sum: ::core::option::Option<f64>,
        /// bucket_counts is an optional field contains the count values of histogram
        /// for each bucket.
        ///
        /// The sum of the bucket_counts must equal the value in the count field.
        ///
        /// The number of elements in bucket_counts array must be by one greater than
        /// the number of elements in explicit_bounds array.
        #[prost(fixed64, repeated, tag = "6")]
        pub bucket_counts: ::prost::alloc::vec::Vec<u64>,
        /// explicit_bounds specifies buckets with explicitly defined bounds for values.
        ///
        /// The boundaries for bucket at index i are:
        ///
        /// (-infinity, explicit_bounds\[i\]\] for i == 0
        /// (explicit_bounds\[i-1\], explicit_bounds\[i\]\] for 0 < i < size(explicit_bounds)
        /// (explicit_bounds\[i-1\], +infinity) for i == size(explicit_bounds)
        #[prost(double, repeated, tag = "7")]
        pub explicit_bounds: ::prost::alloc::vec::Vec<f64>,
        /// (Optional) List of exemplars collected from
        /// measurements that were used to form the data point
        #[prost(message, repeated, tag = "8")]
        pub exemplars: ::prost::alloc::vec::Vec<Exemplar>,
        /// Flags that apply to this specific data point.
        #[prost(uint32, tag = "10")]
        pub flags: u32,
        /// min is the minimum value over (start_time, end_time].
        #[prost(double, optional, tag = "11")]
        pub min: ::core::option::Option<f64>,
        /// max is the maximum value over (start_time, end_time].
        #[prost(double, optional, tag = "12")]
        pub max: ::core::option::Option<f64>,
    }
    /// SummaryDataPoint is a single data point in a timeseries that describes the
    /// time-varying values of a Summary metric.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct SummaryDataPoint {
        /// The set of key/value pairs that uniquely identify the timeseries from
        /// where this point belongs.
        #[prost(message, repeated, tag = "7")]
        pub attributes: ::prost::alloc::vec::Vec<crate::proto::common::v1::KeyValue>,
        /// StartTimeUnixNano is optional but strongly encouraged, see the
        /// the detailed comments above Metric.
        #[prost(fixed64, tag = "2")]
        pub start_time_unix_nano: u64,
        /// TimeUnixNano is required, see the detailed comments above Metric.
        #[prost(fixed64, tag = "3")]
        pub time_unix_nano: u64,
        /// count is the number of values in the population. Must be non-negative.
        #[prost(fixed64, tag = "4")]
        pub count: u64,
        /// sum of the values in the population. If count is zero then this field
        /// must be zero.
        #[prost(double, tag = "5")]
        pub sum: f64,
        /// (Optional) list of values at different quantiles of the distribution calculated
        /// from the current snapshot.
        #[prost(message, repeated, tag = "6")]
        pub quantile_values: ::prost::alloc::vec::Vec<summary_data_point::ValueAtQuantile>,
        /// Flags that apply to this specific data point.
        #[prost(uint32, tag = "8")]
        pub flags: u32,
    }
    /// Nested message and enum types in `SummaryDataPoint`.
    pub mod summary_data_point {
        /// Represents the value at a given quantile of a distribution.
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct ValueAtQuantile {
            /// The quantile of a distribution. Must be in the interval
            /// \[0.0, 1.0\].
            #[prost(double, tag = "1")]
            pub quantile: f64,
            /// The value at the given quantile of a distribution.
            #[prost(double, tag = "2")]
            pub value: f64,
        }
    }
    /// A representation of an exemplar, which is a sample input measurement.
    /// Exemplars also hold information about the environment when the measurement
    /// was recorded, for example the span and trace ID of the active span when the
    /// exemplar was recorded.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Exemplar {
        /// The set of key/value pairs that were filtered out by the aggregator, but
        /// recorded alongside the original measurement. Only key/value pairs that were
        /// filtered out by the aggregator should be included
        #[prost(message, repeated, tag = "7")]
        pub filtered_attributes: ::prost::alloc::vec::Vec<crate::proto::common::v1::KeyValue>,
        /// time_unix_nano is the exact time when this exemplar was recorded
        #[prost(fixed64, tag = "2")]
        pub time_unix_nano: u64,
        /// (Optional) Span ID of the exemplar trace.
        /// span_id may be missing if the measurement is not recorded inside a trace
        /// or if the trace is not sampled.
        #[prost(bytes = "vec", tag = "4")]
        pub span_id: ::prost::alloc::vec::Vec<u8>,
        /// (Optional) Trace ID of the exemplar trace.
        #[prost(bytes = "vec", tag = "5")]
        pub trace_id: ::prost::alloc::vec::Vec<u8>,
        /// The value of the measurement that was recorded.
        #[prost(oneof = "exemplar::Value", tags = "3, 6")]
        pub value: ::core::option::Option<exemplar::Value>,
    }
    /// Nested message and enum types in `Exemplar`.
    pub mod exemplar {
        /// The value of the measurement that was recorded.
        #[derive(Clone, Copy, PartialEq, ::prost::Oneof)]
        pub enum Value {
            #[prost(double, tag = "3")]
            AsDouble(f64),
            #[prost(sfixed64, tag = "6")]
            AsInt(i64),
        }
    }
    /// AggregationTemporality defines how a metric aggregator reports aggregated
    /// values. It describes how those values relate to the time interval over
    /// which they are aggregated.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum AggregationTemporality {
        /// UNSPECIFIED is the default AggregationTemporality, it MUST not be used.
        Unspecified = 0,
        /// DELTA is an AggregationTemporality for a metric aggregator which reports
        /// changes since last report time.
        Delta = 1,
        /// CUMULATIVE is an AggregationTemporality for a metric aggregator which
        /// reports changes since a fixed start time.
        Cumulative = 2,
    }
}
