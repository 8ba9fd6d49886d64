/// `opentelemetry.proto.logs.v1`
pub mod v1 {
    /// LogsData represents the logs data that can be stored in a persistent storage,
    /// OR can be embedded by other protocols that transfer OTLP logs data but do not
    /// implement the OTLP protocol.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct LogsData {
        /// An array of ResourceLogs.
        #[prost(message, repeated, tag = "1")]
        pub resource_logs: ::prost::alloc::vec::Vec<ResourceLogs>,
    }
    /// A collection of ScopeLogs from a Resource.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ResourceLogs {
        /// The resource for the logs in this message.
        /// If this field is not set then resource info is unknown.
        #[prost(message, optional, tag = "1")]
        pub resource: ::core::option::Option<crate::proto::resource::v1::Resource>,
        /// A list of ScopeLogs that originate from a resource.
        #[prost(message, repeated, tag = "2")]
        pub scope_logs: ::prost::alloc::vec::Vec<ScopeLogs>,
        /// This schema_url applies to the data in the "resource" field. It does not apply
        /// to the data in the "scope_logs" field which have their own schema_url field.
        #[prost(string, tag = "3")]
        pub schema_url: ::prost::alloc::string::String,
    }
    /// A collection of Logs produced by a Scope.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ScopeLogs {
        /// The instrumentation scope information for the logs in this message.
        /// Semantically when InstrumentationScope isn't set, it is equivalent with
        /// an empty instrumentation scope name (unknown).
        #[prost(message, optional, tag = "1")]
        pub scope: ::core::option::Option<crate::proto::common::v1::InstrumentationScope>,
        /// A list of log records.
        #[prost(message, repeated, tag = "2")]
        pub log_records: ::prost::alloc::vec::Vec<LogRecord>,
        /// This schema_url applies to all logs in the "logs" field.
        #[prost(string, tag = "3")]
        pub schema_url: ::prost::alloc::string::String,
    }
    /// A log record according to OpenTelemetry Log Data Model.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct LogRecord {
        /// time_unix_nano is the time when the event occurred.
        /// Value is UNIX Epoch time in nanoseconds since 00:00:00 UTC on 1 January 1970.
        /// Value of 0 indicates unknown or missing timestamp.
        #[prost(fixed64, tag = "1")]
        pub time_unix_nano: u64,
        /// Time when the event was observed by the collection system.
        #[prost(fixed64, tag = "11")]
        pub observed_time_unix_nano: u64,
        /// Numerical value of the severity, normalized to values described in Log Data Model.
        #[prost(enumeration = "SeverityNumber", tag = "2")]
        pub severity_number: i32,
        /// The severity text (also known as log level). The original string representation as
        /// it is known at the source.
        #[prost(string, tag = "3")]
        pub severity_text: ::prost::alloc::string::String,
        /// A value containing the body of the log record. Can be for example a human-readable
        /// string message (including multi-line) describing the event in a free form or it can
        /// be a structured data composed of arrays and maps of other values.
        #[prost(message, optional, tag = "5")]
        pub body: ::core::option::Option<crate::proto::common::v1::AnyValue>,
        /// Additional attributes that describe the specific event occurrence.
        /// Attribute keys MUST be unique.
        #[prost(message, repeated, tag = "6")]
        pub attributes: ::prost::alloc::vec::Vec<crate::proto::common::v1::KeyValue>,
        /// dropped_attributes_count is the number of dropped attributes.
        #[prost(uint32, tag = "7")]
        pub dropped_attributes_count: u32,
        /// Flags, a bit field: bits 0-7 are trace flags, bits 8-31 are reserved.
        #[prost(fixed32, tag = "8")]
        pub flags: u32,
        /// A unique identifier for a trace. All logs from the same trace share
        /// the same `trace_id`. The ID is a 16-byte array. An ID with all zeroes
        /// is considered invalid. Can be set for logs that are part of request processing
        /// and have an assigned trace id.
        #[prost(bytes = "vec", tag = "9")]
        pub trace_id: ::prost::alloc::vec::Vec<u8>,
        /// A unique identifier for a span within a trace, assigned when the span
        /// is created. The ID is an 8-byte array. An ID with all zeroes is considered
        /// invalid. Can be set for logs that are part of a particular processing span.
        #[prost(bytes = "vec", tag = "10")]
        pub span_id: ::prost::alloc::vec::Vec<u8>,
        /// A unique identifier of event category/type.
        #[prost(string, tag = "12")]
        pub event_name: ::prost::alloc::string::String,
    }
    /// Possible values for LogRecord.SeverityNumber.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum SeverityNumber {
        /// UNSPECIFIED is the default SeverityNumber, it MUST NOT be used.
        Unspecified = 0,
        Trace = 1,
        Trace2 = 2,
        Trace3 = 3,
        Trace4 = 4,
        Debug = 5,
        Debug2 = 6,
        Debug3 = 7,
        Debug4 = 8,
        Info = 9,
        Info2 = 10,
        Info3 = 11,
        Info4 = 12,
        Warn = 13,
        Warn2 = 14,
        Warn3 = 15,
        Warn4 = 16,
        Error = 17,
        Error2 = 18,
        Error3 = 19,
        Error4 = 20,
        Fatal = 21,
        Fatal2 = 22,
        Fatal3 = 23,
        Fatal4 = 24,
    }
}
