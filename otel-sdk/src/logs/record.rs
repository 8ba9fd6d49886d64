use otel::trace::{SpanContext, SpanId, TraceFlags, TraceId};
use otel::{Key, StringValue, Value};
use std::borrow::Cow;
use std::collections::HashMap;
use std::time::SystemTime;

/// A value carried by a log record body or attribute.
///
/// Unlike span attribute values, log values may nest: lists and maps of
/// further `AnyValue`s are allowed. A record with no body at all models
/// the null body.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum AnyValue {
    /// An integer value
    Int(i64),
    /// A double value
    Double(f64),
    /// A string value
    String(StringValue),
    /// A boolean value
    Boolean(bool),
    /// A nested list of values
    ListAny(Box<Vec<AnyValue>>),
    /// A nested map of values
    Map(Box<HashMap<Key, AnyValue>>),
}

macro_rules! impl_trivial_from {
    ($t:ty, $variant:path) => {
        impl From<$t> for AnyValue {
            fn from(val: $t) -> AnyValue {
                $variant(val.into())
            }
        }
    };
}

impl_trivial_from!(i8, AnyValue::Int);
impl_trivial_from!(i16, AnyValue::Int);
impl_trivial_from!(i32, AnyValue::Int);
impl_trivial_from!(i64, AnyValue::Int);
impl_trivial_from!(u8, AnyValue::Int);
impl_trivial_from!(u16, AnyValue::Int);
impl_trivial_from!(u32, AnyValue::Int);
impl_trivial_from!(f64, AnyValue::Double);
impl_trivial_from!(f32, AnyValue::Double);
impl_trivial_from!(String, AnyValue::String);
impl_trivial_from!(&'static str, AnyValue::String);
impl_trivial_from!(StringValue, AnyValue::String);
impl_trivial_from!(bool, AnyValue::Boolean);

impl<T: Into<AnyValue>> FromIterator<T> for AnyValue {
    /// Creates an [`AnyValue::ListAny`] value from a sequence of values.
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        AnyValue::ListAny(Box::new(iter.into_iter().map(Into::into).collect()))
    }
}

impl From<Value> for AnyValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Bool(b) => AnyValue::Boolean(b),
            Value::I64(i) => AnyValue::Int(i),
            Value::F64(f) => AnyValue::Double(f),
            Value::String(s) => AnyValue::String(s),
            Value::Array(a) => match a {
                otel::Array::Bool(vs) => vs.into_iter().collect(),
                otel::Array::I64(vs) => vs.into_iter().collect(),
                otel::Array::F64(vs) => vs.into_iter().collect(),
                otel::Array::String(vs) => vs.into_iter().collect(),
            },
        }
    }
}

/// A normalized severity, with the standard 24 levels.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(i32)]
pub enum Severity {
    /// TRACE
    Trace = 1,
    /// TRACE2
    Trace2 = 2,
    /// TRACE3
    Trace3 = 3,
    /// TRACE4
    Trace4 = 4,
    /// DEBUG
    Debug = 5,
    /// DEBUG2
    Debug2 = 6,
    /// DEBUG3
    Debug3 = 7,
    /// DEBUG4
    Debug4 = 8,
    /// INFO
    Info = 9,
    /// INFO2
    Info2 = 10,
    /// INFO3
    Info3 = 11,
    /// INFO4
    Info4 = 12,
    /// WARN
    Warn = 13,
    /// WARN2
    Warn2 = 14,
    /// WARN3
    Warn3 = 15,
    /// WARN4
    Warn4 = 16,
    /// ERROR
    Error = 17,
    /// ERROR2
    Error2 = 18,
    /// ERROR3
    Error3 = 19,
    /// ERROR4
    Error4 = 20,
    /// FATAL
    Fatal = 21,
    /// FATAL2
    Fatal2 = 22,
    /// FATAL3
    Fatal3 = 23,
    /// FATAL4
    Fatal4 = 24,
}

impl Severity {
    /// The short name of this severity, as carried in `severity_text`.
    pub const fn name(&self) -> &'static str {
        match &self {
            Severity::Trace => "TRACE",
            Severity::Trace2 => "TRACE2",
            Severity::Trace3 => "TRACE3",
            Severity::Trace4 => "TRACE4",
            Severity::Debug => "DEBUG",
            Severity::Debug2 => "DEBUG2",
            Severity::Debug3 => "DEBUG3",
            Severity::Debug4 => "DEBUG4",
            Severity::Info => "INFO",
            Severity::Info2 => "INFO2",
            Severity::Info3 => "INFO3",
            Severity::Info4 => "INFO4",
            Severity::Warn => "WARN",
            Severity::Warn2 => "WARN2",
            Severity::Warn3 => "WARN3",
            Severity::Warn4 => "WARN4",
            Severity::Error => "ERROR",
            Severity::Error2 => "ERROR2",
            Severity::Error3 => "ERROR3",
            Severity::Error4 => "ERROR4",
            Severity::Fatal => "FATAL",
            Severity::Fatal2 => "FATAL2",
            Severity::Fatal3 => "FATAL3",
            Severity::Fatal4 => "FATAL4",
        }
    }
}

/// The trace identity a log record was emitted under.
#[derive(Clone, Debug, PartialEq)]
pub struct TraceContext {
    /// Trace id
    pub trace_id: TraceId,
    /// Span id
    pub span_id: SpanId,
    /// Trace flags
    pub trace_flags: Option<TraceFlags>,
}

impl From<&SpanContext> for TraceContext {
    fn from(span_context: &SpanContext) -> Self {
        TraceContext {
            trace_id: span_context.trace_id(),
            span_id: span_context.span_id(),
            trace_flags: Some(span_context.trace_flags()),
        }
    }
}

/// All data carried by a log record.
///
/// Mutable until it has been handed to every processor, frozen afterwards.
#[derive(Clone, Debug, Default, PartialEq)]
#[non_exhaustive]
pub struct SdkLogRecord {
    /// A unique identifier of the event category/type, when the record
    /// describes a structured event.
    pub event_name: Option<Cow<'static, str>>,

    /// The time the underlying event occurred, as reported by the source.
    pub timestamp: Option<SystemTime>,

    /// The time the record was seen by the pipeline. Always stamped.
    pub observed_timestamp: Option<SystemTime>,

    /// Trace identity, captured from the active span at emit time when not
    /// set explicitly.
    pub trace_context: Option<TraceContext>,

    /// The original severity string from the source.
    pub severity_text: Option<Cow<'static, str>>,

    /// The normalized severity.
    pub severity_number: Option<Severity>,

    /// The record body; `None` models the null body.
    pub body: Option<AnyValue>,

    /// Record attributes. Keys are unique; later writes replace.
    pub attributes: Vec<(Key, AnyValue)>,
}

impl SdkLogRecord {
    pub(crate) fn new() -> Self {
        SdkLogRecord::default()
    }

    /// Set the severity number and the matching text.
    pub fn set_severity(&mut self, severity: Severity) {
        self.severity_number = Some(severity);
        self.severity_text = Some(severity.name().into());
    }

    /// Set the record body.
    pub fn set_body(&mut self, body: AnyValue) {
        self.body = Some(body);
    }

    /// Set the event name.
    pub fn set_event_name(&mut self, name: impl Into<Cow<'static, str>>) {
        self.event_name = Some(name.into());
    }

    /// Set the source-reported timestamp.
    pub fn set_timestamp(&mut self, timestamp: SystemTime) {
        self.timestamp = Some(timestamp);
    }

    /// Add an attribute, replacing any previous value under the same key.
    pub fn add_attribute<K, V>(&mut self, key: K, value: V)
    where
        K: Into<Key>,
        V: Into<AnyValue>,
    {
        let key = key.into();
        let value = value.into();
        if let Some(existing) = self.attributes.iter_mut().find(|(k, _)| *k == key) {
            existing.1 = value;
        } else {
            self.attributes.push((key, value));
        }
    }

    /// Add multiple attributes.
    pub fn add_attributes<I, K, V>(&mut self, attributes: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Key>,
        V: Into<AnyValue>,
    {
        for (key, value) in attributes {
            self.add_attribute(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_names() {
        assert_eq!(Severity::Info.name(), "INFO");
        assert_eq!(Severity::Fatal4.name(), "FATAL4");
        assert!(Severity::Error > Severity::Warn);
    }

    #[test]
    fn attributes_replace_on_same_key() {
        let mut record = SdkLogRecord::new();
        record.add_attribute("k", 1i64);
        record.add_attribute("k", 2i64);
        record.add_attribute("other", "v");
        assert_eq!(record.attributes.len(), 2);
        assert_eq!(record.attributes[0].1, AnyValue::Int(2));
    }

    #[test]
    fn nested_body_values() {
        let mut record = SdkLogRecord::new();
        record.set_body([AnyValue::from(1i64), AnyValue::from("two")].into_iter().collect());
        match record.body {
            Some(AnyValue::ListAny(items)) => assert_eq!(items.len(), 2),
            other => panic!("unexpected body {other:?}"),
        }
    }
}
