use crate::proto::common::v1::{any_value, AnyValue, ArrayValue, InstrumentationScope, KeyValue};
use crate::proto::resource::v1::Resource;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Nanoseconds since the Unix epoch; times before the epoch clamp to 0.
pub(crate) fn to_nanos(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_nanos() as u64
}

impl From<otel::Value> for AnyValue {
    fn from(value: otel::Value) -> Self {
        AnyValue {
            value: match value {
                otel::Value::Bool(val) => Some(any_value::Value::BoolValue(val)),
                otel::Value::I64(val) => Some(any_value::Value::IntValue(val)),
                otel::Value::F64(val) => Some(any_value::Value::DoubleValue(val)),
                otel::Value::String(val) => Some(any_value::Value::StringValue(val.into())),
                otel::Value::Array(array) => Some(any_value::Value::ArrayValue(match array {
                    otel::Array::Bool(vals) => array_into_proto(vals),
                    otel::Array::I64(vals) => array_into_proto(vals),
                    otel::Array::F64(vals) => array_into_proto(vals),
                    otel::Array::String(vals) => array_into_proto(vals),
                })),
            },
        }
    }
}

fn array_into_proto<T>(vals: Vec<T>) -> ArrayValue
where
    otel::Value: From<T>,
{
    let values = vals
        .into_iter()
        .map(|val| AnyValue::from(otel::Value::from(val)))
        .collect();

    ArrayValue { values }
}

impl From<otel::KeyValue> for KeyValue {
    fn from(kv: otel::KeyValue) -> Self {
        KeyValue {
            key: kv.key.as_str().to_string(),
            value: Some(kv.value.into()),
        }
    }
}

/// Wrapper type for `Vec<KeyValue>` conversions.
#[derive(Default)]
pub struct Attributes(pub Vec<KeyValue>);

impl From<Vec<otel::KeyValue>> for Attributes {
    fn from(kvs: Vec<otel::KeyValue>) -> Self {
        Attributes(kvs.into_iter().map(Into::into).collect())
    }
}

impl From<&[otel::KeyValue]> for Attributes {
    fn from(kvs: &[otel::KeyValue]) -> Self {
        kvs.to_vec().into()
    }
}

impl From<&otel::InstrumentationScope> for InstrumentationScope {
    fn from(scope: &otel::InstrumentationScope) -> Self {
        InstrumentationScope {
            name: scope.name().to_string(),
            version: scope.version().map(ToString::to_string).unwrap_or_default(),
            attributes: Attributes::from(scope.attributes().cloned().collect::<Vec<_>>()).0,
            dropped_attributes_count: 0,
        }
    }
}

impl From<&otel_sdk::Resource> for Resource {
    fn from(resource: &otel_sdk::Resource) -> Self {
        Resource {
            attributes: Attributes::from(
                resource
                    .iter()
                    .map(|(k, v)| otel::KeyValue {
                        key: k.clone(),
                        value: v.clone(),
                    })
                    .collect::<Vec<_>>(),
            )
            .0,
            dropped_attributes_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_mapping() {
        let proto: AnyValue = otel::Value::from(42i64).into();
        assert_eq!(proto.value, Some(any_value::Value::IntValue(42)));

        let proto: AnyValue = otel::Value::from(vec![1.5f64, 2.5]).into();
        match proto.value {
            Some(any_value::Value::ArrayValue(array)) => assert_eq!(array.values.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn scope_mapping_defaults_missing_version() {
        let scope = otel::InstrumentationScope::builder("lib").build();
        let proto: InstrumentationScope = (&scope).into();
        assert_eq!(proto.name, "lib");
        assert_eq!(proto.version, "");
    }
}
