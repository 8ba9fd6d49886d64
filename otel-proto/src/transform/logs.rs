use crate::proto::common::v1::{any_value, AnyValue as ProtoAnyValue, KeyValueList};
use crate::proto::logs::v1::{LogRecord, ResourceLogs, ScopeLogs};
use crate::transform::common::to_nanos;
use otel::InstrumentationScope;
use otel_sdk::logs::{AnyValue, SdkLogRecord, Severity};
use otel_sdk::Resource;
use std::collections::HashMap;

impl From<AnyValue> for ProtoAnyValue {
    fn from(value: AnyValue) -> Self {
        ProtoAnyValue {
            value: match value {
                AnyValue::Int(val) => Some(any_value::Value::IntValue(val)),
                AnyValue::Double(val) => Some(any_value::Value::DoubleValue(val)),
                AnyValue::String(val) => Some(any_value::Value::StringValue(val.into())),
                AnyValue::Boolean(val) => Some(any_value::Value::BoolValue(val)),
                AnyValue::ListAny(values) => Some(any_value::Value::ArrayValue(
                    crate::proto::common::v1::ArrayValue {
                        values: values.into_iter().map(Into::into).collect(),
                    },
                )),
                AnyValue::Map(entries) => Some(any_value::Value::KvlistValue(KeyValueList {
                    values: entries
                        .into_iter()
                        .map(|(key, value)| crate::proto::common::v1::KeyValue {
                            key: key.as_str().to_string(),
                            value: Some(value.into()),
                        })
                        .collect(),
                })),
                _ => None,
            },
        }
    }
}

fn severity_number(severity: Severity) -> i32 {
    // the SDK severity discriminants are the protocol's
    severity as i32
}

impl From<SdkLogRecord> for LogRecord {
    fn from(record: SdkLogRecord) -> Self {
        let trace_context = record.trace_context.as_ref();
        LogRecord {
            time_unix_nano: record.timestamp.map(to_nanos).unwrap_or_default(),
            observed_time_unix_nano: record.observed_timestamp.map(to_nanos).unwrap_or_default(),
            severity_number: record
                .severity_number
                .map(severity_number)
                .unwrap_or_default(),
            severity_text: record
                .severity_text
                .map(|text| text.into_owned())
                .unwrap_or_default(),
            body: record.body.map(Into::into),
            attributes: record
                .attributes
                .into_iter()
                .map(|(key, value)| crate::proto::common::v1::KeyValue {
                    key: key.as_str().to_string(),
                    value: Some(value.into()),
                })
                .collect(),
            dropped_attributes_count: 0,
            flags: trace_context
                .and_then(|tc| tc.trace_flags)
                .map(|flags| flags.to_u8() as u32)
                .unwrap_or_default(),
            trace_id: trace_context
                .map(|tc| tc.trace_id.to_bytes().to_vec())
                .unwrap_or_default(),
            span_id: trace_context
                .map(|tc| tc.span_id.to_bytes().to_vec())
                .unwrap_or_default(),
            event_name: record
                .event_name
                .map(|name| name.into_owned())
                .unwrap_or_default(),
        }
    }
}

/// Group a batch into OTLP `ResourceLogs`: one resource group containing
/// one `ScopeLogs` per instrumentation scope.
pub fn group_logs_by_resource_and_scope(
    batch: Vec<(SdkLogRecord, InstrumentationScope)>,
    resource: &Resource,
) -> Vec<ResourceLogs> {
    if batch.is_empty() {
        return Vec::new();
    }

    let mut scope_map: HashMap<InstrumentationScope, Vec<SdkLogRecord>> = HashMap::new();
    for (record, scope) in batch {
        scope_map.entry(scope).or_default().push(record);
    }

    let scope_logs = scope_map
        .into_iter()
        .map(|(scope, records)| ScopeLogs {
            schema_url: scope.schema_url().map(ToString::to_string).unwrap_or_default(),
            scope: Some((&scope).into()),
            log_records: records.into_iter().map(Into::into).collect(),
        })
        .collect();

    vec![ResourceLogs {
        resource: Some(resource.into()),
        scope_logs,
        schema_url: resource
            .schema_url()
            .map(ToString::to_string)
            .unwrap_or_default(),
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use otel::trace::{SpanId, TraceFlags, TraceId};
    use otel_sdk::logs::TraceContext;

    #[test]
    fn record_mapping_carries_trace_identity() {
        let mut record = SdkLogRecord::default();
        record.set_severity(Severity::Warn);
        record.set_body("something happened".into());
        record.add_attribute("k", 1i64);
        record.trace_context = Some(TraceContext {
            trace_id: TraceId::from_u128(7),
            span_id: SpanId::from_u64(8),
            trace_flags: Some(TraceFlags::SAMPLED),
        });
        record.observed_timestamp =
            Some(std::time::UNIX_EPOCH + std::time::Duration::from_secs(1));

        let proto: LogRecord = record.into();
        assert_eq!(proto.severity_number, 13);
        assert_eq!(proto.severity_text, "WARN");
        assert_eq!(proto.trace_id, TraceId::from_u128(7).to_bytes().to_vec());
        assert_eq!(proto.span_id, SpanId::from_u64(8).to_bytes().to_vec());
        assert_eq!(proto.flags, 1);
        assert_eq!(proto.observed_time_unix_nano, 1_000_000_000);
        // the source timestamp was never set
        assert_eq!(proto.time_unix_nano, 0);
    }

    #[test]
    fn nested_bodies_map_to_kvlist_and_array() {
        let mut record = SdkLogRecord::default();
        let mut map = std::collections::HashMap::new();
        map.insert(otel::Key::new("list"), AnyValue::from_iter([1i64, 2]));
        record.set_body(AnyValue::Map(Box::new(map)));

        let proto: LogRecord = record.into();
        match proto.body.unwrap().value.unwrap() {
            any_value::Value::KvlistValue(kvlist) => {
                assert_eq!(kvlist.values.len(), 1);
                match kvlist.values[0].value.as_ref().unwrap().value.as_ref().unwrap() {
                    any_value::Value::ArrayValue(array) => assert_eq!(array.values.len(), 2),
                    other => panic!("unexpected {other:?}"),
                }
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn groups_by_scope() {
        let resource = Resource::builder_empty().build();
        let scope_a = InstrumentationScope::builder("a").build();
        let scope_b = InstrumentationScope::builder("b").build();
        let batch = vec![
            (SdkLogRecord::default(), scope_a.clone()),
            (SdkLogRecord::default(), scope_b),
            (SdkLogRecord::default(), scope_a),
        ];

        let grouped = group_logs_by_resource_and_scope(batch, &resource);
        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped[0].scope_logs.len(), 2);
        let total: usize = grouped[0].scope_logs.iter().map(|sl| sl.log_records.len()).sum();
        assert_eq!(total, 3);
    }
}
