use crate::proto::trace::v1::{span, status, ResourceSpans, ScopeSpans, Span, Status};
use crate::transform::common::{to_nanos, Attributes};
use otel::trace::{Link, SpanId, SpanKind};
use otel::InstrumentationScope;
use otel_sdk::trace::SpanData;
use otel_sdk::Resource;
use std::collections::HashMap;

impl From<SpanKind> for span::SpanKind {
    fn from(span_kind: SpanKind) -> Self {
        match span_kind {
            SpanKind::Client => span::SpanKind::Client,
            SpanKind::Consumer => span::SpanKind::Consumer,
            SpanKind::Internal => span::SpanKind::Internal,
            SpanKind::Producer => span::SpanKind::Producer,
            SpanKind::Server => span::SpanKind::Server,
        }
    }
}

impl From<&otel::trace::Status> for status::StatusCode {
    fn from(status: &otel::trace::Status) -> Self {
        match status {
            otel::trace::Status::Ok => status::StatusCode::Ok,
            otel::trace::Status::Unset => status::StatusCode::Unset,
            otel::trace::Status::Error { .. } => status::StatusCode::Error,
        }
    }
}

impl From<Link> for span::Link {
    fn from(link: Link) -> Self {
        span::Link {
            trace_id: link.span_context.trace_id().to_bytes().to_vec(),
            span_id: link.span_context.span_id().to_bytes().to_vec(),
            trace_state: link.span_context.trace_state().header(),
            attributes: Attributes::from(link.attributes).0,
            dropped_attributes_count: link.dropped_attributes_count,
        }
    }
}

impl From<SpanData> for Span {
    fn from(source_span: SpanData) -> Self {
        let span_kind: span::SpanKind = source_span.span_kind.into();
        Span {
            trace_id: source_span.span_context.trace_id().to_bytes().to_vec(),
            span_id: source_span.span_context.span_id().to_bytes().to_vec(),
            trace_state: source_span.span_context.trace_state().header(),
            parent_span_id: {
                if source_span.parent_span_id != SpanId::INVALID {
                    source_span.parent_span_id.to_bytes().to_vec()
                } else {
                    vec![]
                }
            },
            name: source_span.name.into_owned(),
            kind: span_kind as i32,
            start_time_unix_nano: to_nanos(source_span.start_time),
            end_time_unix_nano: to_nanos(source_span.end_time),
            attributes: Attributes::from(source_span.attributes).0,
            dropped_attributes_count: source_span.dropped_attributes_count,
            dropped_events_count: source_span.events.dropped_count,
            events: source_span
                .events
                .into_iter()
                .map(|event| span::Event {
                    time_unix_nano: to_nanos(event.timestamp),
                    name: event.name.into(),
                    attributes: Attributes::from(event.attributes).0,
                    dropped_attributes_count: event.dropped_attributes_count,
                })
                .collect(),
            dropped_links_count: source_span.links.dropped_count,
            links: source_span.links.into_iter().map(Into::into).collect(),
            status: Some(Status {
                code: status::StatusCode::from(&source_span.status).into(),
                // a description is only carried while the status is Error
                message: match source_span.status {
                    otel::trace::Status::Error { description } => description.to_string(),
                    _ => Default::default(),
                },
            }),
        }
    }
}

/// Group a batch into OTLP `ResourceSpans`: one resource group (the
/// provider's resource) containing one `ScopeSpans` per instrumentation
/// scope, identified by name/version.
pub fn group_spans_by_resource_and_scope(
    spans: Vec<SpanData>,
    resource: &Resource,
) -> Vec<ResourceSpans> {
    if spans.is_empty() {
        return Vec::new();
    }

    let mut scope_map: HashMap<InstrumentationScope, Vec<SpanData>> = HashMap::new();
    for span in spans {
        scope_map
            .entry(span.instrumentation_scope.clone())
            .or_default()
            .push(span);
    }

    let scope_spans = scope_map
        .into_iter()
        .map(|(scope, spans)| ScopeSpans {
            schema_url: scope.schema_url().map(ToString::to_string).unwrap_or_default(),
            scope: Some((&scope).into()),
            spans: spans.into_iter().map(Into::into).collect(),
        })
        .collect();

    vec![ResourceSpans {
        resource: Some(resource.into()),
        scope_spans,
        schema_url: resource
            .schema_url()
            .map(ToString::to_string)
            .unwrap_or_default(),
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use otel::trace::{SpanContext, Status as SdkStatus, TraceFlags, TraceId, TraceState};
    use otel::KeyValue;
    use otel_sdk::trace::{SpanEvents, SpanLinks};

    fn span_data(scope: &str, name: &str) -> SpanData {
        SpanData {
            span_context: SpanContext::new(
                TraceId::from_u128(0x4bf92f3577b34da6a3ce929d0e0e4736),
                SpanId::from_u64(0x00f067aa0ba902b7),
                TraceFlags::SAMPLED,
                false,
                TraceState::default(),
            ),
            parent_span_id: SpanId::INVALID,
            span_kind: SpanKind::Client,
            name: name.to_string().into(),
            start_time: std::time::UNIX_EPOCH + std::time::Duration::from_micros(1_000_123),
            end_time: std::time::UNIX_EPOCH + std::time::Duration::from_micros(2_000_123),
            attributes: vec![KeyValue::new("k", "v")],
            dropped_attributes_count: 0,
            events: SpanEvents::default(),
            links: SpanLinks::default(),
            status: SdkStatus::error("boom"),
            instrumentation_scope: otel::InstrumentationScope::builder(scope.to_string())
                .with_version("1.0")
                .build(),
        }
    }

    #[test]
    fn ids_travel_as_raw_bytes_and_times_as_nanos() {
        let proto: Span = span_data("lib", "op").into();
        assert_eq!(proto.trace_id.len(), 16);
        assert_eq!(proto.span_id.len(), 8);
        assert_eq!(proto.parent_span_id.len(), 0);
        // microsecond-precision input scales to nanoseconds
        assert_eq!(proto.start_time_unix_nano, 1_000_123_000);
        assert_eq!(proto.end_time_unix_nano, 2_000_123_000);
        assert_eq!(proto.kind, span::SpanKind::Client as i32);
        let status = proto.status.unwrap();
        assert_eq!(status.code, status::StatusCode::Error as i32);
        assert_eq!(status.message, "boom");
    }

    #[test]
    fn ok_status_carries_no_message() {
        let mut data = span_data("lib", "op");
        data.status = SdkStatus::Ok;
        let proto: Span = data.into();
        let status = proto.status.unwrap();
        assert_eq!(status.code, status::StatusCode::Ok as i32);
        assert_eq!(status.message, "");
    }

    #[test]
    fn groups_by_scope_under_one_resource() {
        let resource = Resource::builder_empty().with_service_name("svc").build();
        let batch = vec![
            span_data("lib-a", "one"),
            span_data("lib-b", "two"),
            span_data("lib-a", "three"),
        ];

        let grouped = group_spans_by_resource_and_scope(batch, &resource);
        assert_eq!(grouped.len(), 1);
        assert!(grouped[0].resource.is_some());

        let mut scopes: Vec<(String, usize)> = grouped[0]
            .scope_spans
            .iter()
            .map(|ss| (ss.scope.as_ref().unwrap().name.clone(), ss.spans.len()))
            .collect();
        scopes.sort();
        assert_eq!(scopes, vec![("lib-a".to_string(), 2), ("lib-b".to_string(), 1)]);
    }

    #[test]
    fn empty_batch_produces_no_groups() {
        let resource = Resource::empty();
        assert!(group_spans_by_resource_and_scope(Vec::new(), &resource).is_empty());
    }
}
