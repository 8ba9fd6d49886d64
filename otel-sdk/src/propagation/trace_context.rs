//! # W3C Trace Context Propagator
//!

use otel::propagation::{Extractor, FieldIter, Injector, TextMapPropagator};
use otel::trace::{SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState};
use otel::Context;
use std::str::FromStr;
use std::sync::OnceLock;

const SUPPORTED_VERSION: u8 = 0;
const MAX_VERSION: u8 = 254;
const TRACEPARENT_HEADER: &str = "traceparent";
const TRACESTATE_HEADER: &str = "tracestate";

static TRACE_CONTEXT_HEADER_FIELDS: OnceLock<[String; 2]> = OnceLock::new();

fn trace_context_header_fields() -> &'static [String; 2] {
    TRACE_CONTEXT_HEADER_FIELDS
        .get_or_init(|| [TRACEPARENT_HEADER.to_owned(), TRACESTATE_HEADER.to_owned()])
}

/// Propagates span context in the [W3C TraceContext] format.
///
/// Injects a `traceparent` header of the form
///
/// `traceparent: 00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01`
///
/// whenever the context carries a valid span context, plus the
/// `tracestate` header verbatim. Extraction accepts future header
/// versions as long as the first four fields parse (forward
/// compatibility), and rejects malformed or all-zero ids; a successful
/// extraction yields a remote span context.
///
/// [W3C TraceContext]: https://www.w3.org/TR/trace-context/
#[derive(Clone, Debug, Default)]
pub struct TraceContextPropagator {
    _private: (),
}

impl TraceContextPropagator {
    /// Create a new `TraceContextPropagator`.
    pub fn new() -> Self {
        TraceContextPropagator { _private: () }
    }

    /// Extract a span context from the w3c trace-context headers.
    fn extract_span_context(&self, extractor: &dyn Extractor) -> Result<SpanContext, ()> {
        let header_value = extractor.get(TRACEPARENT_HEADER).unwrap_or("").trim();
        let parts = header_value.split_terminator('-').collect::<Vec<&str>>();
        if parts.len() < 4 {
            return Err(());
        }

        // Parse the version; version 0 must have exactly 4 fields, later
        // versions may carry extra fields we ignore.
        if parts[0].len() != 2 {
            return Err(());
        }
        let version = u8::from_str_radix(parts[0], 16).map_err(|_| ())?;
        if version > MAX_VERSION || (version == SUPPORTED_VERSION && parts.len() != 4) {
            return Err(());
        }

        // Ids must be lowercase hex of the exact width.
        if parts[1].len() != 32 || parts[1].chars().any(|c| c.is_ascii_uppercase()) {
            return Err(());
        }
        let trace_id = TraceId::from_hex(parts[1]).map_err(|_| ())?;

        if parts[2].len() != 16 || parts[2].chars().any(|c| c.is_ascii_uppercase()) {
            return Err(());
        }
        let span_id = SpanId::from_hex(parts[2]).map_err(|_| ())?;

        if parts[3].len() != 2 {
            return Err(());
        }
        let opts = u8::from_str_radix(parts[3], 16).map_err(|_| ())?;
        // only the sampled bit crosses the wire
        let trace_flags = TraceFlags::new(opts) & TraceFlags::SAMPLED;

        let trace_state = match extractor.get(TRACESTATE_HEADER) {
            Some(trace_state_str) => {
                TraceState::from_str(trace_state_str).unwrap_or_else(|_| TraceState::default())
            }
            None => TraceState::default(),
        };

        let span_context = SpanContext::new(trace_id, span_id, trace_flags, true, trace_state);
        if !span_context.is_valid() {
            return Err(());
        }

        Ok(span_context)
    }
}

impl TextMapPropagator for TraceContextPropagator {
    fn inject_context(&self, cx: &Context, injector: &mut dyn Injector) {
        if let Some(span_context) = cx.span_context().filter(|sc| sc.is_valid()) {
            let header_value = format!(
                "{:02x}-{}-{}-{:02x}",
                SUPPORTED_VERSION,
                span_context.trace_id(),
                span_context.span_id(),
                span_context.trace_flags() & TraceFlags::SAMPLED
            );
            injector.set(TRACEPARENT_HEADER, header_value);
            injector.set(TRACESTATE_HEADER, span_context.trace_state().header());
        }
    }

    fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context {
        self.extract_span_context(extractor)
            .map(|span_context| cx.with_remote_span_context(span_context))
            .unwrap_or_else(|_| cx.clone())
    }

    fn fields(&self) -> FieldIter<'_> {
        FieldIter::new(trace_context_header_fields())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn extract(header: &str) -> Option<SpanContext> {
        let mut carrier = HashMap::new();
        carrier.insert(TRACEPARENT_HEADER.to_string(), header.to_string());
        TraceContextPropagator::new()
            .extract_with_context(&Context::new(), &carrier)
            .span_context()
            .cloned()
    }

    #[test]
    fn traceparent_round_trip() {
        let propagator = TraceContextPropagator::new();
        let span_context = SpanContext::new(
            TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").unwrap(),
            SpanId::from_hex("00f067aa0ba902b7").unwrap(),
            TraceFlags::new(0x01),
            false,
            TraceState::default(),
        );
        let cx = Context::new().with_span_context(span_context);

        let mut carrier = HashMap::new();
        propagator.inject_context(&cx, &mut carrier);
        assert_eq!(
            carrier.get("traceparent").map(String::as_str),
            Some("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01")
        );

        let extracted = propagator.extract_with_context(&Context::new(), &carrier);
        let sc = extracted.span_context().unwrap();
        assert_eq!(
            sc.trace_id(),
            TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").unwrap()
        );
        assert_eq!(sc.span_id(), SpanId::from_hex("00f067aa0ba902b7").unwrap());
        assert!(sc.is_sampled());
        assert!(sc.is_remote());
    }

    #[test]
    fn tracestate_round_trip() {
        let propagator = TraceContextPropagator::new();
        let span_context = SpanContext::new(
            TraceId::from_u128(1),
            SpanId::from_u64(1),
            TraceFlags::SAMPLED,
            false,
            TraceState::from_key_value([("foo", "bar"), ("apple", "banana")]).unwrap(),
        );
        let cx = Context::new().with_span_context(span_context);

        let mut carrier = HashMap::new();
        propagator.inject_context(&cx, &mut carrier);
        assert_eq!(
            carrier.get("tracestate").map(String::as_str),
            Some("foo=bar,apple=banana")
        );

        let extracted = propagator.extract_with_context(&Context::new(), &carrier);
        assert_eq!(
            extracted.span_context().unwrap().trace_state().header(),
            "foo=bar,apple=banana"
        );
    }

    #[test]
    fn rejects_malformed_headers() {
        // wrong lengths
        assert!(extract("00-4bf92f3577b34da6a3ce929d0e0e473-00f067aa0ba902b7-01").is_none());
        assert!(extract("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b-01").is_none());
        // all-zero ids
        assert!(extract("00-00000000000000000000000000000000-00f067aa0ba902b7-01").is_none());
        assert!(extract("00-4bf92f3577b34da6a3ce929d0e0e4736-0000000000000000-01").is_none());
        // non-hex
        assert!(extract("00-zzzz2f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01").is_none());
        // uppercase
        assert!(extract("00-4BF92F3577B34DA6A3CE929D0E0E4736-00f067aa0ba902b7-01").is_none());
        // version ff is forbidden
        assert!(extract("ff-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01").is_none());
        // version 00 with extra fields is malformed
        assert!(
            extract("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01-extra").is_none()
        );
        // missing fields entirely
        assert!(extract("").is_none());
    }

    #[test]
    fn future_version_with_extra_fields_is_accepted() {
        let sc =
            extract("cc-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01-what-the-future-will-be-like")
                .unwrap();
        assert_eq!(
            sc.trace_id(),
            TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").unwrap()
        );
        assert!(sc.is_sampled());
    }

    #[test]
    fn extraction_failure_preserves_context() {
        #[derive(Debug, PartialEq)]
        struct Marker;
        let cx = Context::new().with_value(Marker);
        let carrier: HashMap<String, String> = HashMap::new();
        let extracted =
            TraceContextPropagator::new().extract_with_context(&cx, &carrier);
        assert_eq!(extracted.get::<Marker>(), Some(&Marker));
        assert!(extracted.span_context().is_none());
    }
}
