use crate::propagation::{Extractor, FieldIter, Injector, TextMapPropagator};
use crate::Context;

/// A propagator that chains multiple propagators.
///
/// Injection applies each propagator in the order supplied; extraction
/// applies the same order, feeding each extractor the accumulating context.
///
/// # Examples
///
/// ```
/// use otel::propagation::{TextMapCompositePropagator, TextMapPropagator};
/// use std::collections::HashMap;
///
/// let composite = TextMapCompositePropagator::new(vec![]);
/// let carrier: HashMap<String, String> = HashMap::new();
/// let _cx = composite.extract(&carrier);
/// ```
#[derive(Debug)]
pub struct TextMapCompositePropagator {
    propagators: Vec<Box<dyn TextMapPropagator + Send + Sync>>,
    fields: Vec<String>,
}

impl TextMapCompositePropagator {
    /// Constructs a new propagator out of instances of [`TextMapPropagator`].
    pub fn new(propagators: Vec<Box<dyn TextMapPropagator + Send + Sync>>) -> Self {
        let mut fields = Vec::new();
        for propagator in &propagators {
            for field in propagator.fields() {
                if !fields.contains(&field.to_string()) {
                    fields.push(field.to_string());
                }
            }
        }

        TextMapCompositePropagator {
            propagators,
            fields,
        }
    }
}

impl TextMapPropagator for TextMapCompositePropagator {
    fn inject_context(&self, context: &Context, injector: &mut dyn Injector) {
        for propagator in &self.propagators {
            propagator.inject_context(context, injector)
        }
    }

    fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context {
        self.propagators
            .iter()
            .fold(cx.clone(), |current_cx, propagator| {
                propagator.extract_with_context(&current_cx, extractor)
            })
    }

    fn fields(&self) -> FieldIter<'_> {
        FieldIter::new(self.fields.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{SpanContext, SpanId, TraceFlags, TraceId, TraceState};
    use std::collections::HashMap;

    /// A test propagator writing the trace id under a configurable header.
    #[derive(Debug)]
    struct TestPropagator {
        fields: Vec<String>,
    }

    impl TestPropagator {
        fn new(field: &str) -> Self {
            TestPropagator {
                fields: vec![field.to_string()],
            }
        }
    }

    impl TextMapPropagator for TestPropagator {
        fn inject_context(&self, cx: &Context, injector: &mut dyn Injector) {
            if let Some(sc) = cx.span_context() {
                injector.set(&self.fields[0], sc.trace_id().to_string());
            }
        }

        fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context {
            match extractor
                .get(&self.fields[0])
                .and_then(|v| TraceId::from_hex(v).ok())
            {
                Some(trace_id) => cx.with_span_context(SpanContext::new(
                    trace_id,
                    SpanId::from_u64(1),
                    TraceFlags::default(),
                    true,
                    TraceState::default(),
                )),
                None => cx.clone(),
            }
        }

        fn fields(&self) -> FieldIter<'_> {
            FieldIter::new(&self.fields)
        }
    }

    #[test]
    fn fields_are_deduplicated_union() {
        let composite = TextMapCompositePropagator::new(vec![
            Box::new(TestPropagator::new("a")),
            Box::new(TestPropagator::new("b")),
            Box::new(TestPropagator::new("a")),
        ]);
        let fields: Vec<&str> = composite.fields().collect();
        assert_eq!(fields, vec!["a", "b"]);
    }

    #[test]
    fn extract_accumulates_context() {
        let composite = TextMapCompositePropagator::new(vec![
            Box::new(TestPropagator::new("first")),
            Box::new(TestPropagator::new("second")),
        ]);

        let mut carrier = HashMap::new();
        carrier.insert("first".to_string(), format!("{:032x}", 5u128));

        let cx = composite.extract_with_context(&Context::new(), &carrier);
        // later propagators see (and here preserve) the accumulated value
        assert_eq!(
            cx.span_context().map(|sc| sc.trace_id()),
            Some(TraceId::from_u128(5))
        );
    }

    #[test]
    fn inject_applies_all() {
        let composite = TextMapCompositePropagator::new(vec![
            Box::new(TestPropagator::new("x")),
            Box::new(TestPropagator::new("y")),
        ]);
        let cx = Context::new().with_span_context(SpanContext::new(
            TraceId::from_u128(9),
            SpanId::from_u64(1),
            TraceFlags::default(),
            false,
            TraceState::default(),
        ));
        let mut carrier = HashMap::new();
        composite.inject_context(&cx, &mut carrier);
        assert_eq!(carrier.len(), 2);
    }
}
