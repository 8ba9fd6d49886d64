use crate::metrics::data::Exemplar;
use otel::trace::{SpanId, TraceId};
use otel::{Context, KeyValue};
use rand::Rng;

/// A fixed-size reservoir of sampled measurements.
///
/// Sampling is trace-gated: a measurement is only offered when it happens
/// inside a sampled span, so every kept exemplar can point back at a
/// recorded trace. Classic reservoir sampling keeps each offered
/// measurement with probability `capacity / offers`.
#[derive(Debug)]
pub(crate) struct ExemplarReservoir<T> {
    capacity: usize,
    offered: usize,
    storage: Vec<Exemplar<T>>,
}

impl<T: Copy> ExemplarReservoir<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        ExemplarReservoir {
            capacity,
            offered: 0,
            storage: Vec::new(),
        }
    }

    /// Offer a measurement together with the attributes the aggregation
    /// filtered out.
    pub(crate) fn offer(&mut self, value: T, filtered_attributes: &[KeyValue]) {
        let Some((trace_id, span_id)) = current_sampled_trace() else {
            return;
        };

        let exemplar = Exemplar {
            filtered_attributes: filtered_attributes.to_vec(),
            time: otel::time::now(),
            value,
            span_id,
            trace_id,
        };

        self.offered += 1;
        if self.storage.len() < self.capacity {
            self.storage.push(exemplar);
        } else {
            let slot = rand::rng().random_range(0..self.offered);
            if slot < self.capacity {
                self.storage[slot] = exemplar;
            }
        }
    }

    /// The sampled exemplars, in no particular order.
    pub(crate) fn collect(&self) -> Vec<Exemplar<T>> {
        self.storage.clone()
    }
}

fn current_sampled_trace() -> Option<(TraceId, SpanId)> {
    Context::map_current(|cx| {
        cx.span_context()
            .filter(|sc| sc.is_valid() && sc.is_sampled())
            .map(|sc| (sc.trace_id(), sc.span_id()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use otel::trace::{SpanContext, TraceFlags, TraceState};

    fn sampled_context() -> Context {
        Context::new().with_span_context(SpanContext::new(
            TraceId::from_u128(7),
            SpanId::from_u64(8),
            TraceFlags::SAMPLED,
            false,
            TraceState::default(),
        ))
    }

    #[test]
    fn offers_outside_sampled_span_are_ignored() {
        let mut reservoir = ExemplarReservoir::<i64>::new(4);
        reservoir.offer(1, &[]);
        assert!(reservoir.collect().is_empty());
    }

    #[test]
    fn reservoir_is_bounded() {
        let _guard = sampled_context().attach();
        let mut reservoir = ExemplarReservoir::<i64>::new(4);
        for i in 0..100 {
            reservoir.offer(i, &[]);
        }
        assert_eq!(reservoir.collect().len(), 4);
    }

    #[test]
    fn exemplar_records_trace_identity_and_filtered_attributes() {
        let _guard = sampled_context().attach();
        let mut reservoir = ExemplarReservoir::<f64>::new(2);
        reservoir.offer(1.5, &[KeyValue::new("dropped", "yes")]);

        let exemplars = reservoir.collect();
        assert_eq!(exemplars.len(), 1);
        assert_eq!(exemplars[0].trace_id, TraceId::from_u128(7));
        assert_eq!(exemplars[0].span_id, SpanId::from_u64(8));
        assert_eq!(
            exemplars[0].filtered_attributes,
            vec![KeyValue::new("dropped", "yes")]
        );
    }
}
