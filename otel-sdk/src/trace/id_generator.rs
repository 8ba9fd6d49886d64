use otel::trace::{SpanId, TraceId};
use rand::Rng;
use std::fmt;

/// Generates new trace and span identifiers.
pub trait IdGenerator: Send + Sync + fmt::Debug {
    /// Generate a new, valid `TraceId`.
    fn new_trace_id(&self) -> TraceId;

    /// Generate a new, valid `SpanId`.
    fn new_span_id(&self) -> SpanId;
}

/// Generates identifiers from the thread-local CSPRNG.
///
/// All-zero draws are invalid ids and are redrawn.
#[derive(Clone, Debug, Default)]
pub struct RandomIdGenerator {
    _private: (),
}

impl IdGenerator for RandomIdGenerator {
    fn new_trace_id(&self) -> TraceId {
        let mut rng = rand::rng();
        loop {
            let id = TraceId::from_u128(rng.random());
            if id.is_valid() {
                return id;
            }
        }
    }

    fn new_span_id(&self) -> SpanId {
        let mut rng = rand::rng();
        loop {
            let id = SpanId::from_u64(rng.random());
            if id.is_valid() {
                return id;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_valid_and_distinct() {
        let generator = RandomIdGenerator::default();
        let a = generator.new_trace_id();
        let b = generator.new_trace_id();
        assert!(a.is_valid());
        assert!(b.is_valid());
        assert_ne!(a, b);

        assert!(generator.new_span_id().is_valid());
    }
}
