use otel::trace::{Link, SpanKind, TraceId, TraceState};
use otel::{Context, KeyValue};
use std::fmt;

/// The decision half of a [`SamplingResult`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SamplingDecision {
    /// The span will not be recorded and all events and attributes will be
    /// dropped.
    Drop,
    /// The span will be recorded but the `sampled` flag stays unset, so
    /// processors will not forward it to exporters.
    RecordOnly,
    /// The span will be recorded and exported.
    RecordAndSample,
}

/// The output of a sampling consultation.
#[derive(Clone, Debug, PartialEq)]
pub struct SamplingResult {
    /// The sampling decision.
    pub decision: SamplingDecision,
    /// Extra attributes the sampler adds to the span.
    pub attributes: Vec<KeyValue>,
    /// The trace state to use; `None` inherits the parent's.
    pub trace_state: Option<TraceState>,
}

/// Decides, at span creation time, whether a span is recorded and sampled.
///
/// Consulted exactly once per span, before the span exists; the decision
/// is immutable afterwards.
pub trait ShouldSample: CloneShouldSample + Send + Sync + fmt::Debug {
    /// Returns the sampling decision for a span to be created.
    fn should_sample(
        &self,
        parent_context: Option<&Context>,
        trace_id: TraceId,
        name: &str,
        span_kind: &SpanKind,
        attributes: &[KeyValue],
        links: &[Link],
    ) -> SamplingResult;
}

/// Boxed cloning support for [`ShouldSample`] trait objects.
pub trait CloneShouldSample {
    /// Box-clone this sampler.
    fn box_clone(&self) -> Box<dyn ShouldSample>;
}

impl<T> CloneShouldSample for T
where
    T: ShouldSample + Clone + 'static,
{
    fn box_clone(&self) -> Box<dyn ShouldSample> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn ShouldSample> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// The built-in samplers.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum Sampler {
    /// Always sample the trace.
    AlwaysOn,
    /// Never sample the trace.
    AlwaysOff,
    /// Sample a given fraction of traces, deterministically in the trace
    /// id: the low 8 bytes of the id are compared against
    /// `fraction · 2⁶⁴`, so all participants with the same id agree.
    ///
    /// Fractions `>= 1` always sample, `<= 0` never sample.
    TraceIdRatioBased(f64),
    /// Respect the parent span's sampling decision, delegating by parent
    /// kind, with a root sampler for spans without a parent.
    ParentBased(Box<ParentBased>),
}

impl Sampler {
    /// A parent-based sampler with the given root sampler and the
    /// conventional defaults for the four parent cases (sampled parents
    /// stay sampled, unsampled parents stay unsampled).
    pub fn parent_based(root: Box<dyn ShouldSample>) -> Self {
        Sampler::ParentBased(Box::new(ParentBased::new(root)))
    }
}

/// The five delegates of a parent-based sampler.
#[derive(Clone, Debug)]
pub struct ParentBased {
    /// Used for spans with no parent.
    pub root: Box<dyn ShouldSample>,
    /// Used when the parent is remote and sampled.
    pub remote_parent_sampled: Box<dyn ShouldSample>,
    /// Used when the parent is remote and not sampled.
    pub remote_parent_not_sampled: Box<dyn ShouldSample>,
    /// Used when the parent is local and sampled.
    pub local_parent_sampled: Box<dyn ShouldSample>,
    /// Used when the parent is local and not sampled.
    pub local_parent_not_sampled: Box<dyn ShouldSample>,
}

impl ParentBased {
    /// Create a parent-based sampler with default delegates.
    pub fn new(root: Box<dyn ShouldSample>) -> Self {
        ParentBased {
            root,
            remote_parent_sampled: Box::new(Sampler::AlwaysOn),
            remote_parent_not_sampled: Box::new(Sampler::AlwaysOff),
            local_parent_sampled: Box::new(Sampler::AlwaysOn),
            local_parent_not_sampled: Box::new(Sampler::AlwaysOff),
        }
    }

    /// Replace the remote-parent-sampled delegate.
    pub fn with_remote_parent_sampled(mut self, sampler: Box<dyn ShouldSample>) -> Self {
        self.remote_parent_sampled = sampler;
        self
    }

    /// Replace the remote-parent-not-sampled delegate.
    pub fn with_remote_parent_not_sampled(mut self, sampler: Box<dyn ShouldSample>) -> Self {
        self.remote_parent_not_sampled = sampler;
        self
    }

    /// Replace the local-parent-sampled delegate.
    pub fn with_local_parent_sampled(mut self, sampler: Box<dyn ShouldSample>) -> Self {
        self.local_parent_sampled = sampler;
        self
    }

    /// Replace the local-parent-not-sampled delegate.
    pub fn with_local_parent_not_sampled(mut self, sampler: Box<dyn ShouldSample>) -> Self {
        self.local_parent_not_sampled = sampler;
        self
    }
}

impl ShouldSample for Sampler {
    fn should_sample(
        &self,
        parent_context: Option<&Context>,
        trace_id: TraceId,
        name: &str,
        span_kind: &SpanKind,
        attributes: &[KeyValue],
        links: &[Link],
    ) -> SamplingResult {
        let decision = match self {
            Sampler::AlwaysOn => SamplingDecision::RecordAndSample,
            Sampler::AlwaysOff => SamplingDecision::Drop,
            Sampler::TraceIdRatioBased(fraction) => {
                if *fraction >= 1.0 {
                    SamplingDecision::RecordAndSample
                } else if *fraction <= 0.0 {
                    SamplingDecision::Drop
                } else {
                    // fraction · 2⁶⁴, compared against the low 8 bytes of the
                    // trace id. The product is < 2⁶⁴ for fraction < 1, so the
                    // cast is exact enough to keep the comparison strict.
                    let threshold = (fraction * (u64::MAX as f64 + 1.0)) as u64;
                    if trace_id.low_u64() < threshold {
                        SamplingDecision::RecordAndSample
                    } else {
                        SamplingDecision::Drop
                    }
                }
            }
            Sampler::ParentBased(parent_based) => {
                let parent = parent_context
                    .and_then(|cx| cx.span_context())
                    .filter(|sc| sc.is_valid());
                let delegate = match parent {
                    None => &parent_based.root,
                    Some(sc) => match (sc.is_remote(), sc.is_sampled()) {
                        (true, true) => &parent_based.remote_parent_sampled,
                        (true, false) => &parent_based.remote_parent_not_sampled,
                        (false, true) => &parent_based.local_parent_sampled,
                        (false, false) => &parent_based.local_parent_not_sampled,
                    },
                };
                return delegate.should_sample(
                    parent_context,
                    trace_id,
                    name,
                    span_kind,
                    attributes,
                    links,
                );
            }
        };

        SamplingResult {
            decision,
            attributes: Vec::new(),
            // inherit the parent trace state
            trace_state: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otel::trace::{SpanContext, SpanId, TraceFlags};

    fn sample(sampler: &Sampler, cx: Option<&Context>, trace_id: TraceId) -> SamplingDecision {
        sampler
            .should_sample(cx, trace_id, "op", &SpanKind::Internal, &[], &[])
            .decision
    }

    fn parent_cx(sampled: bool, remote: bool) -> Context {
        Context::new().with_span_context(SpanContext::new(
            TraceId::from_u128(1),
            SpanId::from_u64(1),
            TraceFlags::default().with_sampled(sampled),
            remote,
            TraceState::default(),
        ))
    }

    #[test]
    fn always_on_off() {
        let id = TraceId::from_u128(42);
        assert_eq!(
            sample(&Sampler::AlwaysOn, None, id),
            SamplingDecision::RecordAndSample
        );
        assert_eq!(sample(&Sampler::AlwaysOff, None, id), SamplingDecision::Drop);
    }

    #[test]
    fn ratio_is_deterministic_in_trace_id() {
        let sampler = Sampler::TraceIdRatioBased(0.5);
        let id = TraceId::from_u128(0xdeadbeef);
        let first = sample(&sampler, None, id);
        for _ in 0..10 {
            assert_eq!(sample(&sampler, None, id), first);
        }
    }

    #[test]
    fn ratio_edges() {
        // low bytes far below half of the u64 range samples at 0.5
        let low = TraceId::from_u128(1);
        assert_eq!(
            sample(&Sampler::TraceIdRatioBased(0.5), None, low),
            SamplingDecision::RecordAndSample
        );
        // low bytes at the top of the range does not
        let high = TraceId::from_u128(u64::MAX as u128);
        assert_eq!(
            sample(&Sampler::TraceIdRatioBased(0.5), None, high),
            SamplingDecision::Drop
        );
        assert_eq!(
            sample(&Sampler::TraceIdRatioBased(1.0), None, high),
            SamplingDecision::RecordAndSample
        );
        assert_eq!(
            sample(&Sampler::TraceIdRatioBased(0.0), None, low),
            SamplingDecision::Drop
        );
    }

    #[test]
    fn parent_based_delegation() {
        let sampler = Sampler::parent_based(Box::new(Sampler::AlwaysOff));

        // no parent: root decides
        assert_eq!(sample(&sampler, None, TraceId::from_u128(7)), SamplingDecision::Drop);

        // sampled parents keep sampling, local or remote
        for remote in [true, false] {
            let cx = parent_cx(true, remote);
            assert_eq!(
                sample(&sampler, Some(&cx), TraceId::from_u128(7)),
                SamplingDecision::RecordAndSample
            );
            let cx = parent_cx(false, remote);
            assert_eq!(
                sample(&sampler, Some(&cx), TraceId::from_u128(7)),
                SamplingDecision::Drop
            );
        }
    }
}
