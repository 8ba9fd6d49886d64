//! Aggregation storage shared by the concrete aggregates.
//!
//! Every instrument stream owns a [`ValueMap`]: a mutex-guarded mapping
//! from the normalized attribute set of a measurement to a running
//! aggregate. Normalization sorts by key and drops duplicate keys, so two
//! attribute sets with equal content always land on the same tracker, the
//! empty set included. The lock is per instrument stream and is released
//! before any downstream call.

mod exemplar;
mod histogram;
mod last_value;
mod precomputed_sum;
mod sum;

pub(crate) use exemplar::ExemplarReservoir;
pub(crate) use histogram::{ExplicitBucketHistogram, DEFAULT_BUCKET_BOUNDARIES};
pub(crate) use last_value::LastValue;
pub(crate) use precomputed_sum::PrecomputedSum;
pub(crate) use sum::Sum;

use crate::metrics::data::{AggregatedMetrics, MetricData};
use otel::{otel_warn, Key, KeyValue};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::ops::{Add, AddAssign, Sub};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::SystemTime;

/// Default cap on distinct attribute sets per instrument stream.
pub(crate) const DEFAULT_CARDINALITY_LIMIT: usize = 2000;

/// The attribute set measurements overflow into once the cardinality
/// limit is reached.
pub(crate) fn stream_overflow_attributes() -> Vec<KeyValue> {
    vec![KeyValue::new("otel.metric.overflow", "true")]
}

/// The numeric types measurements can carry.
pub(crate) trait Number:
    Copy
    + PartialOrd
    + Default
    + Send
    + Sync
    + fmt::Debug
    + Add<Output = Self>
    + AddAssign
    + Sub<Output = Self>
    + 'static
{
    /// Tag aggregated data with this type's value kind.
    fn wrap_data(data: MetricData<Self>) -> AggregatedMetrics;

    /// Lossy conversion for bucket lookups.
    fn as_f64(self) -> f64;

    /// Whether this value is below zero (monotonicity checks).
    fn is_negative(self) -> bool;
}

impl Number for i64 {
    fn wrap_data(data: MetricData<Self>) -> AggregatedMetrics {
        AggregatedMetrics::I64(data)
    }

    fn as_f64(self) -> f64 {
        self as f64
    }

    fn is_negative(self) -> bool {
        self < 0
    }
}

impl Number for f64 {
    fn wrap_data(data: MetricData<Self>) -> AggregatedMetrics {
        AggregatedMetrics::F64(data)
    }

    fn as_f64(self) -> f64 {
        self
    }

    fn is_negative(self) -> bool {
        self < 0.0
    }
}

/// The update half of an instrument stream: one per pipeline and view
/// stream, fanned out to by the instrument handle.
pub(crate) trait Measure<T>: Send + Sync {
    /// Record a measurement under the given (unfiltered) attributes.
    fn call(&self, measurement: T, attributes: &[KeyValue]);

    /// Clear observed state before a fresh round of observations.
    ///
    /// Only meaningful for asynchronous instrument storage, where each
    /// collection's observations replace the previous ones.
    fn reset_observations(&self) {}
}

/// The collect half of an instrument stream.
pub(crate) trait ComputeAggregation: Send + Sync {
    /// Materialize the current point set, or `None` when there is nothing
    /// to report.
    fn call(&self) -> Option<AggregatedMetrics>;
}

/// Sort by key and drop duplicate keys, keeping the first occurrence.
/// This is the normalized form attribute-set equality is defined over.
pub(crate) fn sort_and_dedup(attributes: &[KeyValue]) -> Vec<KeyValue> {
    let mut sorted = attributes.to_vec();
    sorted.sort_by(|a, b| a.key.cmp(&b.key));
    sorted.dedup_by(|a, b| a.key == b.key);
    sorted
}

/// A per-stream tracker factory.
pub(crate) trait Aggregator: Send + Sync {
    /// Static configuration needed to initialize a tracker, e.g. bucket
    /// bounds.
    type InitConfig: Send + Sync;

    /// Called every time a new attribute set is stored.
    fn create(init: &Self::InitConfig) -> Self;
}

/// The storage behind every aggregate: normalized attribute set → tracker.
pub(crate) struct ValueMap<A: Aggregator> {
    trackers: Mutex<HashMap<Vec<KeyValue>, A>>,
    config: A::InitConfig,
    cardinality_limit: usize,
    overflow_logged: AtomicBool,
}

impl<A: Aggregator> ValueMap<A> {
    pub(crate) fn new(config: A::InitConfig, cardinality_limit: usize) -> Self {
        ValueMap {
            trackers: Mutex::new(HashMap::new()),
            config,
            cardinality_limit,
            overflow_logged: AtomicBool::new(false),
        }
    }

    /// Update the tracker for the given attribute set, creating it if the
    /// cardinality budget allows, and otherwise folding the measurement
    /// into the overflow set.
    pub(crate) fn measure(&self, attributes: &[KeyValue], update: impl FnOnce(&mut A)) {
        let sorted = sort_and_dedup(attributes);
        let Ok(mut trackers) = self.trackers.lock() else {
            return;
        };

        let under_limit = trackers.len() < self.cardinality_limit;
        match trackers.entry(sorted) {
            Entry::Occupied(mut entry) => update(entry.get_mut()),
            Entry::Vacant(entry) => {
                if under_limit {
                    update(entry.insert(A::create(&self.config)));
                } else {
                    if !self.overflow_logged.swap(true, Ordering::Relaxed) {
                        otel_warn!(
                            name: "ValueMap.CardinalityOverflow",
                            cardinality_limit = self.cardinality_limit,
                            message = "max data points for a metric stream reached, measurement folded into the overflow set"
                        );
                    }
                    update(
                        trackers
                            .entry(stream_overflow_attributes())
                            .or_insert_with(|| A::create(&self.config)),
                    );
                }
            }
        }
    }

    /// Map every tracker into a data point, draining the storage (delta).
    pub(crate) fn collect_and_reset<Res>(
        &self,
        dest: &mut Vec<Res>,
        mut map: impl FnMut(Vec<KeyValue>, A) -> Res,
    ) {
        if let Ok(mut trackers) = self.trackers.lock() {
            dest.extend(trackers.drain().map(|(attrs, tracker)| map(attrs, tracker)));
        }
    }

    /// Map every tracker into a data point, retaining the storage
    /// (cumulative).
    pub(crate) fn collect_readonly<Res>(
        &self,
        dest: &mut Vec<Res>,
        mut map: impl FnMut(Vec<KeyValue>, &A) -> Res,
    ) {
        if let Ok(trackers) = self.trackers.lock() {
            dest.extend(trackers.iter().map(|(attrs, tracker)| map(attrs.clone(), tracker)));
        }
    }

    /// Drop all trackers (asynchronous replace semantics).
    pub(crate) fn clear(&self) {
        if let Ok(mut trackers) = self.trackers.lock() {
            trackers.clear();
        }
    }
}

/// Tracks the start timestamp of an aggregate's current window.
pub(crate) struct AggregateTimeInitiator(Mutex<SystemTime>);

pub(crate) struct AggregateTime {
    pub(crate) start: SystemTime,
    pub(crate) current: SystemTime,
}

impl Default for AggregateTimeInitiator {
    fn default() -> Self {
        AggregateTimeInitiator(Mutex::new(otel::time::now()))
    }
}

impl AggregateTimeInitiator {
    /// Window times for a delta collection: start is the previous
    /// collection's end, and the window resets.
    pub(crate) fn delta(&self) -> AggregateTime {
        let current = otel::time::now();
        let start = self
            .0
            .lock()
            .map(|mut start| std::mem::replace(&mut *start, current))
            .unwrap_or(current);
        AggregateTime { start, current }
    }

    /// Window times for a cumulative collection: start never moves.
    pub(crate) fn cumulative(&self) -> AggregateTime {
        let current = otel::time::now();
        let start = self.0.lock().map(|start| *start).unwrap_or(current);
        AggregateTime { start, current }
    }
}

/// The view-supplied attribute whitelist of an instrument stream.
///
/// Attributes not in the whitelist are dropped before aggregation and
/// contribute to exemplars' filtered attributes instead.
#[derive(Clone, Debug, Default)]
pub(crate) struct AttributeSetFilter {
    allowed: Option<Vec<Key>>,
}

impl AttributeSetFilter {
    pub(crate) fn new(allowed: Option<Vec<Key>>) -> Self {
        AttributeSetFilter { allowed }
    }

    /// Split attributes into (aggregated, filtered-out).
    pub(crate) fn apply(&self, attributes: &[KeyValue]) -> (Vec<KeyValue>, Vec<KeyValue>) {
        match &self.allowed {
            Some(allowed) => attributes
                .iter()
                .cloned()
                .partition(|kv| allowed.contains(&kv.key)),
            None => (attributes.to_vec(), Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Count(u64);

    impl Aggregator for Count {
        type InitConfig = ();

        fn create(_init: &()) -> Self {
            Count::default()
        }
    }

    #[test]
    fn attribute_order_does_not_matter() {
        let map: ValueMap<Count> = ValueMap::new((), DEFAULT_CARDINALITY_LIMIT);
        map.measure(&[KeyValue::new("a", 1), KeyValue::new("b", 2)], |c| c.0 += 1);
        map.measure(&[KeyValue::new("b", 2), KeyValue::new("a", 1)], |c| c.0 += 1);

        let mut points = Vec::new();
        map.collect_readonly(&mut points, |attrs, count| (attrs, count.0));
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].1, 2);
    }

    #[test]
    fn empty_attribute_set_is_a_first_class_key() {
        let map: ValueMap<Count> = ValueMap::new((), DEFAULT_CARDINALITY_LIMIT);
        map.measure(&[], |c| c.0 += 1);
        map.measure(&[], |c| c.0 += 1);

        let mut points = Vec::new();
        map.collect_readonly(&mut points, |attrs, count| (attrs, count.0));
        assert_eq!(points, vec![(vec![], 2)]);
    }

    #[test]
    fn overflow_folds_into_sentinel_set() {
        let map: ValueMap<Count> = ValueMap::new((), 3);
        for i in 0..10i64 {
            map.measure(&[KeyValue::new("id", i)], |c| c.0 += 1);
        }

        let mut points = Vec::new();
        map.collect_readonly(&mut points, |attrs, count| (attrs, count.0));
        // 3 distinct sets plus the overflow sentinel
        assert_eq!(points.len(), 4);
        let overflow = points
            .iter()
            .find(|(attrs, _)| *attrs == stream_overflow_attributes())
            .expect("overflow set present");
        assert_eq!(overflow.1, 7);
    }

    #[test]
    fn collect_and_reset_drains() {
        let map: ValueMap<Count> = ValueMap::new((), DEFAULT_CARDINALITY_LIMIT);
        map.measure(&[], |c| c.0 += 1);
        let mut points = Vec::new();
        map.collect_and_reset(&mut points, |attrs, count| (attrs, count.0));
        assert_eq!(points.len(), 1);

        points.clear();
        map.collect_and_reset(&mut points, |attrs, count| (attrs, count.0));
        assert!(points.is_empty());
    }
}
