use crate::metrics::internal::Measure;
use otel::KeyValue;
use std::borrow::Cow;
use std::fmt;
use std::sync::{Arc, Mutex};

/// The kinds of instruments a meter can create.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum InstrumentKind {
    /// A monotonically increasing sum, recorded synchronously.
    Counter,
    /// A freely moving sum, recorded synchronously.
    UpDownCounter,
    /// A distribution of recorded values.
    Histogram,
    /// A last-value measurement, recorded synchronously.
    Gauge,
    /// A monotonically increasing sum, observed at collection time.
    ObservableCounter,
    /// A freely moving sum, observed at collection time.
    ObservableUpDownCounter,
    /// A last-value measurement, observed at collection time.
    ObservableGauge,
}

impl InstrumentKind {
    pub(crate) fn is_monotonic(&self) -> bool {
        matches!(
            self,
            InstrumentKind::Counter | InstrumentKind::ObservableCounter
        )
    }

    pub(crate) fn is_observable(&self) -> bool {
        matches!(
            self,
            InstrumentKind::ObservableCounter
                | InstrumentKind::ObservableUpDownCounter
                | InstrumentKind::ObservableGauge
        )
    }
}

/// The identity of an instrument as declared by instrumentation code.
#[derive(Clone, Debug)]
pub(crate) struct InstrumentDescriptor {
    pub(crate) name: Cow<'static, str>,
    pub(crate) description: Cow<'static, str>,
    pub(crate) unit: Cow<'static, str>,
    pub(crate) kind: InstrumentKind,
}

pub(crate) const INSTRUMENT_NAME_MAX_LENGTH: usize = 255;

/// Instrument names start with a letter and continue with alphanumerics,
/// `_`, `.`, `-` or `/`, up to 255 characters.
pub(crate) fn validate_instrument_name(name: &str) -> bool {
    if name.is_empty() || name.len() > INSTRUMENT_NAME_MAX_LENGTH {
        return false;
    }
    let mut chars = name.chars();
    let first = chars.next().expect("non-empty");
    if !first.is_ascii_alphabetic() {
        return false;
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '/'))
}

/// How measurements of a stream are folded into points.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum Aggregation {
    /// Drop the stream entirely.
    Drop,
    /// Arithmetic sum per attribute set.
    Sum,
    /// Last recorded value per attribute set.
    LastValue,
    /// Bucketed distribution with the given upper bounds.
    ExplicitBucketHistogram {
        /// The bucket upper bounds; the `+Inf` bucket is implicit.
        boundaries: Vec<f64>,
    },
}

pub(crate) struct InstrumentCore<T> {
    measures: Vec<Arc<dyn Measure<T>>>,
}

impl<T: Copy> InstrumentCore<T> {
    pub(crate) fn new(measures: Vec<Arc<dyn Measure<T>>>) -> Self {
        InstrumentCore { measures }
    }

    fn record(&self, value: T, attributes: &[KeyValue]) {
        for measure in &self.measures {
            measure.call(value, attributes);
        }
    }
}

impl<T> fmt::Debug for InstrumentCore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentCore")
            .field("measures", &self.measures.len())
            .finish()
    }
}

/// A monotonically increasing sum instrument.
///
/// An instrument whose name failed validation records nothing; the
/// failure is logged at creation and instrumentation code is unaffected.
#[derive(Clone, Debug)]
pub struct Counter<T>(Arc<InstrumentCore<T>>);

impl<T: Copy> Counter<T> {
    pub(crate) fn new(measures: Vec<Arc<dyn Measure<T>>>) -> Self {
        Counter(Arc::new(InstrumentCore::new(measures)))
    }

    /// Record an increment. Negative values are rejected with a debug log.
    pub fn add(&self, value: T, attributes: &[KeyValue]) {
        self.0.record(value, attributes);
    }
}

/// A sum instrument that can both increase and decrease.
#[derive(Clone, Debug)]
pub struct UpDownCounter<T>(Arc<InstrumentCore<T>>);

impl<T: Copy> UpDownCounter<T> {
    pub(crate) fn new(measures: Vec<Arc<dyn Measure<T>>>) -> Self {
        UpDownCounter(Arc::new(InstrumentCore::new(measures)))
    }

    /// Record a delta, positive or negative.
    pub fn add(&self, value: T, attributes: &[KeyValue]) {
        self.0.record(value, attributes);
    }
}

/// A distribution instrument.
#[derive(Clone, Debug)]
pub struct Histogram<T>(Arc<InstrumentCore<T>>);

impl<T: Copy> Histogram<T> {
    pub(crate) fn new(measures: Vec<Arc<dyn Measure<T>>>) -> Self {
        Histogram(Arc::new(InstrumentCore::new(measures)))
    }

    /// Record a value into the distribution.
    pub fn record(&self, value: T, attributes: &[KeyValue]) {
        self.0.record(value, attributes);
    }
}

/// A last-value instrument.
#[derive(Clone, Debug)]
pub struct Gauge<T>(Arc<InstrumentCore<T>>);

impl<T: Copy> Gauge<T> {
    pub(crate) fn new(measures: Vec<Arc<dyn Measure<T>>>) -> Self {
        Gauge(Arc::new(InstrumentCore::new(measures)))
    }

    /// Record the current value.
    pub fn record(&self, value: T, attributes: &[KeyValue]) {
        self.0.record(value, attributes);
    }
}

/// The handle callbacks use to report observations.
///
/// Each `observe` writes into a buffer private to the running callback;
/// the buffer replaces the instrument's stored values once the callback
/// returns without panicking.
#[derive(Debug)]
pub struct Observer<T> {
    buffer: Mutex<Vec<(T, Vec<KeyValue>)>>,
}

impl<T: Copy> Observer<T> {
    pub(crate) fn new() -> Self {
        Observer {
            buffer: Mutex::new(Vec::new()),
        }
    }

    /// Report the current value under the given attributes.
    pub fn observe(&self, value: T, attributes: &[KeyValue]) {
        if let Ok(mut buffer) = self.buffer.lock() {
            buffer.push((value, attributes.to_vec()));
        }
    }

    pub(crate) fn take(&self) -> Vec<(T, Vec<KeyValue>)> {
        self.buffer
            .lock()
            .map(|mut buffer| std::mem::take(&mut *buffer))
            .unwrap_or_default()
    }
}

/// A monotonically increasing sum, polled at collection time.
///
/// The handle is inert; values are produced by the callbacks registered
/// at build time.
#[derive(Clone, Debug, Default)]
pub struct ObservableCounter<T> {
    _marker: std::marker::PhantomData<T>,
}

/// A freely moving sum, polled at collection time.
#[derive(Clone, Debug, Default)]
pub struct ObservableUpDownCounter<T> {
    _marker: std::marker::PhantomData<T>,
}

/// A last-value measurement, polled at collection time.
#[derive(Clone, Debug, Default)]
pub struct ObservableGauge<T> {
    _marker: std::marker::PhantomData<T>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_validation() {
        assert!(validate_instrument_name("requests"));
        assert!(validate_instrument_name("http.server.duration"));
        assert!(validate_instrument_name("a1_b-c/d"));
        assert!(!validate_instrument_name(""));
        assert!(!validate_instrument_name("1starts_with_digit"));
        assert!(!validate_instrument_name("_starts_with_underscore"));
        assert!(!validate_instrument_name("has space"));
        assert!(!validate_instrument_name(&"x".repeat(256)));
        assert!(validate_instrument_name(&"x".repeat(255)));
    }

    #[test]
    fn kind_properties() {
        assert!(InstrumentKind::Counter.is_monotonic());
        assert!(InstrumentKind::ObservableCounter.is_monotonic());
        assert!(!InstrumentKind::UpDownCounter.is_monotonic());
        assert!(InstrumentKind::ObservableGauge.is_observable());
        assert!(!InstrumentKind::Gauge.is_observable());
    }
}
