use crate::metrics::instrument::{
    validate_instrument_name, Counter, Gauge, Histogram, InstrumentDescriptor, InstrumentKind,
    ObservableCounter, ObservableGauge, ObservableUpDownCounter, Observer, UpDownCounter,
};
use crate::metrics::internal::Number;
use crate::metrics::pipeline::{self, Callback, Pipeline};
use otel::{otel_warn, InstrumentationScope};
use std::borrow::Cow;
use std::marker::PhantomData;
use std::sync::Arc;

/// Creates instruments for a single instrumentation scope.
///
/// Meters are cheap handles; the aggregate state they create lives in the
/// provider's per-reader pipelines.
#[derive(Clone, Debug)]
pub struct SdkMeter {
    scope: InstrumentationScope,
    pipelines: Arc<Vec<Arc<Pipeline>>>,
}

impl SdkMeter {
    pub(crate) fn new(scope: InstrumentationScope, pipelines: Arc<Vec<Arc<Pipeline>>>) -> Self {
        SdkMeter { scope, pipelines }
    }

    /// An `i64` counter builder.
    pub fn i64_counter(&self, name: impl Into<Cow<'static, str>>) -> InstrumentBuilder<'_, i64, Counter<i64>> {
        InstrumentBuilder::new(self, name.into())
    }

    /// An `f64` counter builder.
    pub fn f64_counter(&self, name: impl Into<Cow<'static, str>>) -> InstrumentBuilder<'_, f64, Counter<f64>> {
        InstrumentBuilder::new(self, name.into())
    }

    /// An `i64` up-down counter builder.
    pub fn i64_up_down_counter(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> InstrumentBuilder<'_, i64, UpDownCounter<i64>> {
        InstrumentBuilder::new(self, name.into())
    }

    /// An `f64` up-down counter builder.
    pub fn f64_up_down_counter(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> InstrumentBuilder<'_, f64, UpDownCounter<f64>> {
        InstrumentBuilder::new(self, name.into())
    }

    /// An `i64` histogram builder.
    pub fn i64_histogram(&self, name: impl Into<Cow<'static, str>>) -> HistogramBuilder<'_, i64> {
        HistogramBuilder::new(self, name.into())
    }

    /// An `f64` histogram builder.
    pub fn f64_histogram(&self, name: impl Into<Cow<'static, str>>) -> HistogramBuilder<'_, f64> {
        HistogramBuilder::new(self, name.into())
    }

    /// An `i64` gauge builder.
    pub fn i64_gauge(&self, name: impl Into<Cow<'static, str>>) -> InstrumentBuilder<'_, i64, Gauge<i64>> {
        InstrumentBuilder::new(self, name.into())
    }

    /// An `f64` gauge builder.
    pub fn f64_gauge(&self, name: impl Into<Cow<'static, str>>) -> InstrumentBuilder<'_, f64, Gauge<f64>> {
        InstrumentBuilder::new(self, name.into())
    }

    /// An `i64` observable counter builder.
    pub fn i64_observable_counter(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> ObservableInstrumentBuilder<'_, i64, ObservableCounter<i64>> {
        ObservableInstrumentBuilder::new(self, name.into(), InstrumentKind::ObservableCounter)
    }

    /// An `f64` observable counter builder.
    pub fn f64_observable_counter(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> ObservableInstrumentBuilder<'_, f64, ObservableCounter<f64>> {
        ObservableInstrumentBuilder::new(self, name.into(), InstrumentKind::ObservableCounter)
    }

    /// An `i64` observable up-down counter builder.
    pub fn i64_observable_up_down_counter(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> ObservableInstrumentBuilder<'_, i64, ObservableUpDownCounter<i64>> {
        ObservableInstrumentBuilder::new(self, name.into(), InstrumentKind::ObservableUpDownCounter)
    }

    /// An `f64` observable up-down counter builder.
    pub fn f64_observable_up_down_counter(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> ObservableInstrumentBuilder<'_, f64, ObservableUpDownCounter<f64>> {
        ObservableInstrumentBuilder::new(self, name.into(), InstrumentKind::ObservableUpDownCounter)
    }

    /// An `i64` observable gauge builder.
    pub fn i64_observable_gauge(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> ObservableInstrumentBuilder<'_, i64, ObservableGauge<i64>> {
        ObservableInstrumentBuilder::new(self, name.into(), InstrumentKind::ObservableGauge)
    }

    /// An `f64` observable gauge builder.
    pub fn f64_observable_gauge(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> ObservableInstrumentBuilder<'_, f64, ObservableGauge<f64>> {
        ObservableInstrumentBuilder::new(self, name.into(), InstrumentKind::ObservableGauge)
    }

    fn resolve<T: Number>(
        &self,
        descriptor: &InstrumentDescriptor,
        boundaries: Option<&[f64]>,
    ) -> Vec<Arc<dyn crate::metrics::internal::Measure<T>>> {
        if !validate_instrument_name(&descriptor.name) {
            otel_warn!(
                name: "Meter.InvalidInstrumentName",
                instrument_name = descriptor.name.as_ref(),
                message = "instrument names start with a letter and contain only alphanumerics, '_', '.', '-' and '/', up to 255 characters; the instrument records nothing"
            );
            return Vec::new();
        }
        pipeline::resolve_measures(&self.pipelines, &self.scope, descriptor, boundaries)
    }

    fn register_observable<T: Number>(
        &self,
        descriptor: &InstrumentDescriptor,
        callbacks: Vec<Callback<T>>,
    ) {
        if !validate_instrument_name(&descriptor.name) {
            otel_warn!(
                name: "Meter.InvalidInstrumentName",
                instrument_name = descriptor.name.as_ref(),
                message = "instrument names start with a letter and contain only alphanumerics, '_', '.', '-' and '/', up to 255 characters; the instrument records nothing"
            );
            return;
        }
        pipeline::register_async_instrument(&self.pipelines, &self.scope, descriptor, callbacks);
    }
}

/// Configures a synchronous instrument before it is built.
#[derive(Debug)]
pub struct InstrumentBuilder<'a, T, I> {
    meter: &'a SdkMeter,
    name: Cow<'static, str>,
    description: Cow<'static, str>,
    unit: Cow<'static, str>,
    _marker: PhantomData<(T, I)>,
}

impl<'a, T, I> InstrumentBuilder<'a, T, I> {
    fn new(meter: &'a SdkMeter, name: Cow<'static, str>) -> Self {
        InstrumentBuilder {
            meter,
            name,
            description: Cow::Borrowed(""),
            unit: Cow::Borrowed(""),
            _marker: PhantomData,
        }
    }

    /// Describe the instrument for documentation.
    pub fn with_description(mut self, description: impl Into<Cow<'static, str>>) -> Self {
        self.description = description.into();
        self
    }

    /// The unit of the recorded values, following UCUM.
    pub fn with_unit(mut self, unit: impl Into<Cow<'static, str>>) -> Self {
        self.unit = unit.into();
        self
    }

    fn descriptor(&self, kind: InstrumentKind) -> InstrumentDescriptor {
        InstrumentDescriptor {
            name: self.name.clone(),
            description: self.description.clone(),
            unit: self.unit.clone(),
            kind,
        }
    }
}

macro_rules! sync_build {
    ($t:ty, $instrument:ident, $kind:expr) => {
        impl InstrumentBuilder<'_, $t, $instrument<$t>> {
            /// Create the instrument, registering its streams with every
            /// reader pipeline.
            pub fn build(self) -> $instrument<$t> {
                let descriptor = self.descriptor($kind);
                $instrument::new(self.meter.resolve::<$t>(&descriptor, None))
            }
        }
    };
}

sync_build!(i64, Counter, InstrumentKind::Counter);
sync_build!(f64, Counter, InstrumentKind::Counter);
sync_build!(i64, UpDownCounter, InstrumentKind::UpDownCounter);
sync_build!(f64, UpDownCounter, InstrumentKind::UpDownCounter);
sync_build!(i64, Gauge, InstrumentKind::Gauge);
sync_build!(f64, Gauge, InstrumentKind::Gauge);

/// Configures a histogram before it is built.
#[derive(Debug)]
pub struct HistogramBuilder<'a, T> {
    meter: &'a SdkMeter,
    name: Cow<'static, str>,
    description: Cow<'static, str>,
    unit: Cow<'static, str>,
    boundaries: Option<Vec<f64>>,
    _marker: PhantomData<T>,
}

impl<'a, T> HistogramBuilder<'a, T> {
    fn new(meter: &'a SdkMeter, name: Cow<'static, str>) -> Self {
        HistogramBuilder {
            meter,
            name,
            description: Cow::Borrowed(""),
            unit: Cow::Borrowed(""),
            boundaries: None,
            _marker: PhantomData,
        }
    }

    /// Describe the instrument for documentation.
    pub fn with_description(mut self, description: impl Into<Cow<'static, str>>) -> Self {
        self.description = description.into();
        self
    }

    /// The unit of the recorded values, following UCUM.
    pub fn with_unit(mut self, unit: impl Into<Cow<'static, str>>) -> Self {
        self.unit = unit.into();
        self
    }

    /// Replace the default bucket boundaries.
    pub fn with_boundaries(mut self, boundaries: Vec<f64>) -> Self {
        self.boundaries = Some(boundaries);
        self
    }
}

macro_rules! histogram_build {
    ($t:ty) => {
        impl HistogramBuilder<'_, $t> {
            /// Create the instrument, registering its streams with every
            /// reader pipeline.
            pub fn build(self) -> Histogram<$t> {
                let descriptor = InstrumentDescriptor {
                    name: self.name.clone(),
                    description: self.description.clone(),
                    unit: self.unit.clone(),
                    kind: InstrumentKind::Histogram,
                };
                Histogram::new(
                    self.meter
                        .resolve::<$t>(&descriptor, self.boundaries.as_deref()),
                )
            }
        }
    };
}

histogram_build!(i64);
histogram_build!(f64);

/// Configures an observable instrument before it is built.
pub struct ObservableInstrumentBuilder<'a, T, I> {
    meter: &'a SdkMeter,
    name: Cow<'static, str>,
    description: Cow<'static, str>,
    unit: Cow<'static, str>,
    kind: InstrumentKind,
    callbacks: Vec<Callback<T>>,
    _marker: PhantomData<I>,
}

impl<'a, T, I> std::fmt::Debug for ObservableInstrumentBuilder<'a, T, I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservableInstrumentBuilder")
            .field("name", &self.name)
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

impl<'a, T, I> ObservableInstrumentBuilder<'a, T, I> {
    fn new(meter: &'a SdkMeter, name: Cow<'static, str>, kind: InstrumentKind) -> Self {
        ObservableInstrumentBuilder {
            meter,
            name,
            description: Cow::Borrowed(""),
            unit: Cow::Borrowed(""),
            kind,
            callbacks: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Describe the instrument for documentation.
    pub fn with_description(mut self, description: impl Into<Cow<'static, str>>) -> Self {
        self.description = description.into();
        self
    }

    /// The unit of the observed values, following UCUM.
    pub fn with_unit(mut self, unit: impl Into<Cow<'static, str>>) -> Self {
        self.unit = unit.into();
        self
    }

    /// Register a callback to run at every collection.
    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Observer<T>) + Send + Sync + 'static,
    {
        self.callbacks.push(Box::new(callback));
        self
    }

    fn descriptor(&self) -> InstrumentDescriptor {
        InstrumentDescriptor {
            name: self.name.clone(),
            description: self.description.clone(),
            unit: self.unit.clone(),
            kind: self.kind,
        }
    }
}

macro_rules! observable_build {
    ($t:ty, $instrument:ident) => {
        impl ObservableInstrumentBuilder<'_, $t, $instrument<$t>> {
            /// Create the instrument, registering its callbacks with every
            /// reader pipeline.
            pub fn build(self) -> $instrument<$t> {
                let descriptor = self.descriptor();
                self.meter.register_observable::<$t>(&descriptor, self.callbacks);
                $instrument::default()
            }
        }
    };
}

observable_build!(i64, ObservableCounter);
observable_build!(f64, ObservableCounter);
observable_build!(i64, ObservableUpDownCounter);
observable_build!(f64, ObservableUpDownCounter);
observable_build!(i64, ObservableGauge);
observable_build!(f64, ObservableGauge);
