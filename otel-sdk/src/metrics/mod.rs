//! The metric pipeline.
//!
//! Instruments created by an [`SdkMeter`] record measurements into
//! per-reader aggregation storage; [`MetricReader`]s materialize that
//! storage into point sets at collection time and hand them to exporters.
//! Synchronous record paths only touch in-memory state under a
//! per-instrument-stream lock; asynchronous instruments are polled via
//! callbacks during collection.

pub mod data;
pub use data::Temporality;

mod exporter;
mod in_memory_exporter;
mod instrument;
mod internal;
mod manual_reader;
mod meter;
mod meter_provider;
mod periodic_reader;
mod pipeline;
mod reader;
mod view;

pub use exporter::PushMetricExporter;
pub use in_memory_exporter::InMemoryMetricExporter;
pub use instrument::{
    Aggregation, Counter, Gauge, Histogram, InstrumentKind, ObservableCounter, ObservableGauge,
    ObservableUpDownCounter, Observer, UpDownCounter,
};
pub use manual_reader::{ManualReader, ManualReaderBuilder};
pub use meter::{HistogramBuilder, InstrumentBuilder, ObservableInstrumentBuilder, SdkMeter};
pub use meter_provider::{MeterProviderBuilder, SdkMeterProvider};
pub use periodic_reader::{PeriodicReader, PeriodicReaderBuilder};
pub use pipeline::Pipeline;
pub use reader::MetricReader;
pub use view::View;
