//! Process-wide propagator registry.
//!
//! Instrumentation libraries inject and extract context without holding a
//! propagator instance by going through [`get_text_map_propagator`]. The
//! registry starts with a no-op propagator; the bootstrap (or the
//! application) installs a real one via [`set_text_map_propagator`].
//!
//! The provider registry (tracer/meter/logger providers and their
//! shutdown lifecycle) lives in `otel-sdk::global`, next to the concrete
//! provider types it stores.

use crate::propagation::{Extractor, FieldIter, Injector, TextMapPropagator};
use crate::Context;
use std::sync::{OnceLock, RwLock};

/// The current global `TextMapPropagator`.
fn global_propagator() -> &'static RwLock<Box<dyn TextMapPropagator + Send + Sync>> {
    static GLOBAL_TEXT_MAP_PROPAGATOR: OnceLock<
        RwLock<Box<dyn TextMapPropagator + Send + Sync>>,
    > = OnceLock::new();
    GLOBAL_TEXT_MAP_PROPAGATOR
        .get_or_init(|| RwLock::new(Box::new(NoopTextMapPropagator::new())))
}

/// Sets the given [`TextMapPropagator`] as the current global propagator.
pub fn set_text_map_propagator<P: TextMapPropagator + Send + Sync + 'static>(propagator: P) {
    let mut global_propagator = global_propagator()
        .write()
        .expect("GLOBAL_TEXT_MAP_PROPAGATOR RwLock poisoned");
    *global_propagator = Box::new(propagator);
}

/// Executes a closure with a reference to the current global propagator.
///
/// # Examples
///
/// ```
/// use otel::{global, Context};
/// use std::collections::HashMap;
///
/// let mut carrier = HashMap::new();
/// global::get_text_map_propagator(|propagator| {
///     propagator.inject_context(&Context::current(), &mut carrier)
/// });
/// ```
pub fn get_text_map_propagator<T, F>(mut f: F) -> T
where
    F: FnMut(&dyn TextMapPropagator) -> T,
{
    let global_propagator = global_propagator()
        .read()
        .expect("GLOBAL_TEXT_MAP_PROPAGATOR RwLock poisoned");
    f(&**global_propagator)
}

/// A placeholder propagator that reads and writes nothing.
#[derive(Debug, Default)]
struct NoopTextMapPropagator {
    _private: (),
}

impl NoopTextMapPropagator {
    fn new() -> Self {
        NoopTextMapPropagator { _private: () }
    }
}

impl TextMapPropagator for NoopTextMapPropagator {
    fn inject_context(&self, _cx: &Context, _injector: &mut dyn Injector) {
        // no-op
    }

    fn extract_with_context(&self, cx: &Context, _extractor: &dyn Extractor) -> Context {
        cx.clone()
    }

    fn fields(&self) -> FieldIter<'_> {
        FieldIter::new(&[])
    }
}
