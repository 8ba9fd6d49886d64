use crate::propagation::{Extractor, Injector};
use crate::Context;
use std::fmt::Debug;
use std::slice;

/// Injects and extracts context data in text-based carriers.
///
/// Implementations must not mutate the given context; extraction returns a
/// derived context, and errors on either path are absorbed (a failed
/// extraction yields the input context unchanged).
pub trait TextMapPropagator: Debug {
    /// Properly encodes the values of the current [`Context`] and injects
    /// them into the given [`Injector`].
    fn inject(&self, injector: &mut dyn Injector) {
        Context::map_current(|cx| self.inject_context(cx, injector))
    }

    /// Properly encodes the values of the given [`Context`] and injects them
    /// into the [`Injector`].
    fn inject_context(&self, cx: &Context, injector: &mut dyn Injector);

    /// Retrieves encoded data using the provided [`Extractor`]. If no data
    /// for this format was retrieved OR if the retrieved data is invalid,
    /// then the current [`Context`] is returned.
    fn extract(&self, extractor: &dyn Extractor) -> Context {
        Context::map_current(|cx| self.extract_with_context(cx, extractor))
    }

    /// Retrieves encoded data using the provided [`Extractor`], returning a
    /// context derived from the given one.
    fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context;

    /// Returns iter of fields used by [`TextMapPropagator`].
    fn fields(&self) -> FieldIter<'_>;
}

/// An iterator over the fields a propagator reads and writes.
#[derive(Debug)]
pub struct FieldIter<'a>(slice::Iter<'a, String>);

impl<'a> FieldIter<'a> {
    /// Create a new `FieldIter` from a slice of field names.
    pub fn new(fields: &'a [String]) -> Self {
        FieldIter(fields.iter())
    }
}

impl<'a> Iterator for FieldIter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|field| field.as_str())
    }
}
