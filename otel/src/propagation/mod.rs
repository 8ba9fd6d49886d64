//! The seam between the in-process context and wire carriers.
//!
//! [`Injector`] and [`Extractor`] abstract over carrier types (typically
//! HTTP header maps); [`TextMapPropagator`] implementations read and write
//! specific header formats. The concrete W3C propagators live in `otel-sdk`.

use std::collections::HashMap;

mod composite;
mod text_map_propagator;

pub use composite::TextMapCompositePropagator;
pub use text_map_propagator::{FieldIter, TextMapPropagator};

/// Injector provides an interface for adding fields into an outgoing carrier.
pub trait Injector {
    /// Add a key and value to the carrier.
    fn set(&mut self, key: &str, value: String);
}

/// Extractor provides an interface for reading fields from an incoming carrier.
pub trait Extractor {
    /// Get a value for a key from the carrier.
    fn get(&self, key: &str) -> Option<&str>;

    /// Collect all the keys from the carrier.
    fn keys(&self) -> Vec<&str>;
}

impl<S: std::hash::BuildHasher> Injector for HashMap<String, String, S> {
    /// Set a key and value in the HashMap.
    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_lowercase(), value);
    }
}

impl<S: std::hash::BuildHasher> Extractor for HashMap<String, String, S> {
    /// Get a value for a key from the HashMap.
    fn get(&self, key: &str) -> Option<&str> {
        self.get(&key.to_lowercase()).map(|v| v.as_str())
    }

    /// Collect all the keys from the HashMap.
    fn keys(&self) -> Vec<&str> {
        self.keys().map(|k| k.as_str()).collect::<Vec<_>>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_map_carrier_is_case_insensitive() {
        let mut carrier = HashMap::new();
        Injector::set(&mut carrier, "TraceParent", "value".to_string());
        assert_eq!(Extractor::get(&carrier, "traceparent"), Some("value"));
        assert_eq!(Extractor::get(&carrier, "TRACEPARENT"), Some("value"));
    }
}
