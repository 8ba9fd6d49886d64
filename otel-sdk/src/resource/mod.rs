//! Representations of the entity producing telemetry.
//!
//! A [`Resource`] is an immutable set of attributes identifying the entity
//! (service, process, host) that all telemetry from this process describes.
//! It is assembled once at startup by merging detector output with
//! user-supplied attributes and then shared, frozen, by every provider.
//!
//! # Resource detectors
//!
//! [`ResourceDetector`]s discover attributes from the runtime or the
//! environment:
//!
//! - [`SdkProvidedResourceDetector`] - service identity from
//!   `OTEL_SERVICE_NAME` / `OTEL_SERVICE_VERSION`.
//! - [`EnvResourceDetector`] - attributes from `OTEL_RESOURCE_ATTRIBUTES`.
//! - [`OsResourceDetector`] - operating system identity.
//! - [`ProcessResourceDetector`] - process identity.
//! - [`TelemetryResourceDetector`] - this SDK's own identity.

mod builder;
mod env;
mod os;
mod process;
mod telemetry;

pub use builder::ResourceBuilder;
pub use env::{EnvResourceDetector, SdkProvidedResourceDetector};
pub use os::OsResourceDetector;
pub use process::ProcessResourceDetector;
pub use telemetry::TelemetryResourceDetector;

use otel::{Key, KeyValue, Value};
use std::borrow::Cow;
use std::collections::{hash_map, HashMap};
use std::sync::Arc;

/// The `service.name` resource attribute, the group key for telemetry on
/// the wire.
pub const SERVICE_NAME: Key = Key::from_static_str("service.name");
/// The `service.version` resource attribute.
pub const SERVICE_VERSION: Key = Key::from_static_str("service.version");
/// The `tenant.id` resource attribute, the optional tenant marker.
pub const TENANT_ID: Key = Key::from_static_str("tenant.id");

/// An immutable representation of the entity producing telemetry as attributes.
#[derive(Clone, Debug, PartialEq)]
pub struct Resource {
    inner: Arc<ResourceInner>,
}

#[derive(Debug, PartialEq)]
struct ResourceInner {
    attrs: HashMap<Key, Value>,
    schema_url: Option<Cow<'static, str>>,
}

impl Resource {
    /// A builder seeded with the default platform detectors and the
    /// environment-derived service identity.
    pub fn builder() -> ResourceBuilder {
        ResourceBuilder::default()
    }

    /// A builder with no detectors and no attributes, mostly for tests.
    pub fn builder_empty() -> ResourceBuilder {
        ResourceBuilder::empty()
    }

    /// Creates an empty resource.
    pub fn empty() -> Self {
        Resource {
            inner: Arc::new(ResourceInner {
                attrs: HashMap::new(),
                schema_url: None,
            }),
        }
    }

    pub(crate) fn new<T: IntoIterator<Item = KeyValue>>(
        kvs: T,
        schema_url: Option<Cow<'static, str>>,
    ) -> Self {
        let mut attrs = HashMap::new();
        for kv in kvs {
            attrs.insert(kv.key, kv.value);
        }
        Resource {
            inner: Arc::new(ResourceInner { attrs, schema_url }),
        }
    }

    /// Create a new `Resource` by combining two resources.
    ///
    /// Keys from `other` win on conflict. The schema url of `self` is kept
    /// unless absent, in which case `other`'s is used. Both inputs are left
    /// untouched; merging always produces a new resource.
    pub fn merge(&self, other: &Resource) -> Self {
        if self.is_empty() {
            return other.clone();
        }
        if other.is_empty() {
            return self.clone();
        }

        let mut attrs = self.inner.attrs.clone();
        for (k, v) in other.inner.attrs.iter() {
            attrs.insert(k.clone(), v.clone());
        }

        let schema_url = self
            .inner
            .schema_url
            .clone()
            .or_else(|| other.inner.schema_url.clone());

        Resource {
            inner: Arc::new(ResourceInner { attrs, schema_url }),
        }
    }

    /// Returns the number of attributes for this resource.
    pub fn len(&self) -> usize {
        self.inner.attrs.len()
    }

    /// Returns `true` if the resource contains no attributes.
    pub fn is_empty(&self) -> bool {
        self.inner.attrs.is_empty()
    }

    /// Returns the schema url of this resource, if known.
    pub fn schema_url(&self) -> Option<&str> {
        self.inner.schema_url.as_deref()
    }

    /// Returns the value for a given attribute key, if present.
    pub fn get(&self, key: &Key) -> Option<Value> {
        self.inner.attrs.get(key).cloned()
    }

    /// An iterator over this resource's attributes.
    pub fn iter(&self) -> Iter<'_> {
        self.into_iter()
    }
}

/// An iterator over resource attributes, in no particular order.
#[derive(Debug)]
pub struct Iter<'a>(hash_map::Iter<'a, Key, Value>);

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a Key, &'a Value);

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next()
    }
}

impl<'a> IntoIterator for &'a Resource {
    type Item = (&'a Key, &'a Value);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        Iter(self.inner.attrs.iter())
    }
}

/// An interface for discovering resource attributes from the runtime or
/// environment.
///
/// Detectors must not fail; if nothing can be detected they return an empty
/// resource.
pub trait ResourceDetector {
    /// Detect resource attributes.
    fn detect(&self) -> Resource;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_other_wins_on_conflict() {
        let base = Resource::new(
            vec![KeyValue::new("a", "base"), KeyValue::new("b", "base")],
            None,
        );
        let overlay = Resource::new(vec![KeyValue::new("b", "overlay")], None);

        let merged = base.merge(&overlay);
        assert_eq!(merged.get(&Key::new("a")), Some(Value::from("base")));
        assert_eq!(merged.get(&Key::new("b")), Some(Value::from("overlay")));
        // inputs are frozen
        assert_eq!(base.get(&Key::new("b")), Some(Value::from("base")));
    }

    #[test]
    fn merge_keeps_first_schema_url() {
        let a = Resource::new(vec![KeyValue::new("k", "v")], Some("https://a".into()));
        let b = Resource::new(vec![KeyValue::new("k2", "v")], Some("https://b".into()));
        assert_eq!(a.merge(&b).schema_url(), Some("https://a"));
        assert_eq!(Resource::new(vec![KeyValue::new("x", "y")], None).merge(&b).schema_url(), Some("https://b"));
    }

    #[test]
    fn empty_resources_compare_equal() {
        assert_eq!(Resource::empty(), Resource::builder_empty().build());
    }
}
