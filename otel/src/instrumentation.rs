use crate::KeyValue;
use std::borrow::Cow;
use std::hash::{Hash, Hasher};

/// Information about the library producing telemetry.
///
/// Scope identity is `(name, version, schema_url)`; attributes do not
/// participate in equality or hashing, matching how scopes are grouped on
/// the wire.
#[derive(Clone, Debug, Default)]
pub struct InstrumentationScope {
    name: Cow<'static, str>,
    version: Option<Cow<'static, str>>,
    schema_url: Option<Cow<'static, str>>,
    attributes: Vec<KeyValue>,
}

impl PartialEq for InstrumentationScope {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.version == other.version
            && self.schema_url == other.schema_url
    }
}

impl Eq for InstrumentationScope {}

impl Hash for InstrumentationScope {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.version.hash(state);
        self.schema_url.hash(state);
    }
}

impl InstrumentationScope {
    /// Create a new builder for the scope with the given name.
    pub fn builder<T: Into<Cow<'static, str>>>(name: T) -> InstrumentationScopeBuilder {
        InstrumentationScopeBuilder {
            name: name.into(),
            version: None,
            schema_url: None,
            attributes: None,
        }
    }

    /// The name of the instrumented library.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The version of the instrumented library, if known.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// The schema URL describing the emitted telemetry, if known.
    pub fn schema_url(&self) -> Option<&str> {
        self.schema_url.as_deref()
    }

    /// The attributes describing the scope.
    pub fn attributes(&self) -> impl Iterator<Item = &KeyValue> {
        self.attributes.iter()
    }
}

/// Configuration options for [`InstrumentationScope`].
#[derive(Debug)]
pub struct InstrumentationScopeBuilder {
    name: Cow<'static, str>,
    version: Option<Cow<'static, str>>,
    schema_url: Option<Cow<'static, str>>,
    attributes: Option<Vec<KeyValue>>,
}

impl InstrumentationScopeBuilder {
    /// Configure the version for the scope.
    pub fn with_version(mut self, version: impl Into<Cow<'static, str>>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Configure the schema URL for the scope.
    pub fn with_schema_url(mut self, schema_url: impl Into<Cow<'static, str>>) -> Self {
        self.schema_url = Some(schema_url.into());
        self
    }

    /// Configure attributes for the scope.
    pub fn with_attributes<I>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = KeyValue>,
    {
        self.attributes = Some(attributes.into_iter().collect());
        self
    }

    /// Create the [`InstrumentationScope`] from this configuration.
    pub fn build(self) -> InstrumentationScope {
        InstrumentationScope {
            name: self.name,
            version: self.version,
            schema_url: self.schema_url,
            attributes: self.attributes.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_ignores_attributes() {
        let a = InstrumentationScope::builder("lib")
            .with_version("1.0")
            .with_attributes([KeyValue::new("k", "v")])
            .build();
        let b = InstrumentationScope::builder("lib").with_version("1.0").build();
        assert_eq!(a, b);
    }

    #[test]
    fn builder_sets_fields() {
        let scope = InstrumentationScope::builder("lib")
            .with_version("2.1")
            .with_schema_url("https://example.com/schema")
            .build();
        assert_eq!(scope.name(), "lib");
        assert_eq!(scope.version(), Some("2.1"));
        assert_eq!(scope.schema_url(), Some("https://example.com/schema"));
    }
}
