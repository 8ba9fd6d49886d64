use super::{
    EnvResourceDetector, OsResourceDetector, ProcessResourceDetector, Resource, ResourceDetector,
    SdkProvidedResourceDetector, TelemetryResourceDetector, SERVICE_NAME, TENANT_ID,
};
use otel::KeyValue;
use std::borrow::Cow;

/// Assembles a [`Resource`] from detectors and explicit attributes.
///
/// Layers are merged lowest to highest precedence: platform-detected
/// attributes, the environment-derived service identity, attributes from
/// `OTEL_RESOURCE_ATTRIBUTES`, the tenant marker, and finally attributes
/// supplied programmatically. The built resource is frozen.
#[derive(Debug)]
pub struct ResourceBuilder {
    platform: Resource,
    service: Resource,
    env: Resource,
    tenant: Option<KeyValue>,
    user: Vec<KeyValue>,
    schema_url: Option<Cow<'static, str>>,
}

impl Default for ResourceBuilder {
    fn default() -> Self {
        let platform = OsResourceDetector
            .detect()
            .merge(&ProcessResourceDetector.detect())
            .merge(&TelemetryResourceDetector.detect());

        ResourceBuilder {
            platform,
            service: SdkProvidedResourceDetector.detect(),
            env: EnvResourceDetector::new().detect(),
            tenant: None,
            user: Vec::new(),
            schema_url: None,
        }
    }
}

impl ResourceBuilder {
    pub(crate) fn empty() -> Self {
        ResourceBuilder {
            platform: Resource::empty(),
            service: Resource::empty(),
            env: Resource::empty(),
            tenant: None,
            user: Vec::new(),
            schema_url: None,
        }
    }

    /// Add a [`ResourceDetector`] to the platform layer.
    pub fn with_detector(mut self, detector: &dyn ResourceDetector) -> Self {
        self.platform = self.platform.merge(&detector.detect());
        self
    }

    /// Set the `service.name` identity attribute, overriding the
    /// environment.
    pub fn with_service_name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.service = self
            .service
            .merge(&Resource::new(
                [KeyValue::new(SERVICE_NAME, name.into().into_owned())],
                None,
            ));
        self
    }

    /// Set the optional `tenant.id` marker attribute.
    pub fn with_tenant(mut self, tenant: impl Into<Cow<'static, str>>) -> Self {
        self.tenant = Some(KeyValue::new(TENANT_ID, tenant.into().into_owned()));
        self
    }

    /// Add a user-supplied attribute, the highest-precedence layer.
    pub fn with_attribute(mut self, kv: KeyValue) -> Self {
        self.user.push(kv);
        self
    }

    /// Add user-supplied attributes, the highest-precedence layer.
    pub fn with_attributes<T: IntoIterator<Item = KeyValue>>(mut self, attrs: T) -> Self {
        self.user.extend(attrs);
        self
    }

    /// Set the schema url of the built resource.
    pub fn with_schema_url(mut self, schema_url: impl Into<Cow<'static, str>>) -> Self {
        self.schema_url = Some(schema_url.into());
        self
    }

    /// Merge the layers and freeze the result.
    pub fn build(self) -> Resource {
        let mut resource = self
            .platform
            .merge(&self.service)
            .merge(&self.env);
        if let Some(tenant) = self.tenant {
            resource = resource.merge(&Resource::new([tenant], None));
        }
        let mut resource = resource.merge(&Resource::new(self.user, None));
        if self.schema_url.is_some() {
            resource = Resource::new(
                resource.iter().map(|(k, v)| KeyValue {
                    key: k.clone(),
                    value: v.clone(),
                }),
                self.schema_url,
            );
        }
        resource
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otel::{Key, Value};

    #[test]
    fn user_attributes_win() {
        let resource = Resource::builder_empty()
            .with_service_name("svc")
            .with_tenant("acme")
            .with_attributes([KeyValue::new("tenant.id", "overridden")])
            .build();
        assert_eq!(
            resource.get(&Key::new("tenant.id")),
            Some(Value::from("overridden"))
        );
        assert_eq!(
            resource.get(&Key::new("service.name")),
            Some(Value::from("svc"))
        );
    }

    #[test]
    fn env_service_name_detected() {
        temp_env::with_var("OTEL_SERVICE_NAME", Some("from-env"), || {
            let resource = Resource::builder().build();
            assert_eq!(
                resource.get(&Key::new("service.name")),
                Some(Value::from("from-env"))
            );
        });
    }

    #[test]
    fn schema_url_applied() {
        let resource = Resource::builder_empty()
            .with_schema_url("https://opentelemetry.io/schemas/1.21.0")
            .build();
        assert_eq!(
            resource.schema_url(),
            Some("https://opentelemetry.io/schemas/1.21.0")
        );
    }
}
