use super::{Resource, ResourceDetector, SERVICE_NAME, SERVICE_VERSION};
use otel::KeyValue;
use percent_encoding::percent_decode_str;
use std::env;

const OTEL_RESOURCE_ATTRIBUTES: &str = "OTEL_RESOURCE_ATTRIBUTES";
const OTEL_SERVICE_NAME: &str = "OTEL_SERVICE_NAME";
const OTEL_SERVICE_VERSION: &str = "OTEL_SERVICE_VERSION";

/// Detects resource attributes from the `OTEL_RESOURCE_ATTRIBUTES`
/// environment variable.
///
/// The variable holds comma-separated `key=value` pairs; values are
/// URL-decoded. Entries without a `=` or with an empty key are skipped.
///
/// ```text
/// OTEL_RESOURCE_ATTRIBUTES="key1=value1,key2=value2"
/// ```
#[derive(Debug, Default)]
pub struct EnvResourceDetector {
    _private: (),
}

impl EnvResourceDetector {
    /// Create a new environment resource detector.
    pub fn new() -> Self {
        EnvResourceDetector { _private: () }
    }
}

impl ResourceDetector for EnvResourceDetector {
    fn detect(&self) -> Resource {
        match env::var(OTEL_RESOURCE_ATTRIBUTES) {
            Ok(s) if !s.is_empty() => construct_otel_resources(s),
            Ok(_) | Err(_) => Resource::empty(),
        }
    }
}

/// Extract key value pairs and construct a resource from resources string
/// like key1=value1,key2=value2,...
fn construct_otel_resources(s: String) -> Resource {
    Resource::new(
        s.split_terminator(',').filter_map(|entry| {
            let mut parts = entry.splitn(2, '=');
            let key = parts.next()?.trim();
            let value = parts.next()?.trim();
            if key.is_empty() {
                return None;
            }
            let value = percent_decode_str(value)
                .decode_utf8()
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| value.to_string());

            Some(KeyValue::new(key.to_owned(), value))
        }),
        None,
    )
}

/// Detects the service identity layer.
///
/// `service.name` comes from `OTEL_SERVICE_NAME`, falling back to
/// `unknown_service` so the identity attribute is always present;
/// `service.version` comes from `OTEL_SERVICE_VERSION` when set.
#[derive(Debug, Default)]
pub struct SdkProvidedResourceDetector;

impl ResourceDetector for SdkProvidedResourceDetector {
    fn detect(&self) -> Resource {
        let service_name = env::var(OTEL_SERVICE_NAME)
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "unknown_service".to_string());

        let mut attrs = vec![KeyValue::new(SERVICE_NAME, service_name)];
        if let Some(version) = env::var(OTEL_SERVICE_VERSION).ok().filter(|s| !s.is_empty()) {
            attrs.push(KeyValue::new(SERVICE_VERSION, version));
        }

        Resource::new(attrs, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otel::{Key, Value};

    #[test]
    fn parses_and_url_decodes_pairs() {
        temp_env::with_var(
            OTEL_RESOURCE_ATTRIBUTES,
            Some("key=value, k2 = v%202 ,malformed,=nokey"),
            || {
                let resource = EnvResourceDetector::new().detect();
                assert_eq!(resource.get(&Key::new("key")), Some(Value::from("value")));
                assert_eq!(resource.get(&Key::new("k2")), Some(Value::from("v 2")));
                assert_eq!(resource.len(), 2);
            },
        );
    }

    #[test]
    fn missing_var_yields_empty_resource() {
        temp_env::with_var_unset(OTEL_RESOURCE_ATTRIBUTES, || {
            assert!(EnvResourceDetector::new().detect().is_empty());
        });
    }

    #[test]
    fn service_name_falls_back() {
        temp_env::with_vars_unset([OTEL_SERVICE_NAME, OTEL_SERVICE_VERSION], || {
            let resource = SdkProvidedResourceDetector.detect();
            assert_eq!(
                resource.get(&SERVICE_NAME),
                Some(Value::from("unknown_service"))
            );
            assert_eq!(resource.get(&SERVICE_VERSION), None);
        });
    }
}
