use super::{Resource, ResourceDetector};
use otel::KeyValue;

/// Reports this SDK's own identity: `telemetry.sdk.name`,
/// `telemetry.sdk.version` and `telemetry.sdk.language`.
#[derive(Debug, Default)]
pub struct TelemetryResourceDetector;

impl ResourceDetector for TelemetryResourceDetector {
    fn detect(&self) -> Resource {
        Resource::new(
            [
                KeyValue::new("telemetry.sdk.name", env!("CARGO_PKG_NAME")),
                KeyValue::new("telemetry.sdk.version", env!("CARGO_PKG_VERSION")),
                KeyValue::new("telemetry.sdk.language", "rust"),
            ],
            None,
        )
    }
}
