use super::{Resource, ResourceDetector};
use otel::KeyValue;

/// Detects the operating system type from the compilation target.
///
/// Reports `os.type` with values aligned to the semantic conventions
/// (`linux`, `windows`, `macos`, ...).
#[derive(Debug, Default)]
pub struct OsResourceDetector;

impl ResourceDetector for OsResourceDetector {
    fn detect(&self) -> Resource {
        Resource::new(
            [KeyValue::new("os.type", std::env::consts::OS)],
            None,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otel::Key;

    #[test]
    fn reports_os_type() {
        let resource = OsResourceDetector.detect();
        assert!(resource.get(&Key::new("os.type")).is_some());
    }
}
