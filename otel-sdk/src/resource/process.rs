use super::{Resource, ResourceDetector};
use otel::KeyValue;

/// Detects process identity: `process.pid` and, when resolvable,
/// `process.executable.name`.
#[derive(Debug, Default)]
pub struct ProcessResourceDetector;

impl ResourceDetector for ProcessResourceDetector {
    fn detect(&self) -> Resource {
        let mut attrs = vec![KeyValue::new("process.pid", std::process::id() as i64)];

        if let Some(name) = std::env::current_exe()
            .ok()
            .as_deref()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
        {
            attrs.push(KeyValue::new("process.executable.name", name.to_owned()));
        }

        Resource::new(attrs, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otel::{Key, Value};

    #[test]
    fn reports_pid() {
        let resource = ProcessResourceDetector.detect();
        assert_eq!(
            resource.get(&Key::new("process.pid")),
            Some(Value::I64(std::process::id() as i64))
        );
    }
}
