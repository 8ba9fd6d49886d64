//! Internal diagnostic macros.
//!
//! These macros (`otel_info!`, `otel_warn!`, `otel_debug!`, `otel_error!`)
//! are for use inside the telemetry pipeline itself and for custom
//! exporters and processors. They forward to [`tracing`] with the emitting
//! crate as the target, so applications can filter pipeline self-diagnosis
//! the same way they filter any other library.
//!
//! They are not a general application logging facility.

/// Log an informational message with a `name:` identifying the operation.
#[macro_export]
macro_rules! otel_info {
    (name: $name:expr $(,)?) => {
        tracing::info!(name: $name, target: env!("CARGO_PKG_NAME"), "")
    };
    (name: $name:expr, $($key:ident = $value:expr),+ $(,)?) => {
        tracing::info!(name: $name, target: env!("CARGO_PKG_NAME"), $($key = $value),+, "")
    };
}

/// Log a warning with a `name:` identifying the operation.
#[macro_export]
macro_rules! otel_warn {
    (name: $name:expr $(,)?) => {
        tracing::warn!(name: $name, target: env!("CARGO_PKG_NAME"), "")
    };
    (name: $name:expr, $($key:ident = $value:expr),+ $(,)?) => {
        tracing::warn!(name: $name, target: env!("CARGO_PKG_NAME"), $($key = $value),+, "")
    };
}

/// Log a debug message with a `name:` identifying the operation.
#[macro_export]
macro_rules! otel_debug {
    (name: $name:expr $(,)?) => {
        tracing::debug!(name: $name, target: env!("CARGO_PKG_NAME"), "")
    };
    (name: $name:expr, $($key:ident = $value:expr),+ $(,)?) => {
        tracing::debug!(name: $name, target: env!("CARGO_PKG_NAME"), $($key = $value),+, "")
    };
}

/// Log an error with a `name:` identifying the operation.
#[macro_export]
macro_rules! otel_error {
    (name: $name:expr $(,)?) => {
        tracing::error!(name: $name, target: env!("CARGO_PKG_NAME"), "")
    };
    (name: $name:expr, $($key:ident = $value:expr),+ $(,)?) => {
        tracing::error!(name: $name, target: env!("CARGO_PKG_NAME"), $($key = $value),+, "")
    };
}
