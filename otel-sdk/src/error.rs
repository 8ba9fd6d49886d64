use std::time::Duration;
use thiserror::Error;

/// Errors returned by pipeline operations: `export()`, `force_flush()` and
/// `shutdown()`.
///
/// Instrumentation-side entry points never return these; they absorb
/// problems internally (dropping and counting, or logging) so application
/// code cannot fail because of telemetry.
#[derive(Error, Debug, PartialEq)]
pub enum SdkError {
    /// Shutdown has already been invoked.
    ///
    /// Shutdown is idempotent; this is a benign indication, not a fault,
    /// but it usually points at duplicate lifecycle management in the
    /// application.
    #[error("shutdown already invoked")]
    AlreadyShutdown,

    /// The operation did not complete within its deadline.
    ///
    /// The work may still complete in the background; this only reports
    /// that the caller stopped waiting.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The operation failed.
    ///
    /// The message is for logging only; callers should not branch on its
    /// content.
    #[error("operation failed: {0}")]
    InternalFailure(String),
}

/// A specialized `Result` for pipeline operations.
pub type SdkResult = Result<(), SdkError>;
