use crate::logs::SdkLogRecord;
use crate::{Resource, SdkResult};
use futures_util::future::BoxFuture;
use otel::InstrumentationScope;
use std::fmt;

/// Serializes emitted log records and delivers them to an external
/// receiver.
///
/// Same contract as the span exporter: the future is awaited with a
/// deadline, the batch is gone either way, and retries are the exporter's
/// own business.
pub trait LogExporter: Send + Sync + fmt::Debug {
    /// Export the given batch of records with their scopes.
    fn export(
        &mut self,
        batch: Vec<(SdkLogRecord, InstrumentationScope)>,
    ) -> BoxFuture<'static, SdkResult>;

    /// Shut the exporter down, releasing transport resources. Idempotent.
    fn shutdown(&mut self) {}

    /// Await any in-flight exports.
    fn force_flush(&mut self) -> SdkResult {
        Ok(())
    }

    /// Set the resource for every exported record.
    fn set_resource(&mut self, _resource: &Resource) {}
}
