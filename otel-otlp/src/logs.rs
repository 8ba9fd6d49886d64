use crate::exporter::http::logs::HttpLogsClient;
use crate::exporter::tonic::logs::TonicLogsClient;
use crate::exporter::{HasExportConfig, HttpExporterBuilder, TonicExporterBuilder, LOGS_SIGNAL};
use crate::span::{HttpExporterBuilderSet, NoExporterBuilderSet, TonicExporterBuilderSet};
use crate::ExporterBuildError;
use futures_util::future::BoxFuture;
use otel::InstrumentationScope;
use otel_sdk::logs::SdkLogRecord;
use otel_sdk::{Resource, SdkResult};

/// An OTLP log exporter over the configured transport.
#[derive(Debug)]
pub struct LogExporter {
    client: SupportedTransportClient,
}

#[derive(Debug)]
enum SupportedTransportClient {
    Tonic(TonicLogsClient),
    Http(HttpLogsClient),
}

impl LogExporter {
    /// A builder; pick a transport with
    /// [`with_tonic`](LogExporterBuilder::with_tonic) or
    /// [`with_http`](LogExporterBuilder::with_http).
    pub fn builder() -> LogExporterBuilder {
        LogExporterBuilder::default()
    }
}

impl otel_sdk::logs::LogExporter for LogExporter {
    fn export(
        &mut self,
        batch: Vec<(SdkLogRecord, InstrumentationScope)>,
    ) -> BoxFuture<'static, SdkResult> {
        match &mut self.client {
            SupportedTransportClient::Tonic(client) => {
                otel_sdk::logs::LogExporter::export(client, batch)
            }
            SupportedTransportClient::Http(client) => {
                otel_sdk::logs::LogExporter::export(client, batch)
            }
        }
    }

    fn shutdown(&mut self) {
        match &mut self.client {
            SupportedTransportClient::Tonic(client) => {
                otel_sdk::logs::LogExporter::shutdown(client)
            }
            SupportedTransportClient::Http(client) => {
                otel_sdk::logs::LogExporter::shutdown(client)
            }
        }
    }

    fn force_flush(&mut self) -> SdkResult {
        match &mut self.client {
            SupportedTransportClient::Tonic(client) => {
                otel_sdk::logs::LogExporter::force_flush(client)
            }
            SupportedTransportClient::Http(client) => {
                otel_sdk::logs::LogExporter::force_flush(client)
            }
        }
    }

    fn set_resource(&mut self, resource: &Resource) {
        match &mut self.client {
            SupportedTransportClient::Tonic(client) => {
                otel_sdk::logs::LogExporter::set_resource(client, resource)
            }
            SupportedTransportClient::Http(client) => {
                otel_sdk::logs::LogExporter::set_resource(client, resource)
            }
        }
    }
}

/// Builds a [`LogExporter`] in two steps: pick a transport, then
/// configure it.
#[derive(Debug, Default)]
pub struct LogExporterBuilder<C = NoExporterBuilderSet> {
    client: C,
}

impl LogExporterBuilder<NoExporterBuilderSet> {
    /// Use the gRPC transport.
    pub fn with_tonic(self) -> LogExporterBuilder<TonicExporterBuilderSet> {
        LogExporterBuilder {
            client: TonicExporterBuilderSet(TonicExporterBuilder::default()),
        }
    }

    /// Use the HTTP/protobuf transport.
    pub fn with_http(self) -> LogExporterBuilder<HttpExporterBuilderSet> {
        LogExporterBuilder {
            client: HttpExporterBuilderSet(HttpExporterBuilder::default()),
        }
    }
}

impl LogExporterBuilder<TonicExporterBuilderSet> {
    /// Build the exporter. Must be called within a tokio runtime.
    pub fn build(self) -> Result<LogExporter, ExporterBuildError> {
        let parts = self.client.0.build_parts(LOGS_SIGNAL)?;
        Ok(LogExporter {
            client: SupportedTransportClient::Tonic(TonicLogsClient::new(parts)),
        })
    }
}

impl LogExporterBuilder<HttpExporterBuilderSet> {
    /// Build the exporter. Must be called within a tokio runtime.
    pub fn build(self) -> Result<LogExporter, ExporterBuildError> {
        let client = self.client.0.build_client(LOGS_SIGNAL)?;
        Ok(LogExporter {
            client: SupportedTransportClient::Http(HttpLogsClient::new(client)),
        })
    }
}

impl HasExportConfig for LogExporterBuilder<TonicExporterBuilderSet> {
    fn export_config(&mut self) -> &mut crate::exporter::ExportConfig {
        &mut self.client.0.exporter_config
    }
}

impl HasExportConfig for LogExporterBuilder<HttpExporterBuilderSet> {
    fn export_config(&mut self) -> &mut crate::exporter::ExportConfig {
        &mut self.client.0.exporter_config
    }
}

impl crate::exporter::tonic::HasTonicConfig for LogExporterBuilder<TonicExporterBuilderSet> {
    fn tonic_config(&mut self) -> &mut crate::exporter::tonic::TonicConfig {
        &mut self.client.0.tonic_config
    }
}

impl crate::exporter::http::HasHttpConfig for LogExporterBuilder<HttpExporterBuilderSet> {
    fn http_config(&mut self) -> &mut crate::exporter::http::HttpConfig {
        &mut self.client.0.http_config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{WithExportConfig, WithHttpConfig};

    #[tokio::test]
    async fn http_exporter_builds_with_headers_and_compression() {
        let exporter = LogExporter::builder()
            .with_http()
            .with_endpoint("http://localhost:4318")
            .with_header("api-key", "secret")
            .with_compression(crate::Compression::Gzip)
            .build();
        assert!(exporter.is_ok());
    }
}
