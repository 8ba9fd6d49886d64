use crate::exporter::http::trace::HttpTracesClient;
use crate::exporter::tonic::trace::TonicTracesClient;
use crate::exporter::{
    HasExportConfig, HttpExporterBuilder, TonicExporterBuilder, TRACES_SIGNAL,
};
use crate::ExporterBuildError;
use futures_util::future::BoxFuture;
use otel_sdk::trace::SpanData;
use otel_sdk::{Resource, SdkResult};

/// An OTLP span exporter over the configured transport.
#[derive(Debug)]
pub struct SpanExporter {
    client: SupportedTransportClient,
}

#[derive(Debug)]
enum SupportedTransportClient {
    Tonic(TonicTracesClient),
    Http(HttpTracesClient),
}

impl SpanExporter {
    /// A builder; pick a transport with
    /// [`with_tonic`](SpanExporterBuilder::with_tonic) or
    /// [`with_http`](SpanExporterBuilder::with_http).
    pub fn builder() -> SpanExporterBuilder {
        SpanExporterBuilder::default()
    }
}

impl otel_sdk::trace::SpanExporter for SpanExporter {
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, SdkResult> {
        match &mut self.client {
            SupportedTransportClient::Tonic(client) => {
                otel_sdk::trace::SpanExporter::export(client, batch)
            }
            SupportedTransportClient::Http(client) => {
                otel_sdk::trace::SpanExporter::export(client, batch)
            }
        }
    }

    fn shutdown(&mut self) {
        match &mut self.client {
            SupportedTransportClient::Tonic(client) => {
                otel_sdk::trace::SpanExporter::shutdown(client)
            }
            SupportedTransportClient::Http(client) => {
                otel_sdk::trace::SpanExporter::shutdown(client)
            }
        }
    }

    fn force_flush(&mut self) -> SdkResult {
        match &mut self.client {
            SupportedTransportClient::Tonic(client) => {
                otel_sdk::trace::SpanExporter::force_flush(client)
            }
            SupportedTransportClient::Http(client) => {
                otel_sdk::trace::SpanExporter::force_flush(client)
            }
        }
    }

    fn set_resource(&mut self, resource: &Resource) {
        match &mut self.client {
            SupportedTransportClient::Tonic(client) => {
                otel_sdk::trace::SpanExporter::set_resource(client, resource)
            }
            SupportedTransportClient::Http(client) => {
                otel_sdk::trace::SpanExporter::set_resource(client, resource)
            }
        }
    }
}

/// The transport has not been chosen yet.
#[derive(Debug, Default)]
pub struct NoExporterBuilderSet;

/// gRPC transport chosen.
#[derive(Debug)]
pub struct TonicExporterBuilderSet(pub(crate) TonicExporterBuilder);

/// HTTP transport chosen.
#[derive(Debug)]
pub struct HttpExporterBuilderSet(pub(crate) HttpExporterBuilder);

/// Builds a [`SpanExporter`] in two steps: pick a transport, then
/// configure it.
#[derive(Debug, Default)]
pub struct SpanExporterBuilder<C = NoExporterBuilderSet> {
    client: C,
}

impl SpanExporterBuilder<NoExporterBuilderSet> {
    /// Use the gRPC transport.
    pub fn with_tonic(self) -> SpanExporterBuilder<TonicExporterBuilderSet> {
        SpanExporterBuilder {
            client: TonicExporterBuilderSet(TonicExporterBuilder::default()),
        }
    }

    /// Use the HTTP/protobuf transport.
    pub fn with_http(self) -> SpanExporterBuilder<HttpExporterBuilderSet> {
        SpanExporterBuilder {
            client: HttpExporterBuilderSet(HttpExporterBuilder::default()),
        }
    }
}

impl SpanExporterBuilder<TonicExporterBuilderSet> {
    /// Build the exporter. Must be called within a tokio runtime.
    pub fn build(self) -> Result<SpanExporter, ExporterBuildError> {
        let parts = self.client.0.build_parts(TRACES_SIGNAL)?;
        Ok(SpanExporter {
            client: SupportedTransportClient::Tonic(TonicTracesClient::new(parts)),
        })
    }
}

impl SpanExporterBuilder<HttpExporterBuilderSet> {
    /// Build the exporter. Must be called within a tokio runtime.
    pub fn build(self) -> Result<SpanExporter, ExporterBuildError> {
        let client = self.client.0.build_client(TRACES_SIGNAL)?;
        Ok(SpanExporter {
            client: SupportedTransportClient::Http(HttpTracesClient::new(client)),
        })
    }
}

impl HasExportConfig for SpanExporterBuilder<TonicExporterBuilderSet> {
    fn export_config(&mut self) -> &mut crate::exporter::ExportConfig {
        &mut self.client.0.exporter_config
    }
}

impl HasExportConfig for SpanExporterBuilder<HttpExporterBuilderSet> {
    fn export_config(&mut self) -> &mut crate::exporter::ExportConfig {
        &mut self.client.0.exporter_config
    }
}

impl crate::exporter::tonic::HasTonicConfig for SpanExporterBuilder<TonicExporterBuilderSet> {
    fn tonic_config(&mut self) -> &mut crate::exporter::tonic::TonicConfig {
        &mut self.client.0.tonic_config
    }
}

impl crate::exporter::http::HasHttpConfig for SpanExporterBuilder<HttpExporterBuilderSet> {
    fn http_config(&mut self) -> &mut crate::exporter::http::HttpConfig {
        &mut self.client.0.http_config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{WithExportConfig, WithTonicConfig};

    #[tokio::test]
    async fn tonic_exporter_builds_within_a_runtime() {
        let exporter = SpanExporter::builder()
            .with_tonic()
            .with_endpoint("http://localhost:4317")
            .with_compression(crate::Compression::Gzip)
            .build();
        assert!(exporter.is_ok());
    }

    #[tokio::test]
    async fn http_exporter_builds_within_a_runtime() {
        let exporter = SpanExporter::builder()
            .with_http()
            .with_endpoint("http://localhost:4318")
            .build();
        assert!(exporter.is_ok());
    }

    #[test]
    fn tonic_exporter_requires_a_runtime() {
        let result = SpanExporter::builder().with_tonic().build();
        assert!(matches!(result, Err(ExporterBuildError::NoTokioRuntime(_))));
    }
}
