use crate::exporter::http::metrics::HttpMetricsClient;
use crate::exporter::tonic::metrics::TonicMetricsClient;
use crate::exporter::{
    HasExportConfig, HttpExporterBuilder, TonicExporterBuilder, METRICS_SIGNAL,
};
use crate::span::{HttpExporterBuilderSet, NoExporterBuilderSet, TonicExporterBuilderSet};
use crate::ExporterBuildError;
use futures_util::future::BoxFuture;
use otel_sdk::metrics::data::ResourceMetrics;
use otel_sdk::metrics::{PushMetricExporter, Temporality};
use otel_sdk::SdkResult;

/// An OTLP metric exporter over the configured transport.
///
/// The temporality it reports (cumulative by default) drives the
/// temporality of every reader pipeline feeding it.
#[derive(Debug)]
pub struct MetricExporter {
    client: SupportedTransportClient,
    temporality: Temporality,
}

#[derive(Debug)]
enum SupportedTransportClient {
    Tonic(TonicMetricsClient),
    Http(HttpMetricsClient),
}

impl MetricExporter {
    /// A builder; pick a transport with
    /// [`with_tonic`](MetricExporterBuilder::with_tonic) or
    /// [`with_http`](MetricExporterBuilder::with_http).
    pub fn builder() -> MetricExporterBuilder {
        MetricExporterBuilder::default()
    }
}

impl PushMetricExporter for MetricExporter {
    fn export(&self, metrics: &ResourceMetrics) -> BoxFuture<'static, SdkResult> {
        match &self.client {
            SupportedTransportClient::Tonic(client) => client.export(metrics),
            SupportedTransportClient::Http(client) => client.export(metrics),
        }
    }

    fn force_flush(&self) -> SdkResult {
        match &self.client {
            SupportedTransportClient::Tonic(client) => client.force_flush(),
            SupportedTransportClient::Http(client) => client.force_flush(),
        }
    }

    fn shutdown(&self) {
        match &self.client {
            SupportedTransportClient::Tonic(client) => client.shutdown(),
            SupportedTransportClient::Http(client) => client.shutdown(),
        }
    }

    fn temporality(&self) -> Temporality {
        self.temporality
    }
}

/// Builds a [`MetricExporter`] in two steps: pick a transport, then
/// configure it.
#[derive(Debug, Default)]
pub struct MetricExporterBuilder<C = NoExporterBuilderSet> {
    client: C,
    temporality: Temporality,
}

impl MetricExporterBuilder<NoExporterBuilderSet> {
    /// Use the gRPC transport.
    pub fn with_tonic(self) -> MetricExporterBuilder<TonicExporterBuilderSet> {
        MetricExporterBuilder {
            client: TonicExporterBuilderSet(TonicExporterBuilder::default()),
            temporality: self.temporality,
        }
    }

    /// Use the HTTP/protobuf transport.
    pub fn with_http(self) -> MetricExporterBuilder<HttpExporterBuilderSet> {
        MetricExporterBuilder {
            client: HttpExporterBuilderSet(HttpExporterBuilder::default()),
            temporality: self.temporality,
        }
    }
}

impl<C> MetricExporterBuilder<C> {
    /// The temporality this exporter asks its readers for.
    pub fn with_temporality(mut self, temporality: Temporality) -> Self {
        self.temporality = temporality;
        self
    }
}

impl MetricExporterBuilder<TonicExporterBuilderSet> {
    /// Build the exporter. Must be called within a tokio runtime.
    pub fn build(self) -> Result<MetricExporter, ExporterBuildError> {
        let parts = self.client.0.build_parts(METRICS_SIGNAL)?;
        Ok(MetricExporter {
            client: SupportedTransportClient::Tonic(TonicMetricsClient::new(parts)),
            temporality: self.temporality,
        })
    }
}

impl MetricExporterBuilder<HttpExporterBuilderSet> {
    /// Build the exporter. Must be called within a tokio runtime.
    pub fn build(self) -> Result<MetricExporter, ExporterBuildError> {
        let client = self.client.0.build_client(METRICS_SIGNAL)?;
        Ok(MetricExporter {
            client: SupportedTransportClient::Http(HttpMetricsClient::new(client)),
            temporality: self.temporality,
        })
    }
}

impl HasExportConfig for MetricExporterBuilder<TonicExporterBuilderSet> {
    fn export_config(&mut self) -> &mut crate::exporter::ExportConfig {
        &mut self.client.0.exporter_config
    }
}

impl HasExportConfig for MetricExporterBuilder<HttpExporterBuilderSet> {
    fn export_config(&mut self) -> &mut crate::exporter::ExportConfig {
        &mut self.client.0.exporter_config
    }
}

impl crate::exporter::tonic::HasTonicConfig for MetricExporterBuilder<TonicExporterBuilderSet> {
    fn tonic_config(&mut self) -> &mut crate::exporter::tonic::TonicConfig {
        &mut self.client.0.tonic_config
    }
}

impl crate::exporter::http::HasHttpConfig for MetricExporterBuilder<HttpExporterBuilderSet> {
    fn http_config(&mut self) -> &mut crate::exporter::http::HttpConfig {
        &mut self.client.0.http_config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn metric_exporter_carries_temporality() {
        let exporter = MetricExporter::builder()
            .with_temporality(Temporality::Delta)
            .with_tonic()
            .build()
            .unwrap();
        assert_eq!(exporter.temporality(), Temporality::Delta);
    }
}
