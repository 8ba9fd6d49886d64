use super::OtlpHttpClient;
use futures_util::future::BoxFuture;
use otel_proto::proto::collector::metrics::v1::ExportMetricsServiceRequest;
use otel_sdk::metrics::data::ResourceMetrics;
use otel_sdk::{SdkError, SdkResult};

#[derive(Debug)]
pub(crate) struct HttpMetricsClient {
    client: OtlpHttpClient,
}

impl HttpMetricsClient {
    pub(crate) fn new(client: OtlpHttpClient) -> Self {
        HttpMetricsClient { client }
    }

    pub(crate) fn export(&self, metrics: &ResourceMetrics) -> BoxFuture<'static, SdkResult> {
        if metrics.scope_metrics.is_empty() {
            return Box::pin(futures_util::future::ready(Ok(())));
        }
        if self.client.is_shutdown() {
            return Box::pin(futures_util::future::ready(Err(SdkError::AlreadyShutdown)));
        }

        let request = ExportMetricsServiceRequest {
            resource_metrics: vec![metrics.into()],
        };
        match self.client.build_body(&request) {
            Ok((body, gzipped)) => self.client.send(body, gzipped, "HttpMetricsClient.Export"),
            Err(err) => Box::pin(futures_util::future::ready(Err(err))),
        }
    }

    pub(crate) fn shutdown(&self) {
        self.client.shutdown();
    }

    pub(crate) fn force_flush(&self) -> SdkResult {
        self.client.force_flush()
    }
}
