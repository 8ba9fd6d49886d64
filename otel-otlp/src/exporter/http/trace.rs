use super::OtlpHttpClient;
use futures_util::future::BoxFuture;
use otel_proto::proto::collector::trace::v1::ExportTraceServiceRequest;
use otel_proto::transform::trace::group_spans_by_resource_and_scope;
use otel_sdk::trace::SpanData;
use otel_sdk::{Resource, SdkError, SdkResult};

#[derive(Debug)]
pub(crate) struct HttpTracesClient {
    client: OtlpHttpClient,
    resource: Resource,
}

impl HttpTracesClient {
    pub(crate) fn new(client: OtlpHttpClient) -> Self {
        HttpTracesClient {
            client,
            resource: Resource::empty(),
        }
    }
}

impl otel_sdk::trace::SpanExporter for HttpTracesClient {
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, SdkResult> {
        if batch.is_empty() {
            return Box::pin(futures_util::future::ready(Ok(())));
        }
        if self.client.is_shutdown() {
            return Box::pin(futures_util::future::ready(Err(SdkError::AlreadyShutdown)));
        }

        let request = ExportTraceServiceRequest {
            resource_spans: group_spans_by_resource_and_scope(batch, &self.resource),
        };
        match self.client.build_body(&request) {
            Ok((body, gzipped)) => self.client.send(body, gzipped, "HttpTracesClient.Export"),
            Err(err) => Box::pin(futures_util::future::ready(Err(err))),
        }
    }

    fn shutdown(&mut self) {
        self.client.shutdown();
    }

    fn force_flush(&mut self) -> SdkResult {
        self.client.force_flush()
    }

    fn set_resource(&mut self, resource: &Resource) {
        self.resource = resource.clone();
    }
}
