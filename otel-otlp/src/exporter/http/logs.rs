use super::OtlpHttpClient;
use futures_util::future::BoxFuture;
use otel::InstrumentationScope;
use otel_proto::proto::collector::logs::v1::ExportLogsServiceRequest;
use otel_proto::transform::logs::group_logs_by_resource_and_scope;
use otel_sdk::logs::SdkLogRecord;
use otel_sdk::{Resource, SdkError, SdkResult};

#[derive(Debug)]
pub(crate) struct HttpLogsClient {
    client: OtlpHttpClient,
    resource: Resource,
}

impl HttpLogsClient {
    pub(crate) fn new(client: OtlpHttpClient) -> Self {
        HttpLogsClient {
            client,
            resource: Resource::empty(),
        }
    }
}

impl otel_sdk::logs::LogExporter for HttpLogsClient {
    fn export(
        &mut self,
        batch: Vec<(SdkLogRecord, InstrumentationScope)>,
    ) -> BoxFuture<'static, SdkResult> {
        if batch.is_empty() {
            return Box::pin(futures_util::future::ready(Ok(())));
        }
        if self.client.is_shutdown() {
            return Box::pin(futures_util::future::ready(Err(SdkError::AlreadyShutdown)));
        }

        let request = ExportLogsServiceRequest {
            resource_logs: group_logs_by_resource_and_scope(batch, &self.resource),
        };
        match self.client.build_body(&request) {
            Ok((body, gzipped)) => self.client.send(body, gzipped, "HttpLogsClient.Export"),
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
