use super::{classify_grpc_error, GrpcExportError, InFlight, TonicClientParts};
use crate::retry::{retry_with_backoff, CancelToken, RetryPolicy};
use crate::DEFAULT_FORCE_FLUSH_TIMEOUT;
use futures_util::future::BoxFuture;
use otel::otel_debug;
use otel::InstrumentationScope;
use otel_proto::proto::collector::logs::v1::logs_service_client::LogsServiceClient;
use otel_proto::proto::collector::logs::v1::ExportLogsServiceRequest;
use otel_proto::transform::logs::group_logs_by_resource_and_scope;
use otel_sdk::logs::SdkLogRecord;
use otel_sdk::{Resource, SdkError, SdkResult};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tonic::metadata::MetadataMap;
use tonic::transport::Channel;

pub(crate) struct TonicLogsClient {
    inner: Mutex<Option<LogsServiceClient<Channel>>>,
    metadata: MetadataMap,
    timeout: Duration,
    retry_policy: RetryPolicy,
    handle: tokio::runtime::Handle,
    cancel: Arc<CancelToken>,
    in_flight: Arc<InFlight>,
    resource: Resource,
}

impl fmt::Debug for TonicLogsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TonicLogsClient").finish()
    }
}

impl TonicLogsClient {
    pub(crate) fn new(parts: TonicClientParts) -> Self {
        let mut client = LogsServiceClient::new(parts.channel);
        if let Some(compression) = parts.compression {
            client = client
                .send_compressed(compression)
                .accept_compressed(compression);
        }

        TonicLogsClient {
            inner: Mutex::new(Some(client)),
            metadata: parts.metadata,
            timeout: parts.timeout,
            retry_policy: parts.retry_policy,
            handle: parts.handle,
            cancel: Arc::new(CancelToken::default()),
            in_flight: Arc::new(InFlight::default()),
            resource: Resource::empty(),
        }
    }
}

impl otel_sdk::logs::LogExporter for TonicLogsClient {
    fn export(
        &mut self,
        batch: Vec<(SdkLogRecord, InstrumentationScope)>,
    ) -> BoxFuture<'static, SdkResult> {
        if batch.is_empty() {
            return Box::pin(futures_util::future::ready(Ok(())));
        }

        let client = match self.inner.lock() {
            Ok(inner) => match &*inner {
                Some(client) => client.clone(),
                None => {
                    return Box::pin(futures_util::future::ready(Err(
                        SdkError::AlreadyShutdown,
                    )))
                }
            },
            Err(_) => {
                return Box::pin(futures_util::future::ready(Err(
                    SdkError::InternalFailure("exporter lock poisoned".into()),
                )))
            }
        };

        let request = ExportLogsServiceRequest {
            resource_logs: group_logs_by_resource_and_scope(batch, &self.resource),
        };
        let metadata = self.metadata.clone();
        let timeout = self.timeout;
        let retry_policy = self.retry_policy.clone();
        let cancel = self.cancel.clone();
        let in_flight = self.in_flight.clone();

        in_flight.begin();
        let task = self.handle.spawn(async move {
            let result = retry_with_backoff(
                retry_policy,
                &cancel,
                classify_grpc_error,
                "TonicLogsClient.Export",
                || {
                    let mut client = client.clone();
                    let mut rpc = tonic::Request::new(request.clone());
                    *rpc.metadata_mut() = metadata.clone();
                    async move {
                        match tokio::time::timeout(timeout, client.export(rpc)).await {
                            Ok(Ok(_response)) => Ok(()),
                            Ok(Err(status)) => Err(GrpcExportError::Status(status)),
                            Err(_elapsed) => Err(GrpcExportError::Deadline(timeout)),
                        }
                    }
                },
            )
            .await;
            in_flight.end();

            match result {
                Ok(()) => {
                    otel_debug!(name: "TonicLogsClient.ExportSucceeded");
                    Ok(())
                }
                Err(err) => Err(SdkError::InternalFailure(err.to_string())),
            }
        });

        Box::pin(async move {
            task.await
                .unwrap_or_else(|err| Err(SdkError::InternalFailure(format!("export task failed: {err}"))))
        })
    }

    fn shutdown(&mut self) {
        self.cancel.cancel();
        if let Ok(mut inner) = self.inner.lock() {
            *inner = None;
        }
    }

    fn force_flush(&mut self) -> SdkResult {
        self.in_flight.wait(DEFAULT_FORCE_FLUSH_TIMEOUT)
    }

    fn set_resource(&mut self, resource: &Resource) {
        self.resource = resource.clone();
    }
}
