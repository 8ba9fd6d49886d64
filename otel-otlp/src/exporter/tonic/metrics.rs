use super::{classify_grpc_error, GrpcExportError, InFlight, TonicClientParts};
use crate::retry::{retry_with_backoff, CancelToken, RetryPolicy};
use crate::DEFAULT_FORCE_FLUSH_TIMEOUT;
use futures_util::future::BoxFuture;
use otel::otel_debug;
use otel_proto::proto::collector::metrics::v1::metrics_service_client::MetricsServiceClient;
use otel_proto::proto::collector::metrics::v1::ExportMetricsServiceRequest;
use otel_sdk::metrics::data::ResourceMetrics;
use otel_sdk::{SdkError, SdkResult};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tonic::metadata::MetadataMap;
use tonic::transport::Channel;

pub(crate) struct TonicMetricsClient {
    inner: Mutex<Option<MetricsServiceClient<Channel>>>,
    metadata: MetadataMap,
    timeout: Duration,
    retry_policy: RetryPolicy,
    handle: tokio::runtime::Handle,
    cancel: Arc<CancelToken>,
    in_flight: Arc<InFlight>,
}

impl fmt::Debug for TonicMetricsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TonicMetricsClient").finish()
    }
}

impl TonicMetricsClient {
    pub(crate) fn new(parts: TonicClientParts) -> Self {
        let mut client = MetricsServiceClient::new(parts.channel);
        if let Some(compression) = parts.compression {
            client = client
                .send_compressed(compression)
                .accept_compressed(compression);
        }

        TonicMetricsClient {
            inner: Mutex::new(Some(client)),
            metadata: parts.metadata,
            timeout: parts.timeout,
            retry_policy: parts.retry_policy,
            handle: parts.handle,
            cancel: Arc::new(CancelToken::default()),
            in_flight: Arc::new(InFlight::default()),
        }
    }

    pub(crate) fn export(&self, metrics: &ResourceMetrics) -> BoxFuture<'static, SdkResult> {
        if metrics.scope_metrics.is_empty() {
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

        let request = ExportMetricsServiceRequest {
            resource_metrics: vec![metrics.into()],
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
                "TonicMetricsClient.Export",
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
                    otel_debug!(name: "TonicMetricsClient.ExportSucceeded");
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

    pub(crate) fn shutdown(&self) {
        self.cancel.cancel();
        if let Ok(mut inner) = self.inner.lock() {
            *inner = None;
        }
    }

    pub(crate) fn force_flush(&self) -> SdkResult {
        self.in_flight.wait(DEFAULT_FORCE_FLUSH_TIMEOUT)
    }
}
