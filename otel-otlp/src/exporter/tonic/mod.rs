//! The gRPC transport.
//!
//! A single lazily-connected channel per exporter, rebuilt only at
//! construction; steady-state calls share it concurrently. Compression is
//! a per-call option, TLS material comes from files, and every RPC runs on
//! the tokio runtime captured at build time so exports work from the
//! pipeline's worker threads.

use crate::exporter::{
    env_or_general, read_pem, resolve_compression, resolve_headers, resolve_timeout, Compression,
    ExportConfig, HasExportConfig, Signal, TlsOptions, OTEL_EXPORTER_OTLP_ENDPOINT,
    OTEL_EXPORTER_OTLP_GRPC_ENDPOINT_DEFAULT,
};
use crate::retry::{RetryErrorType, RetryPolicy};
use crate::ExporterBuildError;
use otel::otel_warn;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tonic::codec::CompressionEncoding;
use tonic::metadata::{MetadataKey, MetadataMap, MetadataValue};
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Identity};

pub(crate) mod logs;
pub(crate) mod metrics;
pub(crate) mod trace;

/// Configuration for the tonic transport.
#[derive(Debug, Default)]
pub struct TonicConfig {
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) compression: Option<Compression>,
    pub(crate) tls: TlsOptions,
    pub(crate) retry_policy: Option<RetryPolicy>,
    pub(crate) channel: Option<Channel>,
}

/// Configuration for the gRPC OTLP exporters.
///
/// ```no_run
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// # let runtime = tokio::runtime::Runtime::new()?;
/// # let _guard = runtime.enter();
/// use otel_otlp::WithExportConfig;
///
/// let exporter = otel_otlp::SpanExporter::builder()
///     .with_tonic()
///     .with_endpoint("http://collector:4317")
///     .build()?;
/// # drop(exporter);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct TonicExporterBuilder {
    pub(crate) exporter_config: ExportConfig,
    pub(crate) tonic_config: TonicConfig,
}

impl HasExportConfig for TonicExporterBuilder {
    fn export_config(&mut self) -> &mut ExportConfig {
        &mut self.exporter_config
    }
}

/// Access to the tonic config within exporter builders.
pub trait HasTonicConfig {
    /// Return a mutable reference to the tonic config within the builder.
    fn tonic_config(&mut self) -> &mut TonicConfig;
}

impl HasTonicConfig for TonicExporterBuilder {
    fn tonic_config(&mut self) -> &mut TonicConfig {
        &mut self.tonic_config
    }
}

/// Transport options of the gRPC exporters, implemented for every builder
/// with a [`HasTonicConfig`].
pub trait WithTonicConfig {
    /// Append a metadata entry to every request.
    fn with_metadata<K: Into<String>, V: Into<String>>(self, key: K, value: V) -> Self;

    /// Compress request payloads with the given algorithm.
    fn with_compression(self, compression: Compression) -> Self;

    /// Use the given CA certificate file to verify the collector.
    fn with_ca_file<T: Into<String>>(self, path: T) -> Self;

    /// Present the given client certificate/key files for mutual TLS.
    fn with_client_cert_files<C: Into<String>, K: Into<String>>(self, cert: C, key: K) -> Self;

    /// Use plaintext even though TLS material is configured.
    fn with_insecure(self) -> Self;

    /// Replace the default retry policy.
    fn with_retry_policy(self, policy: RetryPolicy) -> Self;

    /// Use an already-built channel, skipping endpoint and TLS resolution.
    fn with_channel(self, channel: Channel) -> Self;
}

impl<B: HasTonicConfig> WithTonicConfig for B {
    fn with_metadata<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.tonic_config().headers.push((key.into(), value.into()));
        self
    }

    fn with_compression(mut self, compression: Compression) -> Self {
        self.tonic_config().compression = Some(compression);
        self
    }

    fn with_ca_file<T: Into<String>>(mut self, path: T) -> Self {
        self.tonic_config().tls.ca_file = Some(path.into());
        self
    }

    fn with_client_cert_files<C: Into<String>, K: Into<String>>(mut self, cert: C, key: K) -> Self {
        let config = self.tonic_config();
        config.tls.client_certificate_file = Some(cert.into());
        config.tls.client_key_file = Some(key.into());
        self
    }

    fn with_insecure(mut self) -> Self {
        self.tonic_config().tls.insecure = true;
        self
    }

    fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.tonic_config().retry_policy = Some(policy);
        self
    }

    fn with_channel(mut self, channel: Channel) -> Self {
        self.tonic_config().channel = Some(channel);
        self
    }
}

/// Everything a per-signal gRPC client needs, resolved from the builder,
/// the environment and the defaults.
pub(crate) struct TonicClientParts {
    pub(crate) channel: Channel,
    pub(crate) metadata: MetadataMap,
    pub(crate) compression: Option<CompressionEncoding>,
    pub(crate) timeout: Duration,
    pub(crate) retry_policy: RetryPolicy,
    pub(crate) handle: tokio::runtime::Handle,
}

impl TonicExporterBuilder {
    pub(crate) fn build_parts(self, signal: Signal) -> Result<TonicClientParts, ExporterBuildError> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|err| ExporterBuildError::NoTokioRuntime(err.to_string()))?;

        let timeout = resolve_timeout(signal, &self.exporter_config);
        let retry_policy = self.tonic_config.retry_policy.unwrap_or_default();
        retry_policy.validate()?;

        let compression = resolve_compression(signal, self.tonic_config.compression)
            .map(|compression| match compression {
                Compression::Gzip => CompressionEncoding::Gzip,
            });

        let metadata = build_metadata(resolve_headers(signal, &self.tonic_config.headers));

        let channel = match self.tonic_config.channel {
            Some(channel) => channel,
            None => {
                let endpoint = self
                    .exporter_config
                    .endpoint
                    .or_else(|| env_or_general(signal.endpoint_var, OTEL_EXPORTER_OTLP_ENDPOINT))
                    .unwrap_or_else(|| OTEL_EXPORTER_OTLP_GRPC_ENDPOINT_DEFAULT.to_string());
                build_channel(&endpoint, self.tonic_config.tls.resolve_env(signal))?
            }
        };

        Ok(TonicClientParts {
            channel,
            metadata,
            compression,
            timeout,
            retry_policy,
            handle,
        })
    }
}

fn build_metadata(headers: Vec<(String, String)>) -> MetadataMap {
    let mut metadata = MetadataMap::new();
    metadata.insert(
        "user-agent",
        MetadataValue::from_static(concat!("OTel-OTLP-Exporter-Rust/", env!("CARGO_PKG_VERSION"))),
    );
    for (key, value) in headers {
        let parsed_key = MetadataKey::from_str(key.to_lowercase().as_str());
        let parsed_value = MetadataValue::from_str(&value);
        match (parsed_key, parsed_value) {
            (Ok(key), Ok(value)) => {
                metadata.insert(key, value);
            }
            _ => {
                otel_warn!(
                    name: "TonicExporter.InvalidHeader",
                    header = key.as_str(),
                    message = "header name or value is not valid gRPC metadata, entry skipped"
                );
            }
        }
    }
    metadata
}

/// TLS applies when the scheme is `https` or certificate files are
/// configured, unless `insecure` was requested.
fn build_channel(endpoint: &str, tls: TlsOptions) -> Result<Channel, ExporterBuildError> {
    let mut builder = Channel::from_shared(endpoint.to_string())
        .map_err(|err| ExporterBuildError::InvalidUri(endpoint.to_string(), err.to_string()))?;

    let https = endpoint.starts_with("https://");
    if (https || tls.wants_tls()) && !tls.insecure {
        let mut tls_config = ClientTlsConfig::new().with_native_roots();
        if let Some(ca_file) = &tls.ca_file {
            tls_config = tls_config.ca_certificate(Certificate::from_pem(read_pem(ca_file)?));
        }
        if let (Some(cert_file), Some(key_file)) =
            (&tls.client_certificate_file, &tls.client_key_file)
        {
            tls_config =
                tls_config.identity(Identity::from_pem(read_pem(cert_file)?, read_pem(key_file)?));
        }
        builder = builder
            .tls_config(tls_config)
            .map_err(|err| ExporterBuildError::InvalidTlsConfig(err.to_string()))?;
    }

    Ok(builder.connect_lazy())
}

/// Errors an export RPC can end in.
#[derive(Debug)]
pub(crate) enum GrpcExportError {
    /// The server answered with a non-OK status.
    Status(tonic::Status),
    /// The configured deadline expired before an answer arrived.
    Deadline(Duration),
}

impl fmt::Display for GrpcExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrpcExportError::Status(status) => write!(f, "export failed: {status}"),
            GrpcExportError::Deadline(timeout) => {
                write!(f, "export deadline of {timeout:?} exceeded")
            }
        }
    }
}

/// Only backpressure and unavailability are worth repeating; deadline
/// expiry is not.
pub(crate) fn classify_grpc_error(err: &GrpcExportError) -> RetryErrorType {
    match err {
        GrpcExportError::Status(status) => match status.code() {
            tonic::Code::ResourceExhausted | tonic::Code::Unavailable => RetryErrorType::Retryable,
            _ => RetryErrorType::NonRetryable,
        },
        GrpcExportError::Deadline(_) => RetryErrorType::NonRetryable,
    }
}

/// Counts exports in flight so `force_flush` can await quiescence.
#[derive(Debug, Default)]
pub(crate) struct InFlight(AtomicUsize);

impl InFlight {
    pub(crate) fn begin(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn end(&self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }

    /// Busy-wait (with small sleeps) until in-flight exports drain or the
    /// bound expires.
    pub(crate) fn wait(&self, timeout: Duration) -> otel_sdk::SdkResult {
        let deadline = Instant::now() + timeout;
        while self.0.load(Ordering::SeqCst) > 0 {
            if Instant::now() >= deadline {
                return Err(otel_sdk::SdkError::Timeout(timeout));
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exporter::WithExportConfig as _;

    #[test]
    fn classification_follows_the_status_code() {
        let retryable = GrpcExportError::Status(tonic::Status::unavailable("try later"));
        assert_eq!(classify_grpc_error(&retryable), RetryErrorType::Retryable);

        let retryable = GrpcExportError::Status(tonic::Status::resource_exhausted("slow down"));
        assert_eq!(classify_grpc_error(&retryable), RetryErrorType::Retryable);

        let permanent = GrpcExportError::Status(tonic::Status::invalid_argument("bad payload"));
        assert_eq!(classify_grpc_error(&permanent), RetryErrorType::NonRetryable);

        let deadline = GrpcExportError::Deadline(Duration::from_secs(10));
        assert_eq!(classify_grpc_error(&deadline), RetryErrorType::NonRetryable);
    }

    #[test]
    fn metadata_keeps_valid_headers_and_user_agent() {
        let metadata = build_metadata(vec![
            ("api-key".to_string(), "secret".to_string()),
            ("BAD KEY".to_string(), "value".to_string()),
        ]);
        assert!(metadata.get("user-agent").is_some());
        assert_eq!(metadata.get("api-key").unwrap(), "secret");
        assert_eq!(metadata.len(), 2);
    }

    #[tokio::test]
    async fn invalid_endpoint_is_a_build_error() {
        let result = TonicExporterBuilder::default()
            .with_endpoint("invalid uri")
            .build_parts(crate::exporter::TRACES_SIGNAL);
        assert!(matches!(result, Err(ExporterBuildError::InvalidUri(..))));
    }

    #[test]
    fn missing_runtime_is_a_build_error() {
        let result = TonicExporterBuilder::default().build_parts(crate::exporter::TRACES_SIGNAL);
        assert!(matches!(result, Err(ExporterBuildError::NoTokioRuntime(_))));
    }

    #[tokio::test]
    async fn missing_certificate_file_is_a_build_error() {
        let result = TonicExporterBuilder::default()
            .with_ca_file("/definitely/not/a/file.pem")
            .build_parts(crate::exporter::TRACES_SIGNAL);
        assert!(matches!(result, Err(ExporterBuildError::ReadFile(..))));
    }
}
