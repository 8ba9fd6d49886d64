//! The HTTP/protobuf transport.
//!
//! POSTs binary protobuf payloads to `{endpoint}/v1/{signal}` with
//! `Content-Type: application/x-protobuf`, optionally gzip-compressed.
//! Endpoint normalization assumes `http://` when the scheme is absent,
//! port 4318 when none is given, and appends the signal path when the
//! endpoint has none.

use crate::exporter::tonic::InFlight;
use crate::exporter::{
    env_or_general, read_pem, resolve_compression, resolve_headers, resolve_timeout, Compression,
    ExportConfig, HasExportConfig, Signal, TlsOptions, OTEL_EXPORTER_OTLP_ENDPOINT,
    OTEL_EXPORTER_OTLP_HTTP_ENDPOINT_DEFAULT,
};
use crate::retry::{retry_with_backoff, CancelToken, RetryErrorType, RetryPolicy};
use crate::{ExporterBuildError, DEFAULT_FORCE_FLUSH_TIMEOUT};
use futures_util::future::BoxFuture;
use http::{HeaderMap, HeaderName, HeaderValue};
use otel::{otel_debug, otel_warn};
use otel_sdk::{SdkError, SdkResult};
use prost::Message;
use std::fmt;
use std::io::Write;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub(crate) mod logs;
pub(crate) mod metrics;
pub(crate) mod trace;

/// Configuration for the HTTP transport.
#[derive(Debug, Default)]
pub struct HttpConfig {
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) compression: Option<Compression>,
    pub(crate) tls: TlsOptions,
    pub(crate) retry_policy: Option<RetryPolicy>,
}

/// Configuration for the HTTP/protobuf OTLP exporters.
///
/// ```no_run
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// # let runtime = tokio::runtime::Runtime::new()?;
/// # let _guard = runtime.enter();
/// use otel_otlp::WithExportConfig;
///
/// let exporter = otel_otlp::LogExporter::builder()
///     .with_http()
///     .with_endpoint("http://collector:4318")
///     .build()?;
/// # drop(exporter);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct HttpExporterBuilder {
    pub(crate) exporter_config: ExportConfig,
    pub(crate) http_config: HttpConfig,
}

impl HasExportConfig for HttpExporterBuilder {
    fn export_config(&mut self) -> &mut ExportConfig {
        &mut self.exporter_config
    }
}

/// Access to the HTTP config within exporter builders.
pub trait HasHttpConfig {
    /// Return a mutable reference to the HTTP config within the builder.
    fn http_config(&mut self) -> &mut HttpConfig;
}

impl HasHttpConfig for HttpExporterBuilder {
    fn http_config(&mut self) -> &mut HttpConfig {
        &mut self.http_config
    }
}

/// Transport options of the HTTP exporters, implemented for every builder
/// with a [`HasHttpConfig`].
pub trait WithHttpConfig {
    /// Append a header to every request.
    fn with_header<K: Into<String>, V: Into<String>>(self, key: K, value: V) -> Self;

    /// Compress request bodies with the given algorithm.
    fn with_compression(self, compression: Compression) -> Self;

    /// Use the given CA certificate file to verify the collector.
    fn with_ca_file<T: Into<String>>(self, path: T) -> Self;

    /// Present the given client certificate/key files for mutual TLS.
    fn with_client_cert_files<C: Into<String>, K: Into<String>>(self, cert: C, key: K) -> Self;

    /// Replace the default retry policy.
    fn with_retry_policy(self, policy: RetryPolicy) -> Self;
}

impl<B: HasHttpConfig> WithHttpConfig for B {
    fn with_header<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.http_config().headers.push((key.into(), value.into()));
        self
    }

    fn with_compression(mut self, compression: Compression) -> Self {
        self.http_config().compression = Some(compression);
        self
    }

    fn with_ca_file<T: Into<String>>(mut self, path: T) -> Self {
        self.http_config().tls.ca_file = Some(path.into());
        self
    }

    fn with_client_cert_files<C: Into<String>, K: Into<String>>(mut self, cert: C, key: K) -> Self {
        let config = self.http_config();
        config.tls.client_certificate_file = Some(cert.into());
        config.tls.client_key_file = Some(key.into());
        self
    }

    fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.http_config().retry_policy = Some(policy);
        self
    }
}

impl HttpExporterBuilder {
    pub(crate) fn build_client(self, signal: Signal) -> Result<OtlpHttpClient, ExporterBuildError> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|err| ExporterBuildError::NoTokioRuntime(err.to_string()))?;

        let timeout = resolve_timeout(signal, &self.exporter_config);
        let retry_policy = self.http_config.retry_policy.unwrap_or_default();
        retry_policy.validate()?;
        let compression = resolve_compression(signal, self.http_config.compression);
        let endpoint = resolve_http_endpoint(signal, self.exporter_config.endpoint)?;
        let headers = build_header_map(resolve_headers(signal, &self.http_config.headers));

        let tls = self.http_config.tls.resolve_env(signal);
        let mut builder = reqwest::Client::builder();
        if let Some(ca_file) = &tls.ca_file {
            let certificate = reqwest::Certificate::from_pem(&read_pem(ca_file)?)
                .map_err(|err| ExporterBuildError::InvalidTlsConfig(err.to_string()))?;
            builder = builder.add_root_certificate(certificate);
        }
        if let (Some(cert_file), Some(key_file)) =
            (&tls.client_certificate_file, &tls.client_key_file)
        {
            let mut pem = read_pem(cert_file)?;
            pem.extend(read_pem(key_file)?);
            let identity = reqwest::Identity::from_pem(&pem)
                .map_err(|err| ExporterBuildError::InvalidTlsConfig(err.to_string()))?;
            builder = builder.identity(identity);
        }
        let client = builder
            .build()
            .map_err(|err| ExporterBuildError::HttpClient(err.to_string()))?;

        Ok(OtlpHttpClient {
            client,
            endpoint,
            headers,
            compression,
            timeout,
            retry_policy,
            handle,
            cancel: Arc::new(CancelToken::default()),
            in_flight: Arc::new(InFlight::default()),
        })
    }
}

/// Endpoint resolution: programmatic > per-signal env > general env >
/// default, then normalization.
fn resolve_http_endpoint(
    signal: Signal,
    configured: Option<String>,
) -> Result<String, ExporterBuildError> {
    let raw = configured
        .or_else(|| env_or_general(signal.endpoint_var, OTEL_EXPORTER_OTLP_ENDPOINT))
        .unwrap_or_else(|| OTEL_EXPORTER_OTLP_HTTP_ENDPOINT_DEFAULT.to_string());
    normalize_endpoint(&raw, signal.http_path)
}

fn normalize_endpoint(raw: &str, signal_path: &str) -> Result<String, ExporterBuildError> {
    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{raw}")
    };

    let uri: http::Uri = with_scheme
        .parse()
        .map_err(|err: http::uri::InvalidUri| {
            ExporterBuildError::InvalidUri(raw.to_string(), err.to_string())
        })?;

    let scheme = uri.scheme_str().unwrap_or("http");
    let host = uri
        .host()
        .ok_or_else(|| ExporterBuildError::InvalidUri(raw.to_string(), "missing host".into()))?;
    let port = uri.port_u16().unwrap_or(4318);
    let path = match uri.path() {
        "" | "/" => signal_path.to_string(),
        path => path.to_string(),
    };

    Ok(format!("{scheme}://{host}:{port}{path}"))
}

fn build_header_map(headers: Vec<(String, String)>) -> HeaderMap {
    let mut map = HeaderMap::new();
    map.insert(
        http::header::USER_AGENT,
        HeaderValue::from_static(concat!("OTel-OTLP-Exporter-Rust/", env!("CARGO_PKG_VERSION"))),
    );
    for (key, value) in headers {
        match (
            HeaderName::from_str(key.to_lowercase().as_str()),
            HeaderValue::from_str(&value),
        ) {
            (Ok(key), Ok(value)) => {
                map.insert(key, value);
            }
            _ => {
                otel_warn!(
                    name: "HttpExporter.InvalidHeader",
                    header = key.as_str(),
                    message = "header name or value is not valid HTTP, entry skipped"
                );
            }
        }
    }
    map
}

/// Errors an export POST can end in.
#[derive(Debug)]
pub(crate) enum HttpExportError {
    /// The server answered with a non-success status.
    Status(u16),
    /// The request never completed; the flag says whether it is worth
    /// repeating (connection-level failures are, protocol errors are not).
    Request(String, bool),
    /// The configured deadline expired.
    Deadline(Duration),
}

impl fmt::Display for HttpExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpExportError::Status(code) => write!(f, "export failed with HTTP status {code}"),
            HttpExportError::Request(err, _) => write!(f, "export request failed: {err}"),
            HttpExportError::Deadline(timeout) => {
                write!(f, "export deadline of {timeout:?} exceeded")
            }
        }
    }
}

pub(crate) fn classify_http_error(err: &HttpExportError) -> RetryErrorType {
    match err {
        // resource exhausted / service unavailable
        HttpExportError::Status(429) | HttpExportError::Status(503) => RetryErrorType::Retryable,
        HttpExportError::Status(_) => RetryErrorType::NonRetryable,
        HttpExportError::Request(_, retryable) => {
            if *retryable {
                RetryErrorType::Retryable
            } else {
                RetryErrorType::NonRetryable
            }
        }
        HttpExportError::Deadline(_) => RetryErrorType::NonRetryable,
    }
}

/// A configured HTTP client bound to one signal endpoint.
pub(crate) struct OtlpHttpClient {
    client: reqwest::Client,
    endpoint: String,
    headers: HeaderMap,
    compression: Option<Compression>,
    timeout: Duration,
    retry_policy: RetryPolicy,
    handle: tokio::runtime::Handle,
    cancel: Arc<CancelToken>,
    in_flight: Arc<InFlight>,
}

impl fmt::Debug for OtlpHttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OtlpHttpClient")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl OtlpHttpClient {
    /// Serialize a request message, compressing when configured.
    pub(crate) fn build_body<M: Message>(&self, message: &M) -> Result<(Vec<u8>, bool), SdkError> {
        let body = message.encode_to_vec();
        match self.compression {
            Some(Compression::Gzip) => {
                let mut encoder =
                    flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
                encoder
                    .write_all(&body)
                    .and_then(|_| encoder.finish())
                    .map(|compressed| (compressed, true))
                    .map_err(|err| SdkError::InternalFailure(format!("gzip failed: {err}")))
            }
            None => Ok((body, false)),
        }
    }

    /// POST one payload with retries, driven on the captured runtime.
    pub(crate) fn send(
        &self,
        body: Vec<u8>,
        gzipped: bool,
        operation_name: &'static str,
    ) -> BoxFuture<'static, SdkResult> {
        if self.cancel.is_cancelled() {
            return Box::pin(futures_util::future::ready(Err(SdkError::AlreadyShutdown)));
        }

        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        let headers = self.headers.clone();
        let timeout = self.timeout;
        let retry_policy = self.retry_policy.clone();
        let cancel = self.cancel.clone();
        let in_flight = self.in_flight.clone();

        in_flight.begin();
        let task = self.handle.spawn(async move {
            let result = retry_with_backoff(
                retry_policy,
                &cancel,
                classify_http_error,
                operation_name,
                || {
                    let mut request = client
                        .post(&endpoint)
                        .headers(headers.clone())
                        .header(http::header::CONTENT_TYPE, "application/x-protobuf")
                        .body(body.clone());
                    if gzipped {
                        request = request.header(http::header::CONTENT_ENCODING, "gzip");
                    }
                    async move {
                        match tokio::time::timeout(timeout, request.send()).await {
                            Ok(Ok(response)) => {
                                let status = response.status();
                                if status.is_success() {
                                    Ok(())
                                } else {
                                    Err(HttpExportError::Status(status.as_u16()))
                                }
                            }
                            Ok(Err(err)) => {
                                Err(HttpExportError::Request(err.to_string(), err.is_connect()))
                            }
                            Err(_elapsed) => Err(HttpExportError::Deadline(timeout)),
                        }
                    }
                },
            )
            .await;
            in_flight.end();

            match result {
                Ok(()) => {
                    otel_debug!(name: "OtlpHttpClient.ExportSucceeded");
                    Ok(())
                }
                Err(err) => Err(SdkError::InternalFailure(err.to_string())),
            }
        });

        Box::pin(async move {
            task.await.unwrap_or_else(|err| {
                Err(SdkError::InternalFailure(format!("export task failed: {err}")))
            })
        })
    }

    pub(crate) fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn force_flush(&self) -> SdkResult {
        self.in_flight.wait(DEFAULT_FORCE_FLUSH_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exporter::{LOGS_SIGNAL, METRICS_SIGNAL, TRACES_SIGNAL};

    #[test]
    fn endpoint_normalization() {
        // path appended when absent
        assert_eq!(
            normalize_endpoint("http://collector:4318", "/v1/traces").unwrap(),
            "http://collector:4318/v1/traces"
        );
        // scheme defaults to http
        assert_eq!(
            normalize_endpoint("collector:9999", "/v1/logs").unwrap(),
            "http://collector:9999/v1/logs"
        );
        // port defaults to 4318
        assert_eq!(
            normalize_endpoint("https://collector", "/v1/metrics").unwrap(),
            "https://collector:4318/v1/metrics"
        );
        // an explicit path is kept verbatim
        assert_eq!(
            normalize_endpoint("http://collector:4318/custom/traces", "/v1/traces").unwrap(),
            "http://collector:4318/custom/traces"
        );
        assert!(normalize_endpoint("http://", "/v1/traces").is_err());
    }

    #[test]
    fn per_signal_endpoint_resolution() {
        temp_env::with_vars(
            [
                ("OTEL_EXPORTER_OTLP_ENDPOINT", Some("http://general:4318")),
                (
                    "OTEL_EXPORTER_OTLP_TRACES_ENDPOINT",
                    Some("http://traces:4318/v1/traces"),
                ),
            ],
            || {
                assert_eq!(
                    resolve_http_endpoint(TRACES_SIGNAL, None).unwrap(),
                    "http://traces:4318/v1/traces"
                );
                assert_eq!(
                    resolve_http_endpoint(METRICS_SIGNAL, None).unwrap(),
                    "http://general:4318/v1/metrics"
                );
            },
        );
        temp_env::with_vars_unset(
            ["OTEL_EXPORTER_OTLP_ENDPOINT", "OTEL_EXPORTER_OTLP_LOGS_ENDPOINT"],
            || {
                assert_eq!(
                    resolve_http_endpoint(LOGS_SIGNAL, None).unwrap(),
                    "http://localhost:4318/v1/logs"
                );
            },
        );
    }

    #[test]
    fn http_classification() {
        assert_eq!(
            classify_http_error(&HttpExportError::Status(429)),
            RetryErrorType::Retryable
        );
        assert_eq!(
            classify_http_error(&HttpExportError::Status(503)),
            RetryErrorType::Retryable
        );
        assert_eq!(
            classify_http_error(&HttpExportError::Status(400)),
            RetryErrorType::NonRetryable
        );
        assert_eq!(
            classify_http_error(&HttpExportError::Status(403)),
            RetryErrorType::NonRetryable
        );
        assert_eq!(
            classify_http_error(&HttpExportError::Deadline(Duration::from_secs(1))),
            RetryErrorType::NonRetryable
        );
        assert_eq!(
            classify_http_error(&HttpExportError::Request("reset".into(), true)),
            RetryErrorType::Retryable
        );
    }
}
