//! OTLP exporter builders and shared configuration.
//!
//! Configuration resolves with the precedence: explicit programmatic
//! value, per-signal environment variable, general environment variable,
//! built-in default.

use crate::ExporterBuildError;
use percent_encoding::percent_decode_str;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub(crate) mod http;
pub(crate) mod tonic;

pub use self::http::{HasHttpConfig, HttpConfig, HttpExporterBuilder, WithHttpConfig};
pub use self::tonic::{HasTonicConfig, TonicConfig, TonicExporterBuilder, WithTonicConfig};

/// Default target for gRPC exporters.
pub(crate) const OTEL_EXPORTER_OTLP_GRPC_ENDPOINT_DEFAULT: &str = "http://localhost:4317";
/// Default target for HTTP/protobuf exporters.
pub(crate) const OTEL_EXPORTER_OTLP_HTTP_ENDPOINT_DEFAULT: &str = "http://localhost:4318";
/// Default max waiting time for the backend to process each batch.
pub(crate) const OTEL_EXPORTER_OTLP_TIMEOUT_DEFAULT: u64 = 10_000;

/// Target to which the exporters send telemetry for all signals.
pub const OTEL_EXPORTER_OTLP_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
/// The transport protocol used for all signals, `grpc` or `http/protobuf`.
pub const OTEL_EXPORTER_OTLP_PROTOCOL: &str = "OTEL_EXPORTER_OTLP_PROTOCOL";
/// `k=v,...` pairs injected into every request, URL-decoded.
pub const OTEL_EXPORTER_OTLP_HEADERS: &str = "OTEL_EXPORTER_OTLP_HEADERS";
/// Compression for request payloads, `gzip` or unset.
pub const OTEL_EXPORTER_OTLP_COMPRESSION: &str = "OTEL_EXPORTER_OTLP_COMPRESSION";
/// Max waiting time in milliseconds for the backend to process each batch.
pub const OTEL_EXPORTER_OTLP_TIMEOUT: &str = "OTEL_EXPORTER_OTLP_TIMEOUT";
/// Path to the CA certificate file used to verify the collector.
pub const OTEL_EXPORTER_OTLP_CERTIFICATE: &str = "OTEL_EXPORTER_OTLP_CERTIFICATE";
/// Path to the client certificate file for mutual TLS.
pub const OTEL_EXPORTER_OTLP_CLIENT_CERTIFICATE: &str = "OTEL_EXPORTER_OTLP_CLIENT_CERTIFICATE";
/// Path to the client key file for mutual TLS.
pub const OTEL_EXPORTER_OTLP_CLIENT_KEY: &str = "OTEL_EXPORTER_OTLP_CLIENT_KEY";

/// The environment variables of one signal, consulted before the general
/// `OTEL_EXPORTER_OTLP_*` set.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Signal {
    pub(crate) endpoint_var: &'static str,
    pub(crate) protocol_var: &'static str,
    pub(crate) headers_var: &'static str,
    pub(crate) compression_var: &'static str,
    pub(crate) timeout_var: &'static str,
    pub(crate) certificate_var: &'static str,
    pub(crate) client_certificate_var: &'static str,
    pub(crate) client_key_var: &'static str,
    pub(crate) http_path: &'static str,
}

pub(crate) const TRACES_SIGNAL: Signal = Signal {
    endpoint_var: "OTEL_EXPORTER_OTLP_TRACES_ENDPOINT",
    protocol_var: "OTEL_EXPORTER_OTLP_TRACES_PROTOCOL",
    headers_var: "OTEL_EXPORTER_OTLP_TRACES_HEADERS",
    compression_var: "OTEL_EXPORTER_OTLP_TRACES_COMPRESSION",
    timeout_var: "OTEL_EXPORTER_OTLP_TRACES_TIMEOUT",
    certificate_var: "OTEL_EXPORTER_OTLP_TRACES_CERTIFICATE",
    client_certificate_var: "OTEL_EXPORTER_OTLP_TRACES_CLIENT_CERTIFICATE",
    client_key_var: "OTEL_EXPORTER_OTLP_TRACES_CLIENT_KEY",
    http_path: "/v1/traces",
};

pub(crate) const METRICS_SIGNAL: Signal = Signal {
    endpoint_var: "OTEL_EXPORTER_OTLP_METRICS_ENDPOINT",
    protocol_var: "OTEL_EXPORTER_OTLP_METRICS_PROTOCOL",
    headers_var: "OTEL_EXPORTER_OTLP_METRICS_HEADERS",
    compression_var: "OTEL_EXPORTER_OTLP_METRICS_COMPRESSION",
    timeout_var: "OTEL_EXPORTER_OTLP_METRICS_TIMEOUT",
    certificate_var: "OTEL_EXPORTER_OTLP_METRICS_CERTIFICATE",
    client_certificate_var: "OTEL_EXPORTER_OTLP_METRICS_CLIENT_CERTIFICATE",
    client_key_var: "OTEL_EXPORTER_OTLP_METRICS_CLIENT_KEY",
    http_path: "/v1/metrics",
};

pub(crate) const LOGS_SIGNAL: Signal = Signal {
    endpoint_var: "OTEL_EXPORTER_OTLP_LOGS_ENDPOINT",
    protocol_var: "OTEL_EXPORTER_OTLP_LOGS_PROTOCOL",
    headers_var: "OTEL_EXPORTER_OTLP_LOGS_HEADERS",
    compression_var: "OTEL_EXPORTER_OTLP_LOGS_COMPRESSION",
    timeout_var: "OTEL_EXPORTER_OTLP_LOGS_TIMEOUT",
    certificate_var: "OTEL_EXPORTER_OTLP_LOGS_CERTIFICATE",
    client_certificate_var: "OTEL_EXPORTER_OTLP_LOGS_CLIENT_CERTIFICATE",
    client_key_var: "OTEL_EXPORTER_OTLP_LOGS_CLIENT_KEY",
    http_path: "/v1/logs",
};

/// The transport to talk to the collector with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Protocol {
    /// OTLP over gRPC, default port 4317.
    Grpc,
    /// OTLP over HTTP with binary protobuf payloads, default port 4318.
    HttpBinary,
}

impl FromStr for Protocol {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "grpc" => Ok(Protocol::Grpc),
            "http/protobuf" => Ok(Protocol::HttpBinary),
            _ => Err(()),
        }
    }
}

/// The compression applied to request payloads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Compression {
    /// gzip
    Gzip,
}

impl FromStr for Compression {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "gzip" => Ok(Compression::Gzip),
            _ => Err(()),
        }
    }
}

/// Configuration shared by every transport.
#[derive(Debug, Default)]
pub struct ExportConfig {
    /// The address of the OTLP collector; falls back to the environment,
    /// then the transport default.
    pub endpoint: Option<String>,

    /// The per-call deadline; falls back to `OTEL_EXPORTER_OTLP_TIMEOUT`,
    /// then 10s.
    pub timeout: Option<Duration>,

    /// The protocol to use; informational on transport-specific builders.
    pub protocol: Option<Protocol>,
}

/// Access to the export config field within the exporter builders.
pub trait HasExportConfig {
    /// Return a mutable reference to the export config within the builder.
    fn export_config(&mut self) -> &mut ExportConfig;
}

/// Expose methods to override the export configuration, implemented for
/// every builder with a [`HasExportConfig`].
pub trait WithExportConfig {
    /// Set the address of the OTLP collector.
    fn with_endpoint<T: Into<String>>(self, endpoint: T) -> Self;
    /// Set the per-call deadline.
    fn with_timeout(self, timeout: Duration) -> Self;
    /// Set the whole export config at once.
    fn with_export_config(self, export_config: ExportConfig) -> Self;
}

impl<B: HasExportConfig> WithExportConfig for B {
    fn with_endpoint<T: Into<String>>(mut self, endpoint: T) -> Self {
        self.export_config().endpoint = Some(endpoint.into());
        self
    }

    fn with_timeout(mut self, timeout: Duration) -> Self {
        self.export_config().timeout = Some(timeout);
        self
    }

    fn with_export_config(mut self, export_config: ExportConfig) -> Self {
        *self.export_config() = export_config;
        self
    }
}

/// First non-empty of the signal-specific and general variables.
pub(crate) fn env_or_general(signal_var: &str, general_var: &str) -> Option<String> {
    env::var(signal_var)
        .ok()
        .filter(|value| !value.is_empty())
        .or_else(|| env::var(general_var).ok().filter(|value| !value.is_empty()))
}

/// The per-call deadline: programmatic > per-signal env > general env >
/// 10s.
pub(crate) fn resolve_timeout(signal: Signal, config: &ExportConfig) -> Duration {
    config
        .timeout
        .or_else(|| {
            env_or_general(signal.timeout_var, OTEL_EXPORTER_OTLP_TIMEOUT)
                .and_then(|value| u64::from_str(&value).ok())
                .map(Duration::from_millis)
        })
        .unwrap_or(Duration::from_millis(OTEL_EXPORTER_OTLP_TIMEOUT_DEFAULT))
}

/// The protocol: per-signal env > general env > gRPC.
pub(crate) fn resolve_protocol(signal: Signal) -> Protocol {
    env_or_general(signal.protocol_var, OTEL_EXPORTER_OTLP_PROTOCOL)
        .and_then(|value| Protocol::from_str(&value).ok())
        .unwrap_or(Protocol::Grpc)
}

/// The compression: programmatic > per-signal env > general env > none.
pub(crate) fn resolve_compression(
    signal: Signal,
    configured: Option<Compression>,
) -> Option<Compression> {
    configured.or_else(|| {
        env_or_general(signal.compression_var, OTEL_EXPORTER_OTLP_COMPRESSION)
            .and_then(|value| Compression::from_str(&value).ok())
    })
}

/// Parse `k=v,k2=v2` header lists, URL-decoding both halves.
pub(crate) fn parse_header_string(value: &str) -> Vec<(String, String)> {
    value
        .split_terminator(',')
        .map(str::trim)
        .filter_map(parse_header_key_value_string)
        .collect()
}

fn parse_header_key_value_string(entry: &str) -> Option<(String, String)> {
    let (key, value) = entry.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    let value = percent_decode_str(value.trim())
        .decode_utf8()
        .ok()?
        .into_owned();
    Some((key.to_string(), value))
}

/// Headers for one signal: builder headers, then env headers (builder
/// wins on conflict because it is applied last).
pub(crate) fn resolve_headers(
    signal: Signal,
    configured: &[(String, String)],
) -> Vec<(String, String)> {
    let mut headers = env_or_general(signal.headers_var, OTEL_EXPORTER_OTLP_HEADERS)
        .map(|value| parse_header_string(&value))
        .unwrap_or_default();
    for (key, value) in configured {
        headers.retain(|(existing, _)| existing != key);
        headers.push((key.clone(), value.clone()));
    }
    headers
}

/// TLS material, resolved from builder values falling back to the
/// environment's file paths.
#[derive(Clone, Debug, Default)]
pub(crate) struct TlsOptions {
    pub(crate) ca_file: Option<String>,
    pub(crate) client_certificate_file: Option<String>,
    pub(crate) client_key_file: Option<String>,
    pub(crate) insecure: bool,
}

impl TlsOptions {
    pub(crate) fn resolve_env(mut self, signal: Signal) -> Self {
        self.ca_file = self
            .ca_file
            .or_else(|| env_or_general(signal.certificate_var, OTEL_EXPORTER_OTLP_CERTIFICATE));
        self.client_certificate_file = self.client_certificate_file.or_else(|| {
            env_or_general(
                signal.client_certificate_var,
                OTEL_EXPORTER_OTLP_CLIENT_CERTIFICATE,
            )
        });
        self.client_key_file = self
            .client_key_file
            .or_else(|| env_or_general(signal.client_key_var, OTEL_EXPORTER_OTLP_CLIENT_KEY));
        self
    }

    pub(crate) fn wants_tls(&self) -> bool {
        !self.insecure
            && (self.ca_file.is_some()
                || self.client_certificate_file.is_some()
                || self.client_key_file.is_some())
    }
}

pub(crate) fn read_pem(path: &str) -> Result<Vec<u8>, ExporterBuildError> {
    std::fs::read(path).map_err(|err| ExporterBuildError::ReadFile(path.to_string(), err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_parsing() {
        assert_eq!("grpc".parse(), Ok(Protocol::Grpc));
        assert_eq!("http/protobuf".parse(), Ok(Protocol::HttpBinary));
        assert!(Protocol::from_str("http/json").is_err());
    }

    #[test]
    fn header_parsing_decodes_and_skips_malformed() {
        let headers = parse_header_string("api-key=secret%20value, malformed, team=obs");
        assert_eq!(
            headers,
            vec![
                ("api-key".to_string(), "secret value".to_string()),
                ("team".to_string(), "obs".to_string()),
            ]
        );
    }

    #[test]
    fn per_signal_env_wins_over_general() {
        temp_env::with_vars(
            [
                ("OTEL_EXPORTER_OTLP_TIMEOUT", Some("5000")),
                ("OTEL_EXPORTER_OTLP_TRACES_TIMEOUT", Some("1000")),
            ],
            || {
                let timeout = resolve_timeout(TRACES_SIGNAL, &ExportConfig::default());
                assert_eq!(timeout, Duration::from_millis(1000));
                // other signals fall back to the general value
                let timeout = resolve_timeout(LOGS_SIGNAL, &ExportConfig::default());
                assert_eq!(timeout, Duration::from_millis(5000));
            },
        );
    }

    #[test]
    fn programmatic_timeout_wins_over_env() {
        temp_env::with_var("OTEL_EXPORTER_OTLP_TIMEOUT", Some("5000"), || {
            let config = ExportConfig {
                timeout: Some(Duration::from_millis(250)),
                ..Default::default()
            };
            assert_eq!(
                resolve_timeout(TRACES_SIGNAL, &config),
                Duration::from_millis(250)
            );
        });
    }

    #[test]
    fn protocol_resolution_defaults_to_grpc() {
        temp_env::with_vars_unset(
            ["OTEL_EXPORTER_OTLP_PROTOCOL", "OTEL_EXPORTER_OTLP_TRACES_PROTOCOL"],
            || {
                assert_eq!(resolve_protocol(TRACES_SIGNAL), Protocol::Grpc);
            },
        );
        temp_env::with_var("OTEL_EXPORTER_OTLP_PROTOCOL", Some("http/protobuf"), || {
            assert_eq!(resolve_protocol(METRICS_SIGNAL), Protocol::HttpBinary);
        });
    }

    #[test]
    fn builder_headers_override_env_headers() {
        temp_env::with_var("OTEL_EXPORTER_OTLP_HEADERS", Some("a=env,b=env"), || {
            let configured = vec![("a".to_string(), "builder".to_string())];
            let mut headers = resolve_headers(TRACES_SIGNAL, &configured);
            headers.sort();
            assert_eq!(
                headers,
                vec![
                    ("a".to_string(), "builder".to_string()),
                    ("b".to_string(), "env".to_string()),
                ]
            );
        });
    }
}
