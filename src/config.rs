//! Configuration types for the telemetry pipeline.
//!
//! These types are designed to be deserialised from multiple sources using
//! figment, supporting layered configuration from defaults, files, and
//! environment variables. [`Endpoints::from_env`] is the plain loader used
//! when no layering is wanted.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Environment variable holding the trace collector URL.
pub const TRACE_ENDPOINT_VAR: &str = "TEMPO_URL";

/// Environment variable holding the log collector URL.
pub const LOG_ENDPOINT_VAR: &str = "LOKI_URL";

/// OTLP export protocol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// gRPC protocol (default port 4317).
    Grpc,
    /// HTTP with Protocol Buffers encoding (default port 4318).
    #[default]
    #[serde(alias = "http_binary", alias = "http-binary")]
    HttpBinary,
    /// HTTP with JSON encoding (default port 4318).
    #[serde(alias = "http_json", alias = "http-json")]
    HttpJson,
}

impl Protocol {
    /// Parses the values accepted by `OTEL_EXPORTER_OTLP_PROTOCOL`.
    ///
    /// Unknown values fall back to HTTP/protobuf.
    #[must_use]
    pub fn from_otel_env(value: &str) -> Self {
        match value {
            "grpc" => Protocol::Grpc,
            "http/json" => Protocol::HttpJson,
            _ => Protocol::HttpBinary,
        }
    }

    pub(crate) fn as_config_str(&self) -> &'static str {
        match self {
            Protocol::Grpc => "grpc",
            Protocol::HttpBinary => "httpbinary",
            Protocol::HttpJson => "httpjson",
        }
    }
}

/// Collector endpoints for each exported signal.
///
/// An absent endpoint is not an error: the exporter falls back to its own
/// default target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    /// Trace collector URL, e.g. `http://collector:4318/v1/traces`.
    pub traces: Option<String>,

    /// Log collector URL, e.g. `http://collector:4318/v1/logs`.
    pub logs: Option<String>,
}

impl Endpoints {
    /// Reads [`TRACE_ENDPOINT_VAR`] and [`LOG_ENDPOINT_VAR`] from the process
    /// environment. Never fails and performs no validation.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            traces: std::env::var(TRACE_ENDPOINT_VAR).ok(),
            logs: std::env::var(LOG_ENDPOINT_VAR).ok(),
        }
    }

    /// Iterates over the configured URLs.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.traces.iter().chain(self.logs.iter()).map(String::as_str)
    }
}

/// Complete telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Per-signal collector endpoints.
    pub endpoints: Endpoints,

    /// Export protocol shared by both exporters.
    pub protocol: Protocol,

    /// Export request timeout.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Headers sent with every export request.
    pub headers: HashMap<String, String>,

    /// Resource configuration.
    pub resource: ResourceConfig,

    /// Batch settings for the span processor.
    pub traces: BatchConfig,

    /// Batch settings for the log processor.
    pub logs: BatchConfig,

    /// Whether to install the `tracing` subscriber and bridges.
    pub init_tracing_subscriber: bool,

    /// Name for the instrumentation scope used by the `tracing` bridge.
    /// Defaults to `service_name` if set, otherwise the crate name.
    pub instrumentation_scope_name: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            endpoints: Endpoints::default(),
            protocol: Protocol::default(),
            timeout: Duration::from_secs(10),
            headers: HashMap::new(),
            resource: ResourceConfig::default(),
            traces: BatchConfig::default(),
            logs: BatchConfig::default(),
            init_tracing_subscriber: true,
            instrumentation_scope_name: None,
        }
    }
}

impl TelemetryConfig {
    /// Default configuration with endpoints taken from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            endpoints: Endpoints::from_env(),
            ..Default::default()
        }
    }

    pub(crate) fn scope_name(&self) -> String {
        self.instrumentation_scope_name
            .clone()
            .or_else(|| self.resource.service_name.clone())
            .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string())
    }
}

/// Resource configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    /// Service name.
    pub service_name: Option<String>,

    /// Service version.
    pub service_version: Option<String>,

    /// Additional resource attributes.
    pub attributes: HashMap<String, String>,

    /// Run host, OS, process and runtime detectors.
    pub detect: bool,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            service_name: None,
            service_version: None,
            attributes: HashMap::new(),
            detect: true,
        }
    }
}

/// Batch exporter configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Maximum queue size.
    pub max_queue_size: usize,

    /// Maximum batch size for export.
    pub max_export_batch_size: usize,

    /// Scheduled delay between exports.
    #[serde(with = "humantime_serde")]
    pub scheduled_delay: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 2048,
            max_export_batch_size: 512,
            scheduled_delay: Duration::from_secs(5),
        }
    }
}
