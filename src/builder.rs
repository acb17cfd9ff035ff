//! Builder for telemetry configuration.
//!
//! The builder supports layered configuration from multiple sources:
//! 1. Compiled defaults
//! 2. Configuration files (TOML)
//! 3. Environment variables (`TEMPO_URL`/`LOKI_URL`, prefixed, or standard `OTEL_*`)
//! 4. Programmatic overrides
//!
//! Sources are merged in order, with later sources taking precedence.

use crate::backend::SdkBackend;
use crate::config::{LOG_ENDPOINT_VAR, Protocol, TRACE_ENDPOINT_VAR, TelemetryConfig};
use crate::error::TelemetryError;
use crate::lifecycle::Telemetry;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Builder for configuring and starting the telemetry pipeline.
///
/// # Example
///
/// ```no_run
/// use telemetry_lifecycle::{TelemetryBuilder, TelemetryError};
///
/// fn main() -> Result<(), TelemetryError> {
///     // Endpoints from TEMPO_URL and LOKI_URL, loaded from .env if present
///     let _telemetry = TelemetryBuilder::new()
///         .with_dotenv()
///         .with_env()
///         .build()?;
///
///     // Full configuration
///     let _telemetry = TelemetryBuilder::new()
///         .with_file("./telemetry.toml")
///         .with_standard_env()
///         .trace_endpoint("http://tempo:4318/v1/traces")
///         .log_endpoint("http://loki:3100/otlp/v1/logs")
///         .service_name("checkout")
///         .build()?;
///
///     Ok(())
/// }
/// ```
#[must_use = "builders do nothing unless .build() is called"]
pub struct TelemetryBuilder {
    figment: Figment,
    resource_attributes: HashMap<String, String>,
}

impl TelemetryBuilder {
    /// Creates a new builder with default configuration.
    ///
    /// Defaults include:
    /// - No endpoints (exporters use their own default targets)
    /// - Protocol: HTTP with protobuf encoding
    /// - Tracing subscriber initialisation enabled
    /// - Host, OS, process and runtime resource detection enabled
    pub fn new() -> Self {
        Self {
            figment: Figment::from(Serialized::defaults(TelemetryConfig::default())),
            resource_attributes: HashMap::new(),
        }
    }

    /// Creates a builder from an existing figment.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use figment::{Figment, providers::{Env, Format, Toml}};
    /// use telemetry_lifecycle::{TelemetryBuilder, TelemetryError};
    ///
    /// let figment = Figment::new()
    ///     .merge(Toml::file("/etc/telemetry-defaults.toml"))
    ///     .merge(Env::prefixed("TELEMETRY_").split("__"));
    ///
    /// let _telemetry = TelemetryBuilder::from_figment(figment)
    ///     .service_name("checkout")
    ///     .build()?;
    /// # Ok::<(), TelemetryError>(())
    /// ```
    pub fn from_figment(figment: Figment) -> Self {
        Self {
            figment,
            resource_attributes: HashMap::new(),
        }
    }

    /// Merges configuration from a TOML file.
    ///
    /// If the file doesn't exist, it's silently skipped.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        let path = path.as_ref();
        if path.exists() {
            self.figment = self.figment.merge(Toml::file(path));
        }
        self
    }

    /// Loads `.env` from the current directory (or its parents) into the
    /// process environment. A missing file is not an error.
    ///
    /// Only affects sources read afterwards, such as [`with_env`](Self::with_env).
    /// Variables already set in the environment are not overridden.
    pub fn with_dotenv(self) -> Self {
        load_dotenv(dotenvy::dotenv().map(|_| ()));
        self
    }

    /// Like [`with_dotenv`](Self::with_dotenv) but reads the given file.
    pub fn with_dotenv_file<P: AsRef<Path>>(self, path: P) -> Self {
        load_dotenv(dotenvy::from_path(path.as_ref()));
        self
    }

    /// Merges the collector endpoints from `TEMPO_URL` (traces) and
    /// `LOKI_URL` (logs). Unset variables leave earlier layers untouched.
    pub fn with_env(mut self) -> Self {
        if let Ok(url) = std::env::var(TRACE_ENDPOINT_VAR) {
            self.figment = self
                .figment
                .merge(Serialized::default("endpoints.traces", url));
        }

        if let Ok(url) = std::env::var(LOG_ENDPOINT_VAR) {
            self.figment = self
                .figment
                .merge(Serialized::default("endpoints.logs", url));
        }

        self
    }

    /// Merges configuration from environment variables with the given prefix.
    ///
    /// Nesting is expressed with a double underscore. For example, with
    /// prefix `TELEMETRY_`:
    /// - `TELEMETRY_PROTOCOL` → `protocol`
    /// - `TELEMETRY_ENDPOINTS__TRACES` → `endpoints.traces`
    /// - `TELEMETRY_RESOURCE__SERVICE_NAME` → `resource.service_name`
    /// - `TELEMETRY_TRACES__SCHEDULED_DELAY` → `traces.scheduled_delay`
    pub fn with_prefixed_env(mut self, prefix: &str) -> Self {
        self.figment = self.figment.merge(Env::prefixed(prefix).split("__"));
        self
    }

    /// Merges configuration from standard OpenTelemetry environment variables:
    /// - `OTEL_EXPORTER_OTLP_TRACES_ENDPOINT` → trace endpoint
    /// - `OTEL_EXPORTER_OTLP_LOGS_ENDPOINT` → log endpoint
    /// - `OTEL_EXPORTER_OTLP_PROTOCOL` → protocol (grpc, http/protobuf, http/json)
    /// - `OTEL_SERVICE_NAME` → service name
    pub fn with_standard_env(mut self) -> Self {
        if let Ok(url) = std::env::var("OTEL_EXPORTER_OTLP_TRACES_ENDPOINT") {
            self.figment = self
                .figment
                .merge(Serialized::default("endpoints.traces", url));
        }

        if let Ok(url) = std::env::var("OTEL_EXPORTER_OTLP_LOGS_ENDPOINT") {
            self.figment = self
                .figment
                .merge(Serialized::default("endpoints.logs", url));
        }

        if let Ok(protocol) = std::env::var("OTEL_EXPORTER_OTLP_PROTOCOL") {
            let protocol = Protocol::from_otel_env(&protocol);
            self.figment = self
                .figment
                .merge(Serialized::default("protocol", protocol.as_config_str()));
        }

        if let Ok(service_name) = std::env::var("OTEL_SERVICE_NAME") {
            self.figment = self
                .figment
                .merge(Serialized::default("resource.service_name", service_name));
        }

        self
    }

    /// Sets the trace collector URL.
    pub fn trace_endpoint(mut self, url: impl Into<String>) -> Self {
        self.figment = self
            .figment
            .merge(Serialized::default("endpoints.traces", url.into()));
        self
    }

    /// Sets the log collector URL.
    pub fn log_endpoint(mut self, url: impl Into<String>) -> Self {
        self.figment = self
            .figment
            .merge(Serialized::default("endpoints.logs", url.into()));
        self
    }

    /// Sets the export protocol for both exporters.
    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.figment = self
            .figment
            .merge(Serialized::default("protocol", protocol.as_config_str()));
        self
    }

    /// Sets the export request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.figment = self.figment.merge(Serialized::default(
            "timeout",
            humantime_serde::Serde::from(timeout),
        ));
        self
    }

    /// Adds a header to all export requests.
    ///
    /// Useful for authentication or tenant routing.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let header_key = format!("headers.{}", key.into());
        self.figment = self
            .figment
            .merge(Serialized::default(&header_key, value.into()));
        self
    }

    /// Sets the service name resource attribute.
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.figment = self
            .figment
            .merge(Serialized::default("resource.service_name", name.into()));
        self
    }

    /// Sets the service version resource attribute.
    pub fn service_version(mut self, version: impl Into<String>) -> Self {
        self.figment = self.figment.merge(Serialized::default(
            "resource.service_version",
            version.into(),
        ));
        self
    }

    /// Adds a resource attribute.
    ///
    /// Keys are kept verbatim, so dotted semantic-convention names such as
    /// `deployment.environment` work.
    pub fn resource_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.resource_attributes.insert(key.into(), value.into());
        self
    }

    /// Enables or disables automatic resource detection.
    ///
    /// Default: enabled
    pub fn detect_resources(mut self, enabled: bool) -> Self {
        self.figment = self
            .figment
            .merge(Serialized::default("resource.detect", enabled));
        self
    }

    /// Disables automatic tracing subscriber initialisation.
    ///
    /// By default, a `tracing-subscriber` is installed with
    /// `tracing-opentelemetry` and `opentelemetry-appender-tracing`
    /// integration. Disable this if you configure the subscriber yourself.
    pub fn without_tracing_subscriber(mut self) -> Self {
        self.figment = self
            .figment
            .merge(Serialized::default("init_tracing_subscriber", false));
        self
    }

    /// Sets the instrumentation scope name used by the `tracing` bridge.
    ///
    /// If not set, defaults to the service name, then the crate name.
    pub fn instrumentation_scope_name(mut self, name: impl Into<String>) -> Self {
        self.figment = self.figment.merge(Serialized::default(
            "instrumentation_scope_name",
            name.into(),
        ));
        self
    }

    /// Extracts the configuration for inspection or debugging.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration extraction fails. Endpoint URLs are
    /// not checked here; the exporters receive them verbatim.
    pub fn extract_config(&self) -> Result<TelemetryConfig, TelemetryError> {
        let mut config: TelemetryConfig = self
            .figment
            .extract()
            .map_err(|e| TelemetryError::Config(Box::new(e)))?;

        // Dotted keys would be split into nested tables by figment
        config
            .resource
            .attributes
            .extend(self.resource_attributes.clone());

        Ok(config)
    }

    /// Builds the exporters and starts the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration extraction fails
    /// - Exporter construction fails
    /// - Tracing subscriber initialisation fails
    pub fn build(self) -> Result<Telemetry<SdkBackend>, TelemetryError> {
        let config = self.extract_config()?;
        Telemetry::initialize(config)
    }
}

impl Default for TelemetryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn load_dotenv(result: Result<(), dotenvy::Error>) {
    match result {
        Ok(()) => {}
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(target: "otel_lifecycle", error = %e, "Failed to load .env file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::LifecycleState;
    use std::io::Write;

    #[test]
    fn test_builder_default() {
        let builder = TelemetryBuilder::new();
        let config = builder.extract_config().unwrap();

        assert_eq!(config.endpoints.traces, None);
        assert_eq!(config.endpoints.logs, None);
        assert!(config.init_tracing_subscriber);
        assert!(config.resource.detect);
        assert_eq!(config.protocol, Protocol::HttpBinary);
        assert_eq!(config.timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_builder_endpoints() {
        let builder = TelemetryBuilder::new()
            .trace_endpoint("http://tempo:4318/v1/traces")
            .log_endpoint("http://loki:3100/otlp/v1/logs");
        let config = builder.extract_config().unwrap();

        assert_eq!(
            config.endpoints.traces,
            Some("http://tempo:4318/v1/traces".to_string())
        );
        assert_eq!(
            config.endpoints.logs,
            Some("http://loki:3100/otlp/v1/logs".to_string())
        );
    }

    #[test]
    fn test_builder_protocol_and_timeout() {
        let builder = TelemetryBuilder::new()
            .protocol(Protocol::Grpc)
            .timeout(Duration::from_millis(2500));
        let config = builder.extract_config().unwrap();

        assert_eq!(config.protocol, Protocol::Grpc);
        assert_eq!(config.timeout, Duration::from_millis(2500));
    }

    #[test]
    fn test_builder_resource() {
        let builder = TelemetryBuilder::new()
            .service_name("checkout")
            .service_version("2.1.0")
            .resource_attribute("deployment.environment", "staging")
            .detect_resources(false);
        let config = builder.extract_config().unwrap();

        assert_eq!(config.resource.service_name, Some("checkout".to_string()));
        assert_eq!(config.resource.service_version, Some("2.1.0".to_string()));
        assert_eq!(
            config.resource.attributes.get("deployment.environment"),
            Some(&"staging".to_string())
        );
        assert!(!config.resource.detect);
    }

    #[test]
    fn test_builder_resource_attribute() {
        let builder = TelemetryBuilder::new().resource_attribute("team", "payments");
        let config = builder.extract_config().unwrap();

        assert_eq!(
            config.resource.attributes.get("team"),
            Some(&"payments".to_string())
        );
    }

    #[test]
    fn test_builder_header() {
        let builder = TelemetryBuilder::new().header("X-Scope-OrgID", "tenant-1");
        let config = builder.extract_config().unwrap();

        assert_eq!(
            config.headers.get("X-Scope-OrgID"),
            Some(&"tenant-1".to_string())
        );
    }

    #[test]
    fn test_builder_without_tracing_subscriber() {
        let builder = TelemetryBuilder::new().without_tracing_subscriber();
        let config = builder.extract_config().unwrap();

        assert!(!config.init_tracing_subscriber);
    }

    #[test]
    fn test_scope_name_falls_back_to_service_name() {
        let config = TelemetryBuilder::new()
            .service_name("checkout")
            .extract_config()
            .unwrap();
        assert_eq!(config.scope_name(), "checkout");

        let config = TelemetryBuilder::new()
            .service_name("checkout")
            .instrumentation_scope_name("checkout-http")
            .extract_config()
            .unwrap();
        assert_eq!(config.scope_name(), "checkout-http");
    }

    #[test]
    fn test_with_env_reads_tempo_and_loki_urls() {
        temp_env::with_vars(
            [
                (TRACE_ENDPOINT_VAR, Some("http://tempo:4318/v1/traces")),
                (LOG_ENDPOINT_VAR, Some("http://loki:3100/otlp/v1/logs")),
            ],
            || {
                let config = TelemetryBuilder::new().with_env().extract_config().unwrap();
                assert_eq!(
                    config.endpoints.traces,
                    Some("http://tempo:4318/v1/traces".to_string())
                );
                assert_eq!(
                    config.endpoints.logs,
                    Some("http://loki:3100/otlp/v1/logs".to_string())
                );
            },
        );
    }

    #[test]
    fn test_with_env_unset_keeps_earlier_layers() {
        temp_env::with_vars_unset([TRACE_ENDPOINT_VAR, LOG_ENDPOINT_VAR], || {
            let config = TelemetryBuilder::new()
                .trace_endpoint("http://file:4318/v1/traces")
                .with_env()
                .extract_config()
                .unwrap();
            assert_eq!(
                config.endpoints.traces,
                Some("http://file:4318/v1/traces".to_string())
            );
            assert_eq!(config.endpoints.logs, None);
        });
    }

    #[test]
    fn test_with_dotenv_file_populates_environment() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{TRACE_ENDPOINT_VAR}=http://dotenv:4318/v1/traces").unwrap();
        writeln!(file, "{LOG_ENDPOINT_VAR}=http://dotenv:3100/otlp/v1/logs").unwrap();

        temp_env::with_vars_unset([TRACE_ENDPOINT_VAR, LOG_ENDPOINT_VAR], || {
            let config = TelemetryBuilder::new()
                .with_dotenv_file(file.path())
                .with_env()
                .extract_config()
                .unwrap();
            assert_eq!(
                config.endpoints.traces,
                Some("http://dotenv:4318/v1/traces".to_string())
            );
            assert_eq!(
                config.endpoints.logs,
                Some("http://dotenv:3100/otlp/v1/logs".to_string())
            );
        });
    }

    #[test]
    fn test_with_dotenv_file_does_not_override_environment() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{TRACE_ENDPOINT_VAR}=http://dotenv:4318/v1/traces").unwrap();

        temp_env::with_var(TRACE_ENDPOINT_VAR, Some("http://shell:4318/v1/traces"), || {
            let config = TelemetryBuilder::new()
                .with_dotenv_file(file.path())
                .with_env()
                .extract_config()
                .unwrap();
            assert_eq!(
                config.endpoints.traces,
                Some("http://shell:4318/v1/traces".to_string())
            );
        });
    }

    #[test]
    fn test_with_dotenv_file_missing_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let builder = TelemetryBuilder::new().with_dotenv_file(dir.path().join(".env"));
        assert!(builder.extract_config().is_ok());
    }

    #[test]
    fn test_with_prefixed_env() {
        temp_env::with_vars(
            [
                ("TELEMETRY_PROTOCOL", Some("httpjson")),
                ("TELEMETRY_ENDPOINTS__TRACES", Some("http://prefixed:4318/v1/traces")),
                ("TELEMETRY_RESOURCE__SERVICE_NAME", Some("prefixed-service")),
                ("TELEMETRY_LOGS__SCHEDULED_DELAY", Some("250ms")),
            ],
            || {
                let config = TelemetryBuilder::new()
                    .with_prefixed_env("TELEMETRY_")
                    .extract_config()
                    .unwrap();
                assert_eq!(config.protocol, Protocol::HttpJson);
                assert_eq!(
                    config.endpoints.traces,
                    Some("http://prefixed:4318/v1/traces".to_string())
                );
                assert_eq!(
                    config.resource.service_name,
                    Some("prefixed-service".to_string())
                );
                assert_eq!(config.logs.scheduled_delay, Duration::from_millis(250));
            },
        );
    }

    #[test]
    fn test_with_standard_env_multiple_vars() {
        temp_env::with_vars(
            [
                (
                    "OTEL_EXPORTER_OTLP_TRACES_ENDPOINT",
                    Some("http://collector:4317"),
                ),
                (
                    "OTEL_EXPORTER_OTLP_LOGS_ENDPOINT",
                    Some("http://collector:4317"),
                ),
                ("OTEL_EXPORTER_OTLP_PROTOCOL", Some("grpc")),
                ("OTEL_SERVICE_NAME", Some("multi-test")),
            ],
            || {
                let config = TelemetryBuilder::new()
                    .with_standard_env()
                    .extract_config()
                    .unwrap();

                assert_eq!(
                    config.endpoints.traces,
                    Some("http://collector:4317".to_string())
                );
                assert_eq!(
                    config.endpoints.logs,
                    Some("http://collector:4317".to_string())
                );
                assert_eq!(config.protocol, Protocol::Grpc);
                assert_eq!(config.resource.service_name, Some("multi-test".to_string()));
            },
        );
    }

    #[test]
    fn test_with_standard_env_protocol_http_protobuf() {
        temp_env::with_var("OTEL_EXPORTER_OTLP_PROTOCOL", Some("http/protobuf"), || {
            let config = TelemetryBuilder::new()
                .protocol(Protocol::Grpc)
                .with_standard_env()
                .extract_config()
                .unwrap();
            assert_eq!(config.protocol, Protocol::HttpBinary);
        });
    }

    #[test]
    fn test_programmatic_overrides_env() {
        temp_env::with_vars(
            [
                (TRACE_ENDPOINT_VAR, Some("http://env:4318/v1/traces")),
                ("OTEL_SERVICE_NAME", Some("env-service")),
            ],
            || {
                let config = TelemetryBuilder::new()
                    .with_env()
                    .with_standard_env()
                    .trace_endpoint("http://programmatic:4318/v1/traces")
                    .service_name("programmatic-service")
                    .extract_config()
                    .unwrap();

                assert_eq!(
                    config.endpoints.traces,
                    Some("http://programmatic:4318/v1/traces".to_string())
                );
                assert_eq!(
                    config.resource.service_name,
                    Some("programmatic-service".to_string())
                );
            },
        );
    }

    #[test]
    fn test_with_file_layers_under_programmatic_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
protocol = "httpjson"
timeout = "3s"

[endpoints]
traces = "http://file:4318/v1/traces"
logs = "http://file:3100/otlp/v1/logs"

[resource]
service_name = "from-file"

[traces]
max_export_batch_size = 128
"#
        )
        .unwrap();

        let config = TelemetryBuilder::new()
            .with_file(file.path())
            .log_endpoint("https://override:3100/otlp/v1/logs")
            .extract_config()
            .unwrap();

        assert_eq!(config.protocol, Protocol::HttpJson);
        assert_eq!(config.timeout, Duration::from_secs(3));
        assert_eq!(
            config.endpoints.traces,
            Some("http://file:4318/v1/traces".to_string())
        );
        assert_eq!(
            config.endpoints.logs,
            Some("https://override:3100/otlp/v1/logs".to_string())
        );
        assert_eq!(config.resource.service_name, Some("from-file".to_string()));
        assert_eq!(config.traces.max_export_batch_size, 128);
        assert_eq!(config.traces.max_queue_size, 2048);
    }

    #[test]
    fn test_with_file_missing_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let config = TelemetryBuilder::new()
            .with_file(dir.path().join("absent.toml"))
            .extract_config()
            .unwrap();
        assert_eq!(config.endpoints, Default::default());
    }

    #[test]
    fn test_endpoint_without_scheme_is_passed_through() {
        let config = TelemetryBuilder::new()
            .log_endpoint("loki:3100")
            .extract_config()
            .unwrap();

        assert_eq!(config.endpoints.logs, Some("loki:3100".to_string()));
    }

    #[test]
    fn test_build_accepts_endpoint_without_scheme() {
        let telemetry = TelemetryBuilder::new()
            .trace_endpoint("collector:4318")
            .log_endpoint("collector:4318")
            .detect_resources(false)
            .without_tracing_subscriber()
            .build()
            .unwrap();

        assert_eq!(telemetry.state(), LifecycleState::Started);
    }

    #[test]
    fn test_valid_https_endpoint_accepted() {
        let config = TelemetryBuilder::new()
            .trace_endpoint("https://tempo.example.com/v1/traces")
            .extract_config()
            .unwrap();
        assert_eq!(
            config.endpoints.traces,
            Some("https://tempo.example.com/v1/traces".to_string())
        );
    }

    #[test]
    fn test_build_starts_pipeline() {
        let telemetry = TelemetryBuilder::new()
            .trace_endpoint("http://127.0.0.1:4318/v1/traces")
            .log_endpoint("http://127.0.0.1:4318/v1/logs")
            .detect_resources(false)
            .without_tracing_subscriber()
            .build()
            .unwrap();

        assert_eq!(telemetry.state(), LifecycleState::Started);
    }
}
