//! The telemetry SDK behind a small capability trait.
//!
//! [`TelemetryBackend`] is everything the lifecycle controller, console shim
//! and workload need from an SDK: process-wide installation, a tracer, a
//! logger, flush and shutdown. [`SdkBackend`] implements it over the
//! OpenTelemetry SDK providers and OTLP exporters.

use crate::config::{Protocol, TelemetryConfig};
use crate::error::TelemetryError;
use crate::resource::build_resource;
use opentelemetry::InstrumentationScope;
use opentelemetry::logs::LoggerProvider as _;
use opentelemetry::propagation::TextMapCompositePropagator;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{WithExportConfig, WithHttpConfig, WithTonicConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::error::OTelSdkResult;
use opentelemetry_sdk::logs::{
    BatchConfigBuilder as LogBatchConfigBuilder, BatchLogProcessor, LogExporter, SdkLogger,
    SdkLoggerProvider,
};
use opentelemetry_sdk::propagation::{BaggagePropagator, TraceContextPropagator};
use opentelemetry_sdk::trace::{
    BatchConfigBuilder as TraceBatchConfigBuilder, BatchSpanProcessor, SdkTracer,
    SdkTracerProvider, SpanExporter,
};
use std::collections::HashMap;
use tonic::metadata::{MetadataKey, MetadataMap, MetadataValue};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Capabilities the lifecycle controller needs from a telemetry SDK.
pub trait TelemetryBackend: Send + Sync + 'static {
    /// Installs the backend process-wide (global providers, propagators,
    /// `tracing` integration).
    fn install(&self) -> Result<(), TelemetryError>;

    /// Returns a tracer for manual span creation.
    fn tracer(&self, scope: InstrumentationScope) -> SdkTracer;

    /// Returns a logger for manual log record emission.
    fn logger(&self, scope: InstrumentationScope) -> SdkLogger;

    /// Exports everything buffered so far.
    fn force_flush(&self) -> Result<(), TelemetryError>;

    /// Flushes and shuts down every provider. May block on network I/O.
    fn shutdown(&self) -> Result<(), TelemetryError>;
}

/// [`TelemetryBackend`] over the OpenTelemetry SDK tracer and logger providers.
#[derive(Debug, Clone)]
pub struct SdkBackend {
    tracer_provider: SdkTracerProvider,
    logger_provider: SdkLoggerProvider,
    subscriber_scope: Option<String>,
}

impl SdkBackend {
    /// Builds OTLP exporters and batching providers from configuration.
    ///
    /// Endpoints are handed to the exporters verbatim; an absent endpoint
    /// leaves the exporter on its default target.
    pub fn from_config(config: &TelemetryConfig) -> Result<Self, TelemetryError> {
        let resource = build_resource(&config.resource);
        let tracer_provider = build_tracer_provider(config, resource.clone())?;
        let logger_provider = build_logger_provider(config, resource)?;

        Ok(Self {
            tracer_provider,
            logger_provider,
            subscriber_scope: config
                .init_tracing_subscriber
                .then(|| config.scope_name()),
        })
    }

    /// Builds providers that hand every span and record straight to the
    /// given exporters, without batching.
    pub fn with_simple_exporters<S, L>(span_exporter: S, log_exporter: L, resource: Resource) -> Self
    where
        S: SpanExporter + 'static,
        L: LogExporter + 'static,
    {
        Self {
            tracer_provider: SdkTracerProvider::builder()
                .with_simple_exporter(span_exporter)
                .with_resource(resource.clone())
                .build(),
            logger_provider: SdkLoggerProvider::builder()
                .with_simple_exporter(log_exporter)
                .with_resource(resource)
                .build(),
            subscriber_scope: None,
        }
    }

    /// Returns the tracer provider.
    pub fn tracer_provider(&self) -> &SdkTracerProvider {
        &self.tracer_provider
    }

    /// Returns the logger provider.
    pub fn logger_provider(&self) -> &SdkLoggerProvider {
        &self.logger_provider
    }
}

impl TelemetryBackend for SdkBackend {
    fn install(&self) -> Result<(), TelemetryError> {
        opentelemetry::global::set_tracer_provider(self.tracer_provider.clone());

        let propagator = TextMapCompositePropagator::new(vec![
            Box::new(TraceContextPropagator::new()),
            Box::new(BaggagePropagator::new()),
        ]);
        opentelemetry::global::set_text_map_propagator(propagator);

        if let Some(scope_name) = &self.subscriber_scope {
            init_subscriber(&self.tracer_provider, &self.logger_provider, scope_name.clone())?;
        }

        Ok(())
    }

    fn tracer(&self, scope: InstrumentationScope) -> SdkTracer {
        self.tracer_provider.tracer_with_scope(scope)
    }

    fn logger(&self, scope: InstrumentationScope) -> SdkLogger {
        self.logger_provider.logger_with_scope(scope)
    }

    fn force_flush(&self) -> Result<(), TelemetryError> {
        let traces = self
            .tracer_provider
            .force_flush()
            .map_err(|source| TelemetryError::Flush {
                signal: "traces",
                source,
            });
        let logs = self
            .logger_provider
            .force_flush()
            .map_err(|source| TelemetryError::Flush {
                signal: "logs",
                source,
            });
        traces.and(logs)
    }

    fn shutdown(&self) -> Result<(), TelemetryError> {
        // Both signals are attempted; the first failure wins.
        let traces = flush_then_shutdown(
            "traces",
            || self.tracer_provider.force_flush(),
            || self.tracer_provider.shutdown(),
        );
        let logs = flush_then_shutdown(
            "logs",
            || self.logger_provider.force_flush(),
            || self.logger_provider.shutdown(),
        );
        traces.and(logs)
    }
}

fn flush_then_shutdown(
    signal: &'static str,
    flush: impl FnOnce() -> OTelSdkResult,
    shutdown: impl FnOnce() -> OTelSdkResult,
) -> Result<(), TelemetryError> {
    let flushed = flush().map_err(|source| TelemetryError::Flush { signal, source });
    let shut = shutdown().map_err(|source| TelemetryError::Shutdown { signal, source });
    flushed.and(shut)
}

fn build_tonic_metadata(headers: &HashMap<String, String>) -> MetadataMap {
    let mut metadata = MetadataMap::new();
    for (key, value) in headers {
        if let (Ok(k), Ok(v)) = (
            key.parse::<MetadataKey<_>>(),
            value.parse::<MetadataValue<_>>(),
        ) {
            metadata.insert(k, v);
        }
    }
    metadata
}

macro_rules! build_exporter {
    ($config:expr, $endpoint:expr, $exporter_type:ident, $error_variant:ident) => {{
        match $config.protocol {
            Protocol::Grpc => {
                let mut builder = opentelemetry_otlp::$exporter_type::builder()
                    .with_tonic()
                    .with_timeout($config.timeout);

                if let Some(url) = $endpoint {
                    builder = builder.with_endpoint(url.clone());
                }
                if !$config.headers.is_empty() {
                    builder = builder.with_metadata(build_tonic_metadata(&$config.headers));
                }

                builder.build().map_err(TelemetryError::$error_variant)?
            }
            Protocol::HttpBinary | Protocol::HttpJson => {
                let protocol = match $config.protocol {
                    Protocol::HttpJson => opentelemetry_otlp::Protocol::HttpJson,
                    _ => opentelemetry_otlp::Protocol::HttpBinary,
                };
                let mut builder = opentelemetry_otlp::$exporter_type::builder()
                    .with_http()
                    .with_timeout($config.timeout)
                    .with_protocol(protocol);

                if let Some(url) = $endpoint {
                    builder = builder.with_endpoint(url.clone());
                }
                if !$config.headers.is_empty() {
                    builder = builder.with_headers($config.headers.clone());
                }

                builder.build().map_err(TelemetryError::$error_variant)?
            }
        }
    }};
}

fn build_tracer_provider(
    config: &TelemetryConfig,
    resource: Resource,
) -> Result<SdkTracerProvider, TelemetryError> {
    let exporter = build_exporter!(config, &config.endpoints.traces, SpanExporter, TraceExporter);

    let batch_config = TraceBatchConfigBuilder::default()
        .with_max_queue_size(config.traces.max_queue_size)
        .with_max_export_batch_size(config.traces.max_export_batch_size)
        .with_scheduled_delay(config.traces.scheduled_delay)
        .build();

    let span_processor = BatchSpanProcessor::builder(exporter)
        .with_batch_config(batch_config)
        .build();

    Ok(SdkTracerProvider::builder()
        .with_span_processor(span_processor)
        .with_resource(resource)
        .build())
}

fn build_logger_provider(
    config: &TelemetryConfig,
    resource: Resource,
) -> Result<SdkLoggerProvider, TelemetryError> {
    let exporter = build_exporter!(config, &config.endpoints.logs, LogExporter, LogExporter);

    let batch_config = LogBatchConfigBuilder::default()
        .with_max_queue_size(config.logs.max_queue_size)
        .with_max_export_batch_size(config.logs.max_export_batch_size)
        .with_scheduled_delay(config.logs.scheduled_delay)
        .build();

    let log_processor = BatchLogProcessor::builder(exporter)
        .with_batch_config(batch_config)
        .build();

    Ok(SdkLoggerProvider::builder()
        .with_log_processor(log_processor)
        .with_resource(resource)
        .build())
}

/// Events from the export stack itself must never reach the exporters.
fn export_filter() -> EnvFilter {
    EnvFilter::new("info,opentelemetry=off,hyper=off,tonic=off,h2=off,reqwest=off")
}

fn init_subscriber(
    tracer_provider: &SdkTracerProvider,
    logger_provider: &SdkLoggerProvider,
    scope_name: String,
) -> Result<(), TelemetryError> {
    let fmt_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_filter(fmt_filter);

    let telemetry_layer = tracing_opentelemetry::layer()
        .with_tracer(tracer_provider.tracer(scope_name))
        .with_filter(export_filter());
    let log_layer = OpenTelemetryTracingBridge::new(logger_provider).with_filter(export_filter());

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(telemetry_layer)
        .with(log_layer)
        .try_init()?;

    Ok(())
}
