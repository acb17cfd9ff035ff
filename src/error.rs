//! Error types for telemetry initialisation, lifecycle and the demo workload.

use crate::workload::DemoStep;
use figment::Error as FigmentError;

/// Errors from telemetry initialisation and lifecycle.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum TelemetryError {
    /// Failed to extract configuration from sources.
    #[error("configuration error: {0}")]
    Config(#[source] Box<FigmentError>),

    /// Failed to create trace exporter.
    #[error("failed to create trace exporter")]
    TraceExporter(#[source] opentelemetry_otlp::ExporterBuildError),

    /// Failed to create log exporter.
    #[error("failed to create log exporter")]
    LogExporter(#[source] opentelemetry_otlp::ExporterBuildError),

    /// Failed to initialise tracing subscriber.
    #[error("failed to initialise tracing subscriber")]
    TracingSubscriber(#[from] tracing_subscriber::util::TryInitError),

    /// Failed to flush providers.
    #[error("failed to flush {signal} provider")]
    Flush {
        /// Signal whose provider failed ("traces" or "logs").
        signal: &'static str,
        /// Underlying SDK error.
        #[source]
        source: opentelemetry_sdk::error::OTelSdkError,
    },

    /// Failed to shut down providers.
    #[error("failed to shut down {signal} provider")]
    Shutdown {
        /// Signal whose provider failed ("traces" or "logs").
        signal: &'static str,
        /// Underlying SDK error.
        #[source]
        source: opentelemetry_sdk::error::OTelSdkError,
    },

    /// `start` was called on a controller that is not uninitialised.
    #[error("telemetry has already been started")]
    AlreadyStarted,

    /// The blocking shutdown task panicked or was cancelled.
    #[error("shutdown task failed")]
    ShutdownTask(#[from] tokio::task::JoinError),

    /// Failed to register a termination signal listener.
    #[error("failed to listen for termination signal")]
    Signal(#[source] std::io::Error),
}

/// Errors raised by the demo workload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum WorkloadError {
    /// A failure was injected at the given step.
    #[error("injected failure in {step}")]
    Injected {
        /// Step that failed.
        step: DemoStep,
    },
}
