//! Telemetry lifecycle wrapper for OTLP traces and logs.
//!
//! Wires together the OpenTelemetry SDK, OTLP exporters, and `tracing` into a
//! pipeline with an explicit start/flush/shutdown lifecycle, a console shim
//! that mirrors printed lines into the log backend, and a termination handler
//! that flushes before the process exits.
//!
//! # Example
//!
//! ```no_run
//! use telemetry_lifecycle::{Demo, TelemetryBuilder, TelemetryError, console_log};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), TelemetryError> {
//!     let telemetry = TelemetryBuilder::new()
//!         .with_dotenv()
//!         .with_env()
//!         .service_name("my-service")
//!         .build()?;
//!     let console = telemetry.console();
//!
//!     console_log!(console, "Application running");
//!     if let Err(e) = Demo::new().run(&telemetry.tracer(), &console).await {
//!         telemetry_lifecycle::console_error!(console, "Error in main operation:", e);
//!     }
//!
//!     telemetry.shutdown().await
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod builder;
mod config;
mod console;
mod error;
mod lifecycle;
mod resource;
mod signal;
mod workload;

pub use backend::{SdkBackend, TelemetryBackend};
pub use builder::TelemetryBuilder;
pub use config::{
    BatchConfig, Endpoints, LOG_ENDPOINT_VAR, Protocol, ResourceConfig, TRACE_ENDPOINT_VAR,
    TelemetryConfig,
};
pub use console::{Console, ConsoleLevel, RawConsole, join_args, mirror_panics};
pub use error::{TelemetryError, WorkloadError};
pub use lifecycle::{LOGGER_NAME, LifecycleState, SCOPE_VERSION, TRACER_NAME, Telemetry};
pub use resource::RuntimeResourceDetector;
pub use signal::{
    SIGNAL_EXIT_CODE, TerminateSignal, handle_termination, spawn_termination_handler,
};
pub use workload::{Demo, DemoStep, ROOT_SPAN, in_span};

/// Re-exported for version compatibility with this crate's dependencies.
pub use opentelemetry;
/// Re-exported for version compatibility with this crate's dependencies.
pub use opentelemetry_sdk;
/// Re-exported for version compatibility with this crate's dependencies.
pub use tracing;

/// Re-exported for users who want to construct custom configuration providers.
pub use figment;
