//! Telemetry lifecycle management.
//!
//! [`Telemetry`] is the single authority for starting and stopping the
//! pipeline. It moves through [`LifecycleState`] exactly once:
//! `Uninitialized → Started → ShuttingDown → Terminated`. Shutdown flushes
//! buffered spans and log records before reporting completion, so callers
//! must await it before the process exits.

use crate::backend::{SdkBackend, TelemetryBackend};
use crate::config::TelemetryConfig;
use crate::console::{Console, RawConsole};
use crate::error::TelemetryError;
use opentelemetry::InstrumentationScope;
use opentelemetry_sdk::logs::SdkLogger;
use opentelemetry_sdk::trace::SdkTracer;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Instrumentation scope of the tracer handed to application code.
pub const TRACER_NAME: &str = "example-tracer";

/// Instrumentation scope of the logger behind the console shim.
pub const LOGGER_NAME: &str = "console-logger";

/// Version reported for both instrumentation scopes.
pub const SCOPE_VERSION: &str = "1.0.0";

/// Where the pipeline is in its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Constructed but not installed.
    Uninitialized,
    /// Installed; spans and records are being exported.
    Started,
    /// Flushing and shutting down providers.
    ShuttingDown,
    /// Shutdown attempted; consoles bound to the controller stop mirroring.
    Terminated,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Started => "started",
            Self::ShuttingDown => "shutting-down",
            Self::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Lifecycle controller for the telemetry pipeline.
///
/// If dropped while still started, providers are flushed and shut down
/// best-effort. Use [`shutdown()`](Self::shutdown) for explicit error handling.
pub struct Telemetry<B: TelemetryBackend = SdkBackend> {
    backend: Arc<B>,
    state: watch::Sender<LifecycleState>,
}

impl Telemetry<SdkBackend> {
    /// Builds OTLP exporters from `config` and starts the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if an exporter cannot be constructed or the `tracing`
    /// subscriber is already set. Endpoints are not checked beyond what the
    /// exporters themselves require; an unreachable collector only surfaces
    /// as export failures later.
    pub fn initialize(config: TelemetryConfig) -> Result<Self, TelemetryError> {
        let telemetry = Self::new(SdkBackend::from_config(&config)?);
        telemetry.start()?;
        Ok(telemetry)
    }
}

impl<B: TelemetryBackend> Telemetry<B> {
    /// Wraps a backend without installing it.
    pub fn new(backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
            state: watch::Sender::new(LifecycleState::Uninitialized),
        }
    }

    /// Installs the backend process-wide.
    ///
    /// # Errors
    ///
    /// [`TelemetryError::AlreadyStarted`] unless the controller is
    /// uninitialised; otherwise whatever installation reports, in which case
    /// the controller stays uninitialised.
    pub fn start(&self) -> Result<(), TelemetryError> {
        let claimed = self.state.send_if_modified(|state| {
            if *state == LifecycleState::Uninitialized {
                *state = LifecycleState::Started;
                true
            } else {
                false
            }
        });
        if !claimed {
            return Err(TelemetryError::AlreadyStarted);
        }

        if let Err(e) = self.backend.install() {
            self.state.send_replace(LifecycleState::Uninitialized);
            return Err(e);
        }

        tracing::debug!(target: "otel_lifecycle", "Telemetry started");
        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// The backend this controller drives.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Tracer for manual span creation.
    pub fn tracer(&self) -> SdkTracer {
        self.backend.tracer(
            InstrumentationScope::builder(TRACER_NAME)
                .with_version(SCOPE_VERSION)
                .build(),
        )
    }

    /// Logger for manual log record emission.
    pub fn logger(&self) -> SdkLogger {
        self.backend.logger(
            InstrumentationScope::builder(LOGGER_NAME)
                .with_version(SCOPE_VERSION)
                .build(),
        )
    }

    /// Watches lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Console shim writing to the real stdout/stderr and mirroring into
    /// this pipeline until it is terminated.
    pub fn console(&self) -> Console<SdkLogger> {
        self.console_with_output(Arc::new(RawConsole::new()))
    }

    /// Like [`console`](Self::console) but printing through `raw`.
    pub fn console_with_output(&self, raw: Arc<RawConsole>) -> Console<SdkLogger> {
        Console::with_output(raw, self.logger()).with_lifecycle(self.subscribe())
    }

    /// Exports everything buffered so far without shutting down.
    pub async fn force_flush(&self) -> Result<(), TelemetryError> {
        let backend = Arc::clone(&self.backend);
        tokio::task::spawn_blocking(move || backend.force_flush()).await?
    }

    /// Flushes and shuts down the pipeline.
    ///
    /// The first caller performs the flush and receives its outcome. A caller
    /// arriving while that is in progress waits for it to finish and returns
    /// `Ok`; so does any later caller. The state always ends `Terminated`.
    pub async fn shutdown(&self) -> Result<(), TelemetryError> {
        let mut previous = LifecycleState::Uninitialized;
        self.state.send_if_modified(|state| {
            previous = *state;
            match *state {
                LifecycleState::Started => {
                    *state = LifecycleState::ShuttingDown;
                    true
                }
                LifecycleState::Uninitialized => {
                    *state = LifecycleState::Terminated;
                    true
                }
                LifecycleState::ShuttingDown | LifecycleState::Terminated => false,
            }
        });

        match previous {
            LifecycleState::Started => {}
            LifecycleState::ShuttingDown => {
                let mut rx = self.state.subscribe();
                let _ = rx.wait_for(|s| *s == LifecycleState::Terminated).await;
                return Ok(());
            }
            LifecycleState::Uninitialized | LifecycleState::Terminated => return Ok(()),
        }

        tracing::debug!(target: "otel_lifecycle", "Shutting down telemetry");
        let backend = Arc::clone(&self.backend);
        let result = match tokio::task::spawn_blocking(move || backend.shutdown()).await {
            Ok(result) => result,
            Err(e) => Err(TelemetryError::from(e)),
        };
        self.state.send_replace(LifecycleState::Terminated);

        if let Err(e) = &result {
            tracing::error!(target: "otel_lifecycle", error = %e, "Telemetry shutdown failed");
        }
        result
    }
}

impl<B: TelemetryBackend> Drop for Telemetry<B> {
    fn drop(&mut self) {
        if *self.state.borrow() != LifecycleState::Started {
            return;
        }
        if let Err(e) = self.backend.shutdown() {
            tracing::error!(target: "otel_lifecycle", error = %e, "Failed to shut down telemetry on drop");
        }
    }
}

impl<B: TelemetryBackend> fmt::Debug for Telemetry<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Telemetry")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
