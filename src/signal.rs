//! Graceful shutdown on process termination signals.

use crate::backend::TelemetryBackend;
use crate::console::RawConsole;
use crate::console_log;
use crate::error::TelemetryError;
use crate::lifecycle::Telemetry;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Exit code used after a signal-triggered shutdown, whether or not the
/// flush succeeded.
pub const SIGNAL_EXIT_CODE: i32 = 0;

/// Listener for SIGTERM and SIGINT (Ctrl-C elsewhere), registered eagerly so
/// a signal arriving before the first poll is not lost.
#[derive(Debug)]
pub struct TerminateSignal {
    #[cfg(unix)]
    sigterm: tokio::signal::unix::Signal,
    #[cfg(unix)]
    sigint: tokio::signal::unix::Signal,
}

impl TerminateSignal {
    /// Registers the listeners. Must be called from within a Tokio runtime.
    pub fn register() -> Result<Self, TelemetryError> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            Ok(Self {
                sigterm: signal(SignalKind::terminate()).map_err(TelemetryError::Signal)?,
                sigint: signal(SignalKind::interrupt()).map_err(TelemetryError::Signal)?,
            })
        }

        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    /// Resolves on the first termination signal.
    pub async fn recv(mut self) {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = self.sigterm.recv() => {},
                _ = self.sigint.recv() => {},
            }
        }

        #[cfg(not(unix))]
        {
            let _ = &mut self;
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

/// Waits for `signal`, shuts `telemetry` down and reports the outcome on
/// `output`. Returns the exit code the process should terminate with.
pub async fn handle_termination<S, B>(
    signal: S,
    telemetry: &Telemetry<B>,
    output: &RawConsole,
) -> i32
where
    S: Future<Output = ()>,
    B: TelemetryBackend,
{
    signal.await;
    tracing::info!(target: "otel_lifecycle", "Termination signal received");

    match telemetry.shutdown().await {
        Ok(()) => console_log!(output, "Tracing and logging terminated"),
        Err(e) => console_log!(output, "Error terminating tracing/logging", e),
    }
    SIGNAL_EXIT_CODE
}

/// Spawns the single-shot termination handler: on SIGTERM or SIGINT the
/// pipeline is shut down and the process exits with [`SIGNAL_EXIT_CODE`].
///
/// # Errors
///
/// Returns an error if the signal listeners cannot be registered.
pub fn spawn_termination_handler<B>(
    telemetry: Arc<Telemetry<B>>,
    output: Arc<RawConsole>,
) -> Result<JoinHandle<()>, TelemetryError>
where
    B: TelemetryBackend,
{
    let signal = TerminateSignal::register()?;
    Ok(tokio::spawn(async move {
        let code = handle_termination(signal.recv(), &telemetry, &output).await;
        std::process::exit(code);
    }))
}
