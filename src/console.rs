//! Console-style output mirrored into the log pipeline.
//!
//! [`RawConsole`] is plain line output: `log` and `info` go to stdout, `warn`
//! and `error` to stderr, arguments joined by single spaces. [`Console`]
//! performs exactly that output and then emits one log record carrying the
//! same text, so every line shows up both on the terminal and in the log
//! backend.
//!
//! The shim is an ordinary value handed to application code. Output from
//! libraries that log through `tracing` reaches the pipeline through the
//! subscriber bridge instead.
//!
//! ```no_run
//! use telemetry_lifecycle::{TelemetryBuilder, console_log, console_warn};
//!
//! # fn main() -> Result<(), telemetry_lifecycle::TelemetryError> {
//! let telemetry = TelemetryBuilder::new().with_env().build()?;
//! let console = telemetry.console();
//!
//! console_log!(console, "processed", 42, "records");
//! console_warn!(console, "queue depth", 1024);
//! # Ok(())
//! # }
//! ```

use crate::lifecycle::LifecycleState;
use opentelemetry::logs::{AnyValue, LogRecord as _, Logger, Severity};
use opentelemetry_sdk::logs::SdkLogger;
use std::fmt::{self, Display, Write as _};
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

/// The four intercepted output functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleLevel {
    /// `console.log`, reported as info.
    Log,
    /// `console.info`.
    Info,
    /// `console.warn`.
    Warn,
    /// `console.error`.
    Error,
}

impl ConsoleLevel {
    /// Severity number of the mirrored record.
    pub fn severity(&self) -> Severity {
        match self {
            Self::Log | Self::Info => Severity::Info,
            Self::Warn => Severity::Warn,
            Self::Error => Severity::Error,
        }
    }

    /// Severity text of the mirrored record.
    pub fn severity_text(&self) -> &'static str {
        match self {
            Self::Log | Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }

    /// Value of the `level` attribute on the mirrored record.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Log | Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    fn is_stderr(&self) -> bool {
        matches!(self, Self::Warn | Self::Error)
    }
}

/// Joins the `Display` form of every argument with single spaces.
pub fn join_args(args: &[&dyn Display]) -> String {
    let mut line = String::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            line.push(' ');
        }
        let _ = write!(line, "{arg}");
    }
    line
}

type Sink = Mutex<Box<dyn Write + Send>>;

/// The un-intercepted output functions.
pub struct RawConsole {
    stdout: Sink,
    stderr: Sink,
}

impl RawConsole {
    /// Writes to the process stdout and stderr.
    pub fn new() -> Self {
        Self::with_writers(io::stdout(), io::stderr())
    }

    /// Writes to the given streams instead of the process ones.
    pub fn with_writers(
        stdout: impl Write + Send + 'static,
        stderr: impl Write + Send + 'static,
    ) -> Self {
        Self {
            stdout: Mutex::new(Box::new(stdout)),
            stderr: Mutex::new(Box::new(stderr)),
        }
    }

    /// Prints to stdout.
    pub fn log(&self, args: &[&dyn Display]) {
        self.print(ConsoleLevel::Log, &join_args(args));
    }

    /// Prints to stdout.
    pub fn info(&self, args: &[&dyn Display]) {
        self.print(ConsoleLevel::Info, &join_args(args));
    }

    /// Prints to stderr.
    pub fn warn(&self, args: &[&dyn Display]) {
        self.print(ConsoleLevel::Warn, &join_args(args));
    }

    /// Prints to stderr.
    pub fn error(&self, args: &[&dyn Display]) {
        self.print(ConsoleLevel::Error, &join_args(args));
    }

    fn print(&self, level: ConsoleLevel, line: &str) {
        let sink = if level.is_stderr() {
            &self.stderr
        } else {
            &self.stdout
        };
        let mut out = sink.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = writeln!(out, "{line}").and_then(|()| out.flush());
    }
}

impl Default for RawConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RawConsole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawConsole").finish_non_exhaustive()
    }
}

/// Console output mirrored into a logger.
///
/// When bound to a controller with [`with_lifecycle`](Self::with_lifecycle),
/// mirroring stops once the pipeline is terminated and only the raw output
/// remains.
pub struct Console<L: Logger = SdkLogger> {
    raw: Arc<RawConsole>,
    logger: L,
    lifecycle: Option<watch::Receiver<LifecycleState>>,
}

impl<L: Logger> Console<L> {
    /// Mirrors the process stdout/stderr into `logger`.
    pub fn new(logger: L) -> Self {
        Self::with_output(Arc::new(RawConsole::new()), logger)
    }

    /// Mirrors the given raw output into `logger`.
    pub fn with_output(raw: Arc<RawConsole>, logger: L) -> Self {
        Self {
            raw,
            logger,
            lifecycle: None,
        }
    }

    /// Stops mirroring once `lifecycle` reports [`LifecycleState::Terminated`].
    #[must_use]
    pub fn with_lifecycle(mut self, lifecycle: watch::Receiver<LifecycleState>) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    fn is_mirroring(&self) -> bool {
        self.lifecycle
            .as_ref()
            .is_none_or(|state| *state.borrow() != LifecycleState::Terminated)
    }

    /// The un-intercepted output functions.
    ///
    /// Writing here does not reach the log pipeline, which is what messages
    /// printed after shutdown need.
    pub fn original(&self) -> &Arc<RawConsole> {
        &self.raw
    }

    /// `console.log`: stdout, mirrored at info.
    pub fn log(&self, args: &[&dyn Display]) {
        self.mirror(ConsoleLevel::Log, args);
    }

    /// `console.info`: stdout, mirrored at info.
    pub fn info(&self, args: &[&dyn Display]) {
        self.mirror(ConsoleLevel::Info, args);
    }

    /// `console.warn`: stderr, mirrored at warn.
    pub fn warn(&self, args: &[&dyn Display]) {
        self.mirror(ConsoleLevel::Warn, args);
    }

    /// `console.error`: stderr, mirrored at error.
    pub fn error(&self, args: &[&dyn Display]) {
        self.mirror(ConsoleLevel::Error, args);
    }

    fn mirror(&self, level: ConsoleLevel, args: &[&dyn Display]) {
        let body = join_args(args);
        self.raw.print(level, &body);
        if !self.is_mirroring() {
            return;
        }

        let mut record = self.logger.create_log_record();
        record.set_severity_number(level.severity());
        record.set_severity_text(level.severity_text());
        record.set_body(AnyValue::from(body));
        record.add_attribute("level", level.as_str());
        self.logger.emit(record);
    }
}

impl<L: Logger> fmt::Debug for Console<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Console").finish_non_exhaustive()
    }
}

/// Routes panic messages through `console` as `console.error`.
///
/// Replaces the process panic hook, so a panicking workload reaches stderr
/// and the log pipeline like any other reported error.
pub fn mirror_panics<L>(console: Arc<Console<L>>)
where
    L: Logger + Send + Sync + 'static,
{
    std::panic::set_hook(Box::new(move |info| {
        crate::console_error!(console, info);
    }));
}

/// `console.log(...)`: prints to stdout and mirrors at info.
#[macro_export]
macro_rules! console_log {
    ($console:expr $(, $arg:expr)* $(,)?) => {
        $console.log(&[$(&$arg as &dyn ::std::fmt::Display),*])
    };
}

/// `console.info(...)`: prints to stdout and mirrors at info.
#[macro_export]
macro_rules! console_info {
    ($console:expr $(, $arg:expr)* $(,)?) => {
        $console.info(&[$(&$arg as &dyn ::std::fmt::Display),*])
    };
}

/// `console.warn(...)`: prints to stderr and mirrors at warn.
#[macro_export]
macro_rules! console_warn {
    ($console:expr $(, $arg:expr)* $(,)?) => {
        $console.warn(&[$(&$arg as &dyn ::std::fmt::Display),*])
    };
}

/// `console.error(...)`: prints to stderr and mirrors at error.
#[macro_export]
macro_rules! console_error {
    ($console:expr $(, $arg:expr)* $(,)?) => {
        $console.error(&[$(&$arg as &dyn ::std::fmt::Display),*])
    };
}
