//! Demo workload: three nested timed operations under one root span.

use crate::console::Console;
use crate::console_log;
use crate::error::WorkloadError;
use opentelemetry::context::FutureExt as _;
use opentelemetry::logs::Logger;
use opentelemetry::trace::{Status, TraceContextExt, Tracer};
use opentelemetry::{Context, KeyValue};
use std::fmt;
use std::future::Future;
use std::time::Duration;

/// Name of the root span.
pub const ROOT_SPAN: &str = "main-operation";

/// Runs `body` inside a new child span of `parent`.
///
/// The span is the active context while `body` runs. If `body` returns an
/// error the span status is set to `Error` with its description. The span is
/// ended on return, and is also ended when dropped, so early returns, panics
/// and cancellation never leave it open.
pub async fn in_span<T, F, Fut, R, E>(
    tracer: &T,
    name: &'static str,
    parent: &Context,
    body: F,
) -> Result<R, E>
where
    T: Tracer,
    T::Span: Send + Sync + 'static,
    F: FnOnce(Context) -> Fut,
    Fut: Future<Output = Result<R, E>>,
    E: fmt::Display,
{
    let span = tracer.start_with_context(name, parent);
    let cx = parent.with_span(span);

    let result = body(cx.clone()).with_context(cx.clone()).await;

    let span = cx.span();
    if let Err(e) = &result {
        span.set_status(Status::error(e.to_string()));
    }
    span.end();
    result
}

/// The three child operations, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemoStep {
    /// `fetch-data`
    FetchData,
    /// `process-data`
    ProcessData,
    /// `save-results`
    SaveResults,
}

impl DemoStep {
    /// All steps in execution order.
    pub const ALL: [DemoStep; 3] = [Self::FetchData, Self::ProcessData, Self::SaveResults];

    /// Span name of this step.
    pub fn span_name(&self) -> &'static str {
        match self {
            Self::FetchData => "fetch-data",
            Self::ProcessData => "process-data",
            Self::SaveResults => "save-results",
        }
    }
}

impl fmt::Display for DemoStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.span_name())
    }
}

/// The demo sequence.
#[derive(Debug, Clone)]
pub struct Demo {
    fetch_delay: Duration,
    process_delay: Duration,
    save_delay: Duration,
    fail_at: Option<DemoStep>,
}

impl Default for Demo {
    fn default() -> Self {
        Self {
            fetch_delay: Duration::from_millis(100),
            process_delay: Duration::from_millis(200),
            save_delay: Duration::from_millis(150),
            fail_at: None,
        }
    }
}

impl Demo {
    /// Demo with the standard 100/200/150 ms delays.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the simulated delay of each step.
    #[must_use]
    pub fn with_delays(mut self, fetch: Duration, process: Duration, save: Duration) -> Self {
        self.fetch_delay = fetch;
        self.process_delay = process;
        self.save_delay = save;
        self
    }

    /// Makes `step` fail after its delay, before it records any attributes.
    #[must_use]
    pub fn fail_at(mut self, step: DemoStep) -> Self {
        self.fail_at = Some(step);
        self
    }

    async fn work(&self, step: DemoStep) -> Result<(), WorkloadError> {
        let delay = match step {
            DemoStep::FetchData => self.fetch_delay,
            DemoStep::ProcessData => self.process_delay,
            DemoStep::SaveResults => self.save_delay,
        };
        tokio::time::sleep(delay).await;

        if self.fail_at == Some(step) {
            return Err(WorkloadError::Injected { step });
        }
        Ok(())
    }

    /// Runs the sequence as a child of the current context.
    ///
    /// # Errors
    ///
    /// Returns the injected failure, if any. The failing step and the root
    /// span both end with `Error` status.
    pub async fn run<T, L>(&self, tracer: &T, console: &Console<L>) -> Result<(), WorkloadError>
    where
        T: Tracer,
        T::Span: Send + Sync + 'static,
        L: Logger,
    {
        let parent = Context::current();
        in_span(tracer, ROOT_SPAN, &parent, |cx| async move {
            console_log!(console, "Starting main operation...");

            in_span(tracer, DemoStep::FetchData.span_name(), &cx, |cx| async move {
                console_log!(console, "Fetching data...");
                self.work(DemoStep::FetchData).await?;
                let span = cx.span();
                span.set_attribute(KeyValue::new("data.size", 1024));
                span.set_attribute(KeyValue::new("data.source", "database"));
                Ok::<_, WorkloadError>(())
            })
            .await?;

            in_span(tracer, DemoStep::ProcessData.span_name(), &cx, |cx| async move {
                console_log!(console, "Processing data...");
                self.work(DemoStep::ProcessData).await?;
                cx.span()
                    .set_attribute(KeyValue::new("processed.records", 42));
                Ok::<_, WorkloadError>(())
            })
            .await?;

            in_span(tracer, DemoStep::SaveResults.span_name(), &cx, |cx| async move {
                console_log!(console, "Saving results...");
                self.work(DemoStep::SaveResults).await?;
                let span = cx.span();
                span.set_attribute(KeyValue::new("saved.records", 42));
                span.set_status(Status::Ok);
                Ok::<_, WorkloadError>(())
            })
            .await?;

            cx.span().set_status(Status::Ok);
            console_log!(console, "Main operation completed!");
            Ok::<_, WorkloadError>(())
        })
        .await
    }
}
