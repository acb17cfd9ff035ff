use std::process::ExitCode;
use std::sync::Arc;
use telemetry_lifecycle::{
    Demo, RawConsole, TelemetryBuilder, console_error, console_log, mirror_panics,
    spawn_termination_handler,
};

#[tokio::main]
async fn main() -> ExitCode {
    let raw = Arc::new(RawConsole::new());

    let telemetry = match TelemetryBuilder::new()
        .service_name(env!("CARGO_PKG_NAME"))
        .service_version(env!("CARGO_PKG_VERSION"))
        .with_dotenv()
        .with_file("telemetry.toml")
        .with_standard_env()
        .with_env()
        .build()
    {
        Ok(telemetry) => Arc::new(telemetry),
        Err(e) => {
            console_error!(raw, "Failed to initialise telemetry:", e);
            return ExitCode::FAILURE;
        }
    };

    let console = Arc::new(telemetry.console_with_output(Arc::clone(&raw)));
    mirror_panics(Arc::clone(&console));

    if let Err(e) = spawn_termination_handler(Arc::clone(&telemetry), Arc::clone(&raw)) {
        console_error!(console, "Termination handler unavailable:", e);
    }

    let workload = tokio::spawn({
        let tracer = telemetry.tracer();
        let console = Arc::clone(&console);
        async move { Demo::new().run(&tracer, &*console).await }
    });
    match workload.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => console_error!(console, "Error in main operation:", e),
        // The panic hook has already reported it.
        Err(e) if e.is_panic() => {}
        Err(e) => console_error!(console, "Error in main operation:", e),
    }

    match telemetry.shutdown().await {
        Ok(()) => console_log!(console.original(), "Traces sent to Tempo and logs sent to Loki!"),
        Err(e) => console_log!(console.original(), "Error terminating tracing/logging", e),
    }
    ExitCode::SUCCESS
}
