use nfse_dispatch::{
    config::Config,
    orchestrator::BatchOrchestrator,
    source::{MemorySource, demo_records},
    transport::create_transport,
};
use std::sync::Arc;
use tracing::info;

/// The main entry point for the dispatcher application.
///
/// This function initializes logging, loads the application configuration,
/// seeds the invoice source, builds the transport selected by configuration,
/// and drives one full submission cycle through the orchestrator.
#[tokio::main] // Marks the async main function to be run by the Tokio runtime.
async fn main() -> anyhow::Result<()> {
    // Initialize logging using tracing_subscriber.
    // This sets up a default formatter that prints logs to stdout.
    tracing_subscriber::fmt::init();

    // Load the application configuration from the specified TOML file.
    // The `?` operator propagates any errors that occur during loading.
    let config = Config::load("config/default.toml")?;
    // Log the loaded configuration for debugging and informational purposes.
    info!("Dispatcher starting with config: {:?}", config);

    // Set up the invoice source. The in-memory source backs development
    // runs; mock runs are seeded with sample records so the full pipeline
    // has something to push through.
    let source = Arc::new(MemorySource::new());
    if config.transport.mock {
        for record in demo_records(&config.provider, 3) {
            source.push(record).await;
        }
        info!("mock mode: seeded {} demo records", source.pending_len().await);
    }
    let pending = source.pending_len().await;

    // Build the transport selected by configuration (SOAP client or the
    // deterministic in-process mock).
    let transport = create_transport(&config, pending)?;

    // Drive one full submission cycle: build, sign, submit, poll, fetch.
    let orchestrator = BatchOrchestrator::new(config, source, transport);
    let report = orchestrator.run().await;

    info!(
        success = report.success,
        stages = report.completed_stages.len(),
        invoices = report.invoices.len(),
        "run finished in {:?}",
        report.duration
    );

    // Emit the full outcome report as JSON so callers can script against it.
    println!("{}", serde_json::to_string_pretty(&report)?);

    // Return `Ok(())` to indicate successful execution of the main function.
    Ok(())
}
