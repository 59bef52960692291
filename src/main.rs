/// Stepway: resumable business-process runtime
///
/// Main entry point for the Stepway server. Initializes configuration and starts
/// the HTTP server with workflow session endpoints.

use stepway::{config::Config, server::start_server};

/// Application entry point
///
/// The server provides:
/// - Workflow start/resume and session status at /api/workflow/*
/// - Application reload at /api/applications/{id}/reload
/// - Health check at /healthz
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration from STEPWAY_* environment variables
    let config = Config::default();

    start_server(config).await?;

    Ok(())
}
