/// blockflow server entry point
///
/// Serves:
/// - Workflow management API at /api/workflows/*
/// - Run control at /api/workflows/{id}/runs and /api/runs/*
/// - Health check at /healthz

use blockflow::{config::Config, server::start_server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Defaults come from BLOCKFLOW_* env vars
    let config = Config::default();

    start_server(config).await?;

    Ok(())
}
