use filing_analyst::{
    agent::WorkflowController, api::start_server, audit::RunLog, config::Settings,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::from_env()?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&settings.log_level))
        .init();

    if settings.gemini_api_key.is_none() {
        warn!("GEMINI_API_KEY not set in .env");
    }

    info!("Filing Analyst - API Server");
    info!("Port: {}", settings.port);
    info!(
        max_replans = settings.workflow.max_replans,
        threshold = settings.workflow.verification_pass_threshold,
        tools_api = settings.tools_api_base_url.as_deref().unwrap_or("model-backed"),
        "Workflow configuration"
    );

    let run_log = RunLog::with_capacity(settings.run_log_capacity);
    let controller = Arc::new(
        WorkflowController::from_settings(&settings)?.with_run_log(run_log.clone()),
    );

    info!("Workflow controller initialized");

    start_server(controller, run_log, settings.port).await?;

    Ok(())
}
