use filing_analyst::{agent::WorkflowController, audit::RunLog, config::Settings};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::from_env()?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&settings.log_level))
        .init();

    let question = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if question.trim().is_empty() {
        eprintln!("usage: filing-analyst <question>");
        std::process::exit(2);
    }

    info!("Filing analyst starting");

    let run_log = RunLog::with_capacity(settings.run_log_capacity);
    let controller = WorkflowController::from_settings(&settings)?.with_run_log(run_log.clone());

    info!(question = %question, "Running workflow");

    let result = controller.run(&question).await;

    println!("\n=== ANALYSIS RESULT ===");
    println!("Run ID: {}", result.run_id);
    println!("Status: {}", result.status);
    println!("Replans: {}", result.replan_count);
    println!("\n{}", result.response);
    println!("\nReasoning Trace:");
    for (i, entry) in result.trace.iter().enumerate() {
        println!("  {}: [{}] {}", i + 1, entry.node, entry.summary);
    }

    if let Some(record) = run_log.get(result.run_id).await {
        println!("\nContent hash: {}", record.content_hash);
    }

    Ok(())
}
