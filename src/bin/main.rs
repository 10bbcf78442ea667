use market_analysis_pipeline::{
    collaborators::{create_default_collaborators, mock::create_offline_collaborators},
    config::PipelineConfig,
    logging::init_tracing,
    pipeline::{Pipeline, RunRequest},
    api::answer,
};
use tracing::{info, warn};

/// Runs one query from the command line.
///
/// No async runtime is started here: the pipeline drives its own scheduler
/// and the fork-join takes the cooperative backend.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    init_tracing("info");

    let query = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    let query = if query.trim().is_empty() {
        "Should I buy AAPL or TSLA stock right now?".to_string()
    } else {
        query
    };

    let config = PipelineConfig::from_env()?;
    let collaborators = if config.has_credentials() {
        create_default_collaborators(&config)?
    } else {
        warn!("API keys not set, running with offline collaborators");
        create_offline_collaborators()
    };

    let pipeline = Pipeline::new(collaborators, config.settings.clone())?;

    info!(query_chars = query.chars().count(), "Running pipeline");

    match pipeline.run_blocking(RunRequest::new(query)) {
        Ok(outcome) => {
            println!("\n=== ANALYSIS RESULT ===");
            println!("Run ID: {}", outcome.run_id);
            println!("Route: {}", outcome.route);
            println!("Symbols: {}", outcome.state.symbols().join(", "));
            println!("Elapsed: {} ms", outcome.elapsed_ms);
            if !outcome.state.market_trends.is_empty() {
                println!("\nMarket Trends:\n{}", outcome.state.market_trends);
            }
            println!("\nAnswer:\n{}", answer(&outcome));
            println!("\nTrace:");
            for (i, trace) in outcome.trace.iter().enumerate() {
                println!("  {}: {}", i + 1, trace);
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("Analysis failed at {}: {}", e.stage(), e);
            Err(Box::new(e) as Box<dyn std::error::Error>)
        }
    }
}
