use market_analysis_pipeline::{
    api::start_server,
    collaborators::create_default_collaborators,
    config::PipelineConfig,
    logging::init_tracing,
    pipeline::Pipeline,
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    init_tracing("info");

    let config = PipelineConfig::from_env()?;
    if !config.has_credentials() {
        eprintln!("⚠️  API keys not set in .env");
        eprintln!("📌 Set GROQ_API_KEY (or GEMINI_API_KEY) and FINNHUB_API_KEY");
    }

    info!("🚀 Market Analysis Pipeline - API Server");
    info!("📍 Port: {}", config.port);
    info!("🤖 Provider: {:?}", config.provider);

    let collaborators = create_default_collaborators(&config)?;
    let pipeline = Arc::new(Pipeline::new(collaborators, config.settings.clone())?);

    info!("✅ Pipeline initialized");
    info!("📡 Starting API server...");

    start_server(pipeline, config.port).await?;

    Ok(())
}
