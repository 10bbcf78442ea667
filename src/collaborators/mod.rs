//! External collaborators
//!
//! Every service the pipeline depends on but does not implement sits behind
//! one of these traits. Handles are injected through [`Collaborators`]; nothing
//! is resolved from global state.

pub mod finnhub;
pub mod gemini;
pub mod generator;
pub mod groq;
pub mod mock;
pub mod prices;

use crate::classifier::LlmClassifier;
use crate::config::{LlmProvider, PipelineConfig};
use crate::error::{CollabResult, CollaboratorError, PipelineError};
use crate::models::{DateRange, MetricsByCategory, Usage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub use generator::Generator;

// ===== Classification =====

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub usage: Usage,
    #[serde(default)]
    pub symbols: Vec<String>,
}

impl Classification {
    pub fn new<I, S>(usage: Usage, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            usage,
            symbols: symbols.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, query: &str) -> CollabResult<Classification>;
}

// ===== Market data =====

#[async_trait]
pub trait NewsProvider: Send + Sync {
    /// Summaries for `symbol` published inside `range`, at most `limit`.
    async fn company_news(
        &self,
        symbol: &str,
        range: DateRange,
        limit: usize,
    ) -> CollabResult<Vec<String>>;
}

#[async_trait]
pub trait FundamentalsProvider: Send + Sync {
    async fn fundamentals(&self, symbol: &str) -> CollabResult<MetricsByCategory>;
}

#[async_trait]
pub trait PriceHistory: Send + Sync {
    /// Daily closes, oldest first.
    async fn daily_closes(&self, symbol: &str) -> CollabResult<Vec<f64>>;
}

// ===== Language model =====

/// What a generation call is for. Used for logging, timeouts and test scripting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationTask {
    Classification,
    ProfileExtraction,
    PortfolioSummary,
    Sentiment,
    MarketTrends,
    Advice,
    Strategy,
}

impl GenerationTask {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationTask::Classification => "classification",
            GenerationTask::ProfileExtraction => "profile_extraction",
            GenerationTask::PortfolioSummary => "portfolio_summary",
            GenerationTask::Sentiment => "sentiment",
            GenerationTask::MarketTrends => "market_trends",
            GenerationTask::Advice => "advice",
            GenerationTask::Strategy => "strategy",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub task: GenerationTask,
    pub system: Option<String>,
    pub prompt: String,
    /// Ask the provider for a bare JSON object.
    pub json: bool,
}

impl GenerationRequest {
    pub fn text(task: GenerationTask, prompt: impl Into<String>) -> Self {
        Self {
            task,
            system: None,
            prompt: prompt.into(),
            json: false,
        }
    }

    pub fn json(task: GenerationTask, system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            task,
            system: Some(system.into()),
            prompt: prompt.into(),
            json: true,
        }
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &'static str;

    async fn complete(&self, request: &GenerationRequest) -> CollabResult<String>;
}

// ===== Wiring =====

/// Handles injected into the pipeline constructor.
#[derive(Clone)]
pub struct Collaborators {
    pub classifier: Arc<dyn Classifier>,
    pub news: Arc<dyn NewsProvider>,
    pub fundamentals: Arc<dyn FundamentalsProvider>,
    pub prices: Option<Arc<dyn PriceHistory>>,
    pub model: Arc<dyn LanguageModel>,
}

impl Collaborators {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        news: Arc<dyn NewsProvider>,
        fundamentals: Arc<dyn FundamentalsProvider>,
        model: Arc<dyn LanguageModel>,
    ) -> Self {
        Self {
            classifier,
            news,
            fundamentals,
            prices: None,
            model,
        }
    }

    pub fn with_prices(mut self, prices: Arc<dyn PriceHistory>) -> Self {
        self.prices = Some(prices);
        self
    }
}

/// Bound a collaborator call; an elapsed deadline becomes `CollaboratorError::Timeout`.
pub async fn with_timeout<T, F>(after: Duration, call: &'static str, fut: F) -> CollabResult<T>
where
    F: Future<Output = CollabResult<T>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => Err(CollaboratorError::Timeout { call, after }),
    }
}

/// Shared HTTP client settings for the adapters below.
///
/// Idle connections are not pooled: branch work runs on short-lived runtimes
/// and a pooled connection must not outlive the runtime that opened it.
pub(crate) fn http_client() -> CollabResult<reqwest::Client> {
    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(60))
        .build()?;
    Ok(client)
}

/// Non-2xx responses become `CollaboratorError::Status` with the body attached.
pub(crate) async fn check_status(response: reqwest::Response) -> CollabResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(CollaboratorError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Build the HTTP-backed collaborators described by `config`.
pub fn create_default_collaborators(config: &PipelineConfig) -> crate::Result<Collaborators> {
    let model: Arc<dyn LanguageModel> = match config.provider {
        LlmProvider::Groq => {
            let key = config
                .groq_api_key
                .clone()
                .ok_or_else(|| PipelineError::Config("GROQ_API_KEY not configured".to_string()))?;
            Arc::new(groq::GroqClient::new(key, config.groq_model.clone()).map_err(config_error)?)
        }
        LlmProvider::Gemini => {
            let key = config
                .gemini_api_key
                .clone()
                .ok_or_else(|| PipelineError::Config("GEMINI_API_KEY not configured".to_string()))?;
            Arc::new(gemini::GeminiClient::new(key).map_err(config_error)?)
        }
    };

    let finnhub_key = config
        .finnhub_api_key
        .clone()
        .ok_or_else(|| PipelineError::Config("FINNHUB_API not configured".to_string()))?;
    let finnhub = Arc::new(finnhub::FinnhubClient::new(finnhub_key).map_err(config_error)?);
    let prices = Arc::new(prices::YahooPrices::new().map_err(config_error)?);

    let classifier = Arc::new(LlmClassifier::new(Generator::new(
        Arc::clone(&model),
        config.settings.collaborator_timeout,
    )));

    Ok(Collaborators::new(classifier, finnhub.clone(), finnhub, model).with_prices(prices))
}

fn config_error(err: CollaboratorError) -> PipelineError {
    PipelineError::Config(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_elapses() {
        let result: CollabResult<()> = with_timeout(Duration::from_millis(10), "news", async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await;

        assert!(matches!(
            result,
            Err(CollaboratorError::Timeout { call: "news", .. })
        ));
    }

    #[tokio::test]
    async fn test_with_timeout_passes_result_through() {
        let result = with_timeout(Duration::from_secs(1), "news", async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[test]
    fn test_missing_keys_are_config_errors() {
        let config = PipelineConfig::default();
        let err = create_default_collaborators(&config).err().unwrap();
        assert!(matches!(err, PipelineError::Config(_)));
    }
}
