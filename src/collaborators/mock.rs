//! Deterministic collaborators
//!
//! Used by the test suite and by the CLI when no API keys are configured.

use super::{
    Classification, Classifier, Collaborators, FundamentalsProvider, GenerationRequest,
    GenerationTask, LanguageModel, NewsProvider, PriceHistory,
};
use crate::classifier::KeywordClassifier;
use crate::error::{CollabResult, CollaboratorError};
use crate::models::{DateRange, MetricsByCategory, Usage};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Returns the same classification for every query.
pub struct StaticClassifier {
    classification: Classification,
    fail: bool,
}

impl StaticClassifier {
    pub fn new<I, S>(usage: Usage, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            classification: Classification::new(usage, symbols),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            classification: Classification::new(Usage::Invalid, Vec::<String>::new()),
            fail: true,
        }
    }
}

#[async_trait]
impl Classifier for StaticClassifier {
    async fn classify(&self, _query: &str) -> CollabResult<Classification> {
        if self.fail {
            return Err(CollaboratorError::Request("classifier unavailable".to_string()));
        }
        Ok(self.classification.clone())
    }
}

/// `per_symbol` summaries named `"<SYMBOL> summary <n>"`.
pub struct StubNewsProvider {
    per_symbol: usize,
    fail: bool,
    delay: Duration,
}

impl StubNewsProvider {
    pub fn new(per_symbol: usize) -> Self {
        Self {
            per_symbol,
            fail: false,
            delay: Duration::ZERO,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(0)
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl NewsProvider for StubNewsProvider {
    async fn company_news(
        &self,
        symbol: &str,
        _range: DateRange,
        limit: usize,
    ) -> CollabResult<Vec<String>> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(CollaboratorError::Status {
                status: 503,
                body: "news provider unavailable".to_string(),
            });
        }
        Ok((1..=self.per_symbol.min(limit))
            .map(|n| format!("{} summary {}", symbol, n))
            .collect())
    }
}

/// The same fixed metrics map for every symbol.
pub struct StubFundamentals {
    metrics: MetricsByCategory,
    failing_symbols: HashSet<String>,
    fail: bool,
    delay: Duration,
}

impl StubFundamentals {
    pub fn new() -> Self {
        Self {
            metrics: fixed_metrics(),
            failing_symbols: HashSet::new(),
            fail: false,
            delay: Duration::ZERO,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    /// Fail only for `symbol`.
    pub fn failing_for(mut self, symbol: &str) -> Self {
        self.failing_symbols.insert(symbol.to_ascii_uppercase());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Default for StubFundamentals {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FundamentalsProvider for StubFundamentals {
    async fn fundamentals(&self, symbol: &str) -> CollabResult<MetricsByCategory> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail || self.failing_symbols.contains(symbol) {
            return Err(CollaboratorError::Request(format!(
                "fundamentals unavailable for {}",
                symbol
            )));
        }
        Ok(self.metrics.clone())
    }
}

fn fixed_metrics() -> MetricsByCategory {
    let mut metrics = MetricsByCategory::new();
    metrics.insert(
        "Valuation".to_string(),
        BTreeMap::from([
            ("Price to Earnings (Trailing Twelve Months)".to_string(), Some(28.4)),
            ("Price to Book Ratio".to_string(), Some(41.2)),
        ]),
    );
    metrics.insert(
        "RiskVolatility".to_string(),
        BTreeMap::from([
            ("Beta (Volatility Relative to Market)".to_string(), Some(1.21)),
            ("3-Month Average Daily Return Standard Deviation".to_string(), None),
        ]),
    );
    metrics
}

/// A gently rising close series.
pub struct StubPrices {
    closes: Vec<f64>,
}

impl StubPrices {
    pub fn new(closes: Vec<f64>) -> Self {
        Self { closes }
    }

    pub fn rising(days: usize) -> Self {
        Self::new((0..days).map(|d| 100.0 + d as f64 * 0.5).collect())
    }
}

#[async_trait]
impl PriceHistory for StubPrices {
    async fn daily_closes(&self, _symbol: &str) -> CollabResult<Vec<f64>> {
        Ok(self.closes.clone())
    }
}

/// Language model with canned replies. Records every request it serves.
pub struct ScriptedModel {
    default_reply: String,
    replies: HashMap<GenerationTask, String>,
    failing: HashSet<GenerationTask>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedModel {
    pub fn new(default_reply: impl Into<String>) -> Self {
        Self {
            default_reply: default_reply.into(),
            replies: HashMap::new(),
            failing: HashSet::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn reply(mut self, task: GenerationTask, reply: impl Into<String>) -> Self {
        self.replies.insert(task, reply.into());
        self
    }

    pub fn fail(mut self, task: GenerationTask) -> Self {
        self.failing.insert(task);
        self
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Tasks served, in call order.
    pub fn calls(&self) -> Vec<GenerationTask> {
        self.requests().iter().map(|r| r.task).collect()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn complete(&self, request: &GenerationRequest) -> CollabResult<String> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request.clone());

        if self.failing.contains(&request.task) {
            return Err(CollaboratorError::Status {
                status: 500,
                body: format!("scripted failure for {}", request.task.as_str()),
            });
        }
        Ok(self
            .replies
            .get(&request.task)
            .cloned()
            .unwrap_or_else(|| self.default_reply.clone()))
    }
}

/// Offline wiring: keyword classification, stub market data and a model that
/// echoes a short canned narrative per task.
pub fn create_offline_collaborators() -> Collaborators {
    let model = ScriptedModel::new("Offline mode: no language model is configured.")
        .reply(
            GenerationTask::ProfileExtraction,
            r#"{"risk_preference": 0.5, "investment_goal": "wealth building", "stocks": []}"#,
        )
        .reply(
            GenerationTask::Advice,
            "Offline mode: advice is generated from stub market data only.",
        )
        .reply(
            GenerationTask::Strategy,
            "Offline mode: strategy is generated from stub market data only.",
        );

    Collaborators::new(
        Arc::new(KeywordClassifier::new()),
        Arc::new(StubNewsProvider::new(2)),
        Arc::new(StubFundamentals::new()),
        Arc::new(model),
    )
    .with_prices(Arc::new(StubPrices::rising(60)))
}
