//! News acquisition (branch A, first stage)

use super::{FailurePolicy, Node};
use crate::collaborators::{with_timeout, NewsProvider};
use crate::error::{PipelineError, Result};
use crate::models::DateRange;
use crate::state::AnalysisState;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct NewsNode {
    provider: Arc<dyn NewsProvider>,
    lookback_days: u32,
    limit: usize,
    timeout: Duration,
}

impl NewsNode {
    pub fn new(provider: Arc<dyn NewsProvider>, lookback_days: u32, limit: usize, timeout: Duration) -> Self {
        Self {
            provider,
            lookback_days,
            limit,
            timeout,
        }
    }
}

#[async_trait]
impl Node for NewsNode {
    fn name(&self) -> &'static str {
        "news"
    }

    fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::Isolating
    }

    async fn run(&self, mut state: AnalysisState) -> Result<AnalysisState> {
        let range = DateRange::trailing_days(self.lookback_days);
        let mut by_symbol = BTreeMap::new();
        let mut text = String::new();

        for symbol in state.symbols() {
            let summaries = with_timeout(
                self.timeout,
                "news",
                self.provider.company_news(symbol, range, self.limit),
            )
            .await
            .map_err(|source| PipelineError::Collaborator { node: "news", source })?;

            let summaries: Vec<String> = summaries
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .take(self.limit)
                .collect();

            debug!(run_id = %state.run_id, symbol = %symbol, count = summaries.len(), "Fetched news");

            if summaries.is_empty() {
                continue;
            }
            for summary in &summaries {
                text.push_str(&format!("{}\n{}\n---\n", symbol, summary));
            }
            by_symbol.insert(symbol.clone(), summaries);
        }

        state.news = text;
        state.news_by_symbol = by_symbol;
        Ok(state)
    }

    fn degrade(&self, mut state: AnalysisState) -> AnalysisState {
        state.reset_news_fields();
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::mock::StubNewsProvider;

    fn state() -> AnalysisState {
        AnalysisState::builder().query("q").symbols(["AAPL", "TSLA"]).build()
    }

    #[tokio::test]
    async fn test_collects_summaries_per_symbol() {
        let node = NewsNode::new(Arc::new(StubNewsProvider::new(2)), 7, 5, Duration::from_secs(1));
        let state = node.run(state()).await.unwrap();

        assert_eq!(state.news_by_symbol.len(), 2);
        assert_eq!(state.news_by_symbol["TSLA"], vec!["TSLA summary 1", "TSLA summary 2"]);
        assert!(state.news.starts_with("AAPL\nAAPL summary 1\n---\n"));
    }

    #[tokio::test]
    async fn test_respects_limit() {
        let node = NewsNode::new(Arc::new(StubNewsProvider::new(4)), 7, 1, Duration::from_secs(1));
        let state = node.run(state()).await.unwrap();
        assert_eq!(state.news_by_symbol["AAPL"].len(), 1);
    }

    #[tokio::test]
    async fn test_provider_failure_fails_node() {
        let node = NewsNode::new(Arc::new(StubNewsProvider::failing()), 7, 5, Duration::from_secs(1));
        assert!(node.run(state()).await.is_err());
    }
}
