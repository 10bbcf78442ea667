//! Market-trend synthesis over the merged enrichment data

use super::fundamentals::render_economics;
use super::{strip_bold, symbol_list, FailurePolicy, Node};
use crate::collaborators::{GenerationTask, Generator};
use crate::error::{PipelineError, Result};
use crate::state::AnalysisState;
use async_trait::async_trait;
use tracing::info;

pub struct SynthesisNode {
    generator: Generator,
}

impl SynthesisNode {
    pub fn new(generator: Generator) -> Self {
        Self { generator }
    }
}

/// Deterministic narrative for a run where both branches came back empty.
pub fn no_data_narrative(state: &AnalysisState) -> String {
    let subject = if state.symbols().is_empty() {
        "the requested query".to_string()
    } else {
        state.symbols().join(", ")
    };
    format!(
        "No market data was available for {}. News and fundamentals could not be retrieved, \
         so this analysis is not backed by current market information.",
        subject
    )
}

fn trends_prompt(state: &AnalysisState, economics: &str) -> String {
    let symbols = symbol_list(state.symbols());
    format!(
        r#"You are a financial strategist with expertise in equity markets, valuation, macroeconomics and technical analysis. Analyse the stocks {symbols}.

The investor asked: "{query}"

Economic data for each stock:
```
{economics}
```

Market news sentiment for each stock, separated by "------":
```
{sentiment}
```

Write a detailed, data-backed report for each stock in {symbols} covering:
- Fundamentals: valuation, profitability, efficiency, financial health and returns
- Momentum: price returns, RSI, MACD and moving averages
- Volatility: beta and other signs of price variability
- Sentiment: what the news tone suggests

Start each report with a heading naming the company and its symbol. Do not give recommendations."#,
        symbols = symbols,
        query = state.query,
        economics = economics,
        sentiment = state.market_news,
    )
}

#[async_trait]
impl Node for SynthesisNode {
    fn name(&self) -> &'static str {
        "synthesis"
    }

    fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::Isolating
    }

    async fn run(&self, mut state: AnalysisState) -> Result<AnalysisState> {
        if !state.has_enrichment() {
            info!(run_id = %state.run_id, "No enrichment data, writing placeholder narrative");
            state.market_trends = no_data_narrative(&state);
            return Ok(state);
        }

        let economics = render_economics(state.symbols(), &state.metrics_by_symbol);
        let report = self
            .generator
            .text(GenerationTask::MarketTrends, trends_prompt(&state, &economics))
            .await
            .map_err(|source| PipelineError::Collaborator {
                node: "synthesis",
                source,
            })?;

        state.market_trends = strip_bold(&report);
        Ok(state)
    }

    fn degrade(&self, mut state: AnalysisState) -> AnalysisState {
        state.market_trends.clear();
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::mock::ScriptedModel;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_no_data_narrative_without_generation() {
        let model = Arc::new(ScriptedModel::new("report"));
        let node = SynthesisNode::new(Generator::new(model.clone(), Duration::from_secs(1)));

        let state = node
            .run(AnalysisState::builder().symbols(["AAPL", "TSLA"]).build())
            .await
            .unwrap();

        assert!(state.market_trends.starts_with("No market data was available for AAPL, TSLA."));
        assert!(model.calls().is_empty());
    }

    #[tokio::test]
    async fn test_report_strips_bold_and_marks_missing_symbols() {
        let model = Arc::new(ScriptedModel::new("**APPLE INC (AAPL)** steady"));
        let node = SynthesisNode::new(Generator::new(model.clone(), Duration::from_secs(1)));
        let state = AnalysisState::builder()
            .symbols(["AAPL", "TSLA"])
            .market_news("AAPL : Bullish")
            .fundamentals(
                "",
                BTreeMap::from([("AAPL".to_string(), BTreeMap::new())]),
            )
            .build();

        let state = node.run(state).await.unwrap();
        assert_eq!(state.market_trends, "APPLE INC (AAPL) steady");

        let prompt = &model.requests()[0].prompt;
        assert!(prompt.contains("TSLA\n\nNo macro economic data available."));
        assert!(prompt.contains("AAPL : Bullish"));
    }
}
