//! Sentiment narrative over the fetched news (branch A, second stage)

use super::{symbol_list, FailurePolicy, Node};
use crate::collaborators::{GenerationTask, Generator};
use crate::error::{PipelineError, Result};
use crate::state::AnalysisState;
use async_trait::async_trait;

pub struct SentimentNode {
    generator: Generator,
}

impl SentimentNode {
    pub fn new(generator: Generator) -> Self {
        Self { generator }
    }
}

fn sentiment_prompt(state: &AnalysisState) -> String {
    format!(
        r#"Choose a combined sentiment that best represents these news articles:

```
{news}
```

Each article is separated by `---`.

Score each stock between -1 and 1:
x <= -0.35: Bearish
-0.35 < x <= -0.15: Somewhat-Bearish
-0.15 < x < 0.15: Neutral
0.15 <= x < 0.35: Somewhat-Bullish
x >= 0.35: Bullish

Reply only with the sentiment and a one or two sentence explanation for each stock in {symbols}, formatted as:

------
SYMBOL (Company Name) : SENTIMENT (x)
explanation
------

Keep the investor's question in mind: {query}"#,
        news = state.news,
        symbols = symbol_list(state.symbols()),
        query = state.query,
    )
}

#[async_trait]
impl Node for SentimentNode {
    fn name(&self) -> &'static str {
        "sentiment"
    }

    fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::Isolating
    }

    async fn run(&self, mut state: AnalysisState) -> Result<AnalysisState> {
        if state.news.trim().is_empty() {
            state.market_news.clear();
            return Ok(state);
        }

        state.market_news = self
            .generator
            .text(GenerationTask::Sentiment, sentiment_prompt(&state))
            .await
            .map_err(|source| PipelineError::Collaborator {
                node: "sentiment",
                source,
            })?;
        Ok(state)
    }

    fn degrade(&self, mut state: AnalysisState) -> AnalysisState {
        state.market_news.clear();
        state
    }
}
