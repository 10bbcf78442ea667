//! Strategy terminal node

use super::{symbol_list, FailurePolicy, Node};
use crate::collaborators::{GenerationTask, Generator};
use crate::error::{PipelineError, Result};
use crate::state::AnalysisState;
use async_trait::async_trait;

pub struct StrategyNode {
    generator: Generator,
}

impl StrategyNode {
    pub fn new(generator: Generator) -> Self {
        Self { generator }
    }
}

fn strategy_prompt(state: &AnalysisState) -> String {
    let symbols = symbol_list(state.symbols());
    format!(
        r#"You are a financial strategist with expertise in equity markets, valuation, macroeconomics and technical analysis.

The investor asked: "{query}"

Market report:
```
{trends}
```

Economic data for each stock:
```
{fundamentals}
```

Market news sentiment for each stock, separated by "------":
```
{sentiment}
```

Investor portfolio:
```
{portfolio}
```

Give a strategy specific to this investor for distributing their portfolio across {symbols} to maximise returns with minimal risk, with reasoning."#,
        query = state.query,
        trends = state.market_trends,
        fundamentals = state.fundamentals,
        sentiment = state.market_news,
        portfolio = state.portfolio,
        symbols = symbols,
    )
}

#[async_trait]
impl Node for StrategyNode {
    fn name(&self) -> &'static str {
        "strategy"
    }

    fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::Propagating
    }

    async fn run(&self, mut state: AnalysisState) -> Result<AnalysisState> {
        state.strategy = self
            .generator
            .text(GenerationTask::Strategy, strategy_prompt(&state))
            .await
            .map_err(|source| PipelineError::Generation {
                node: "strategy",
                source,
            })?;
        Ok(state)
    }
}
