//! Advice terminal node

use super::{strip_bold, symbol_list, FailurePolicy, Node};
use crate::collaborators::{GenerationTask, Generator};
use crate::error::{CollaboratorError, PipelineError, Result};
use crate::models::{AdviceForecast, AdviceFormat};
use crate::state::AnalysisState;
use async_trait::async_trait;

const FORECAST_INSTRUCTIONS: &str = "You are a financial strategist. Using the economic data, \
market report and sentiment provided, advise the investor for the coming day, the coming 3 days \
and the coming week, with reasoning, in `advice`. In `forecasts`, give for each stock symbol the \
predicted closing price for day 1, day 3 and day 7, or null when no estimate can be made.";

pub struct AdviceNode {
    generator: Generator,
    format: AdviceFormat,
}

impl AdviceNode {
    pub fn new(generator: Generator, format: AdviceFormat) -> Self {
        Self { generator, format }
    }

    fn generation_error(source: CollaboratorError) -> PipelineError {
        PipelineError::Generation {
            node: "advice",
            source,
        }
    }
}

fn advice_context(state: &AnalysisState) -> String {
    format!(
        r#"Stocks: {symbols}

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

Investor question: {query}"#,
        symbols = symbol_list(state.symbols()),
        trends = state.market_trends,
        fundamentals = state.fundamentals,
        sentiment = state.market_news,
        query = state.query,
    )
}

fn narrative_prompt(state: &AnalysisState) -> String {
    format!(
        "You are a financial strategist with expertise in equity markets, valuation, \
         macroeconomics and technical analysis.\n\n{}\n\nAdvise the investor for the coming day, \
         the coming 3 days and the coming week, with reasoning.",
        advice_context(state)
    )
}

#[async_trait]
impl Node for AdviceNode {
    fn name(&self) -> &'static str {
        "advice"
    }

    fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::Propagating
    }

    async fn run(&self, mut state: AnalysisState) -> Result<AnalysisState> {
        match self.format {
            AdviceFormat::Narrative => {
                let advice = self
                    .generator
                    .text(GenerationTask::Advice, narrative_prompt(&state))
                    .await
                    .map_err(Self::generation_error)?;
                state.advice = strip_bold(&advice);
            }
            AdviceFormat::Forecast => {
                let record: AdviceForecast = self
                    .generator
                    .structured(GenerationTask::Advice, FORECAST_INSTRUCTIONS, &advice_context(&state))
                    .await
                    .map_err(Self::generation_error)?;

                if record.advice.trim().is_empty() {
                    return Err(Self::generation_error(CollaboratorError::EmptyResponse));
                }
                state.apply_forecast(AdviceForecast {
                    advice: strip_bold(&record.advice),
                    ..record
                });
            }
        }
        Ok(state)
    }
}
