//! Fundamentals and technical indicators (branch B)
//!
//! A failure for one symbol skips that symbol only; the node itself never
//! fails on a single bad ticker.

use super::{FailurePolicy, Node};
use crate::collaborators::{with_timeout, FundamentalsProvider, PriceHistory};
use crate::error::Result;
use crate::indicators::IndicatorSnapshot;
use crate::models::MetricsByCategory;
use crate::state::AnalysisState;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const TODAY_CATEGORY: &str = "Today";
const SECTION_RULE: &str = "----------------------";

pub struct FundamentalsNode {
    provider: Arc<dyn FundamentalsProvider>,
    prices: Option<Arc<dyn PriceHistory>>,
    timeout: Duration,
}

impl FundamentalsNode {
    pub fn new(
        provider: Arc<dyn FundamentalsProvider>,
        prices: Option<Arc<dyn PriceHistory>>,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            prices,
            timeout,
        }
    }

    async fn today(&self, state: &AnalysisState, symbol: &str) -> Option<BTreeMap<String, Option<f64>>> {
        let prices = self.prices.as_ref()?;
        match with_timeout(self.timeout, "prices", prices.daily_closes(symbol)).await {
            Ok(closes) => Some(IndicatorSnapshot::compute(&closes).to_metrics()),
            Err(err) => {
                warn!(run_id = %state.run_id, symbol, error = %err, "Price history unavailable");
                None
            }
        }
    }
}

#[async_trait]
impl Node for FundamentalsNode {
    fn name(&self) -> &'static str {
        "fundamentals"
    }

    fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::Isolating
    }

    async fn run(&self, mut state: AnalysisState) -> Result<AnalysisState> {
        let mut by_symbol: BTreeMap<String, MetricsByCategory> = BTreeMap::new();

        for symbol in state.symbols() {
            let fetched = with_timeout(self.timeout, "fundamentals", self.provider.fundamentals(symbol)).await;
            let mut metrics = match fetched {
                Ok(metrics) => metrics,
                Err(err) => {
                    warn!(run_id = %state.run_id, symbol = %symbol, error = %err, "Skipping symbol without fundamentals");
                    continue;
                }
            };

            if let Some(today) = self.today(&state, symbol).await {
                metrics.insert(TODAY_CATEGORY.to_string(), today);
            }

            debug!(run_id = %state.run_id, symbol = %symbol, categories = metrics.len(), "Fetched fundamentals");
            by_symbol.insert(symbol.clone(), metrics);
        }

        let covered: Vec<String> = state
            .symbols()
            .iter()
            .filter(|s| by_symbol.contains_key(*s))
            .cloned()
            .collect();

        state.fundamentals = render_economics(&covered, &by_symbol);
        state.metrics_by_symbol = by_symbol;
        Ok(state)
    }

    fn degrade(&self, mut state: AnalysisState) -> AnalysisState {
        state.reset_fundamentals_fields();
        state
    }
}

/// One block per symbol; symbols without data get a placeholder line.
pub fn render_economics(symbols: &[String], metrics: &BTreeMap<String, MetricsByCategory>) -> String {
    let mut out = String::new();
    for symbol in symbols {
        let _ = writeln!(out, "{}", SECTION_RULE);
        let _ = writeln!(out, "{}\n", symbol);

        match metrics.get(symbol) {
            None => {
                let _ = writeln!(out, "No macro economic data available.");
            }
            Some(categories) => {
                for (category, values) in categories {
                    let _ = writeln!(out, "{} :", category);
                    for (label, value) in values {
                        let _ = writeln!(out, "\t{} : {}", label, format_value(*value));
                    }
                    out.push('\n');
                }
            }
        }
        let _ = writeln!(out, "{}", SECTION_RULE);
    }
    out
}

fn format_value(value: Option<f64>) -> String {
    match value {
        Some(v) if v.fract() == 0.0 && v.abs() < 1e15 => format!("{}", v as i64),
        Some(v) => format!("{:.4}", v),
        None => "n/a".to_string(),
    }
}
