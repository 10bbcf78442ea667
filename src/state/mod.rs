//! Analysis state threaded through every pipeline stage
//!
//! Text and mapping fields always hold a value (possibly empty), never a
//! missing one. The symbol set is private: classification seeds it and only
//! the portfolio node may append to it.

use crate::models::{AdviceForecast, InvestorProfile, MetricsByCategory, PriceForecast, Usage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Longest accepted ticker, e.g. `BRK.B` or `RELIANCE.NS`.
pub const MAX_SYMBOL_LEN: usize = 12;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisState {
    pub run_id: Uuid,
    pub query: String,
    pub usage: Option<Usage>,
    symbols: Vec<String>,
    pub profile: InvestorProfile,

    // Portfolio node
    pub portfolio: String,

    // News branch
    pub news: String,
    pub news_by_symbol: BTreeMap<String, Vec<String>>,
    pub market_news: String,

    // Fundamentals branch
    pub fundamentals: String,
    pub metrics_by_symbol: BTreeMap<String, MetricsByCategory>,

    // Synthesis
    pub market_trends: String,

    // Terminal nodes
    pub advice: String,
    pub advice_forecast: BTreeMap<String, PriceForecast>,
    pub strategy: String,
}

impl AnalysisState {
    pub fn builder() -> AnalysisStateBuilder {
        AnalysisStateBuilder::default()
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// Replace the symbol set with the classification result.
    pub(crate) fn set_classified_symbols<I, S>(&mut self, symbols: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.symbols = normalize_symbols(symbols);
    }

    /// Append inferred symbols, keeping existing order and uniqueness.
    pub(crate) fn append_inferred_symbols<I, S>(&mut self, symbols: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let before = self.symbols.len();
        let combined: Vec<String> = self
            .symbols
            .iter()
            .cloned()
            .chain(symbols.into_iter().map(|s| s.as_ref().to_string()))
            .collect();
        self.symbols = normalize_symbols(combined);
        self.symbols.len() - before
    }

    pub fn reset_news_fields(&mut self) {
        self.news.clear();
        self.news_by_symbol.clear();
        self.market_news.clear();
    }

    pub fn reset_fundamentals_fields(&mut self) {
        self.fundamentals.clear();
        self.metrics_by_symbol.clear();
    }

    pub fn has_enrichment(&self) -> bool {
        !self.news_by_symbol.is_empty()
            || !self.market_news.trim().is_empty()
            || !self.metrics_by_symbol.is_empty()
    }

    pub(crate) fn apply_forecast(&mut self, forecast: AdviceForecast) {
        self.advice = forecast.advice;
        self.advice_forecast = normalize_forecast_keys(forecast.forecasts);
    }
}

/// Partial initialisation; every field left unset takes its empty default.
#[derive(Debug, Default)]
pub struct AnalysisStateBuilder {
    state: AnalysisState,
}

impl AnalysisStateBuilder {
    pub fn run_id(mut self, run_id: Uuid) -> Self {
        self.state.run_id = run_id;
        self
    }

    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.state.query = query.into();
        self
    }

    pub fn usage(mut self, usage: Usage) -> Self {
        self.state.usage = Some(usage);
        self
    }

    pub fn symbols<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.state.symbols = normalize_symbols(symbols);
        self
    }

    pub fn profile(mut self, profile: InvestorProfile) -> Self {
        self.state.profile = profile;
        self
    }

    pub fn portfolio(mut self, portfolio: impl Into<String>) -> Self {
        self.state.portfolio = portfolio.into();
        self
    }

    pub fn news(mut self, news: impl Into<String>, by_symbol: BTreeMap<String, Vec<String>>) -> Self {
        self.state.news = news.into();
        self.state.news_by_symbol = by_symbol;
        self
    }

    pub fn market_news(mut self, market_news: impl Into<String>) -> Self {
        self.state.market_news = market_news.into();
        self
    }

    pub fn fundamentals(
        mut self,
        text: impl Into<String>,
        by_symbol: BTreeMap<String, MetricsByCategory>,
    ) -> Self {
        self.state.fundamentals = text.into();
        self.state.metrics_by_symbol = by_symbol;
        self
    }

    pub fn market_trends(mut self, market_trends: impl Into<String>) -> Self {
        self.state.market_trends = market_trends.into();
        self
    }

    pub fn build(self) -> AnalysisState {
        self.state
    }
}

/// Trim, upper-case and de-duplicate, preserving first occurrence.
pub fn normalize_symbols<I, S>(symbols: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for raw in symbols {
        let symbol = raw.as_ref().trim().trim_start_matches('$').to_ascii_uppercase();
        if symbol.is_empty() || out.contains(&symbol) {
            continue;
        }
        out.push(symbol);
    }
    out
}

pub fn is_valid_symbol(symbol: &str) -> bool {
    let symbol = symbol.trim();
    !symbol.is_empty()
        && symbol.len() <= MAX_SYMBOL_LEN
        && symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '='))
}

fn normalize_forecast_keys(
    forecasts: BTreeMap<String, PriceForecast>,
) -> BTreeMap<String, PriceForecast> {
    forecasts
        .into_iter()
        .map(|(symbol, forecast)| (symbol.trim().to_ascii_uppercase(), forecast))
        .collect()
}
