//! Finnhub client: company news and basic financials
//!
//! Basic financials come back as one flat metric map; [`METRIC_CATALOG`]
//! groups the metrics the pipeline reports into labelled categories.

use super::{check_status, http_client, FundamentalsProvider, NewsProvider};
use crate::error::{CollabResult, CollaboratorError};
use crate::models::{DateRange, MetricsByCategory};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

const FINNHUB_BASE_URL: &str = "https://finnhub.io/api/v1";

/// Category -> (Finnhub metric key, label)
pub const METRIC_CATALOG: &[(&str, &[(&str, &str)])] = &[
    (
        "Valuation",
        &[
            ("peTTM", "Price to Earnings (Trailing Twelve Months)"),
            ("pb", "Price to Book Ratio"),
            ("psTTM", "Price to Sales (Trailing Twelve Months)"),
            ("pfcfShareTTM", "Price to Free Cash Flow per Share (TTM)"),
        ],
    ),
    (
        "Growth",
        &[
            ("revenueGrowthTTMYoy", "Revenue Growth Year-over-Year (TTM)"),
            ("revenueGrowth5Y", "Revenue Growth (5-Year CAGR)"),
            ("epsGrowthTTMYoy", "Earnings Per Share Growth YoY (TTM)"),
            ("epsGrowth5Y", "Earnings Per Share Growth (5-Year CAGR)"),
            ("focfCagr5Y", "Free Operating Cash Flow CAGR (5-Year)"),
            ("capexCagr5Y", "Capital Expenditure CAGR (5-Year)"),
            ("tbvCagr5Y", "Tangible Book Value CAGR (5-Year)"),
        ],
    ),
    (
        "Profitability",
        &[
            ("grossMarginTTM", "Gross Margin (TTM)"),
            ("netProfitMarginTTM", "Net Profit Margin (TTM)"),
            ("operatingMarginTTM", "Operating Margin (TTM)"),
            ("pretaxMarginTTM", "Pre-Tax Profit Margin (TTM)"),
            ("epsTTM", "Earnings Per Share (TTM)"),
        ],
    ),
    (
        "Efficiency",
        &[
            ("inventoryTurnoverTTM", "Inventory Turnover (TTM)"),
            ("receivablesTurnoverTTM", "Receivables Turnover (TTM)"),
            ("assetTurnoverTTM", "Asset Turnover (TTM)"),
        ],
    ),
    (
        "Returns",
        &[
            ("roeTTM", "Return on Equity (TTM)"),
            ("roaTTM", "Return on Assets (TTM)"),
            ("roiTTM", "Return on Investment (TTM)"),
        ],
    ),
    (
        "FinancialHealth",
        &[
            ("currentRatioQuarterly", "Current Ratio (Quarterly)"),
            ("quickRatioQuarterly", "Quick Ratio (Quarterly)"),
            ("longTermDebt/equityQuarterly", "Long-Term Debt to Equity Ratio (Quarterly)"),
            ("totalDebt/totalEquityQuarterly", "Total Debt to Total Equity Ratio (Quarterly)"),
            ("netInterestCoverageTTM", "Net Interest Coverage (TTM)"),
        ],
    ),
    (
        "RiskVolatility",
        &[
            ("beta", "Beta (Volatility Relative to Market)"),
            ("3MonthADReturnStd", "3-Month Average Daily Return Standard Deviation"),
        ],
    ),
    (
        "Momentum",
        &[
            ("52WeekPriceReturnDaily", "52-Week Price Return (Daily)"),
            ("26WeekPriceReturnDaily", "26-Week Price Return (Daily)"),
            ("13WeekPriceReturnDaily", "13-Week Price Return (Daily)"),
            ("5DayPriceReturnDaily", "5-Day Price Return (Daily)"),
            ("priceRelativeToS&P50013Week", "Price Relative to S&P 500 (13-Week)"),
            ("priceRelativeToS&P500Ytd", "Price Relative to S&P 500 (Year-to-Date)"),
        ],
    ),
    (
        "Dividends",
        &[
            ("dividendYieldIndicatedAnnual", "Dividend Yield (Indicated Annual)"),
            ("dividendGrowthRate5Y", "Dividend Growth Rate (5-Year)"),
            ("payoutRatioTTM", "Payout Ratio (TTM)"),
        ],
    ),
    (
        "KeyFigures",
        &[
            ("marketCapitalization", "Market Capitalization"),
            ("enterpriseValue", "Enterprise Value"),
            ("bookValuePerShareQuarterly", "Book Value Per Share (Quarterly)"),
            ("cashFlowPerShareTTM", "Cash Flow Per Share (TTM)"),
            ("revenuePerShareTTM", "Revenue Per Share (TTM)"),
        ],
    ),
];

/// Group a flat metric map by [`METRIC_CATALOG`]. Missing or non-numeric
/// metrics are kept as `None`.
pub fn categorize(metric: &Map<String, Value>) -> MetricsByCategory {
    METRIC_CATALOG
        .iter()
        .map(|(category, fields)| {
            let values: BTreeMap<String, Option<f64>> = fields
                .iter()
                .map(|(key, label)| {
                    let value = metric.get(*key).and_then(Value::as_f64);
                    (label.to_string(), value)
                })
                .collect();
            (category.to_string(), values)
        })
        .collect()
}

pub struct FinnhubClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl FinnhubClient {
    pub fn new(api_key: String) -> CollabResult<Self> {
        if api_key.trim().is_empty() {
            return Err(CollaboratorError::NotConfigured("FINNHUB_API".to_string()));
        }
        Ok(Self {
            client: http_client()?,
            api_key,
            base_url: FINNHUB_BASE_URL.to_string(),
        })
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> CollabResult<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .query(query)
            .query(&[("token", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| CollaboratorError::Request(format!("Finnhub request failed for {}: {}", path, e)))?;

        check_status(response)
            .await?
            .json::<T>()
            .await
            .map_err(|e| CollaboratorError::Parse(format!("Finnhub response for {}: {}", path, e)))
    }
}

#[derive(Debug, Deserialize)]
struct NewsItem {
    #[serde(default)]
    summary: String,
}

#[derive(Debug, Deserialize)]
struct BasicFinancials {
    #[serde(default)]
    metric: Map<String, Value>,
}

#[async_trait]
impl NewsProvider for FinnhubClient {
    async fn company_news(
        &self,
        symbol: &str,
        range: DateRange,
        limit: usize,
    ) -> CollabResult<Vec<String>> {
        let items: Vec<NewsItem> = self
            .get(
                "/company-news",
                &[
                    ("symbol", symbol.to_string()),
                    ("from", range.from.format("%Y-%m-%d").to_string()),
                    ("to", range.to.format("%Y-%m-%d").to_string()),
                ],
            )
            .await?;

        debug!(symbol, articles = items.len(), "Finnhub company news");

        Ok(items
            .into_iter()
            .map(|item| item.summary.trim().to_string())
            .filter(|summary| !summary.is_empty())
            .take(limit)
            .collect())
    }
}

#[async_trait]
impl FundamentalsProvider for FinnhubClient {
    async fn fundamentals(&self, symbol: &str) -> CollabResult<MetricsByCategory> {
        let financials: BasicFinancials = self
            .get(
                "/stock/metric",
                &[("symbol", symbol.to_string()), ("metric", "all".to_string())],
            )
            .await?;

        // Unknown symbols come back with an empty metric object.
        if financials.metric.is_empty() {
            return Err(CollaboratorError::EmptyResponse);
        }
        Ok(categorize(&financials.metric))
    }
}
