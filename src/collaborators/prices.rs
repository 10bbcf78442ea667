//! Daily close history from the Yahoo Finance chart endpoint

use super::{check_status, http_client, PriceHistory};
use crate::error::{CollabResult, CollaboratorError};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

const CHART_BASE_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

pub struct YahooPrices {
    client: Client,
    base_url: String,
}

impl YahooPrices {
    pub fn new() -> CollabResult<Self> {
        Ok(Self {
            client: http_client()?,
            base_url: CHART_BASE_URL.to_string(),
        })
    }
}

#[async_trait]
impl PriceHistory for YahooPrices {
    async fn daily_closes(&self, symbol: &str) -> CollabResult<Vec<f64>> {
        let url = format!("{}/{}", self.base_url, symbol);
        let response = self
            .client
            .get(&url)
            .query(&[("range", "1y"), ("interval", "1d")])
            .header(reqwest::header::USER_AGENT, "Mozilla/5.0")
            .send()
            .await
            .map_err(|e| CollaboratorError::Request(format!("chart request failed: {}", e)))?;

        let chart: ChartResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| CollaboratorError::Parse(format!("chart response: {}", e)))?;

        closes_from_chart(chart)
    }
}

fn closes_from_chart(chart: ChartResponse) -> CollabResult<Vec<f64>> {
    if let Some(error) = chart.chart.error {
        return Err(CollaboratorError::Request(error.to_string()));
    }

    let closes: Vec<f64> = chart
        .chart
        .result
        .unwrap_or_default()
        .into_iter()
        .next()
        .and_then(|result| result.indicators.quote.into_iter().next())
        .map(|quote| quote.close.into_iter().flatten().collect())
        .unwrap_or_default();

    if closes.is_empty() {
        return Err(CollaboratorError::EmptyResponse);
    }
    Ok(closes)
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closes_skip_missing_days() {
        let raw = r#"{"chart": {"result": [{"meta": {}, "indicators": {"quote": [{"close": [101.5, null, 102.25]}]}}], "error": null}}"#;
        let chart: ChartResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(closes_from_chart(chart).unwrap(), vec![101.5, 102.25]);
    }

    #[test]
    fn test_chart_error() {
        let raw = r#"{"chart": {"result": null, "error": {"code": "Not Found", "description": "No data found"}}}"#;
        let chart: ChartResponse = serde_json::from_str(raw).unwrap();
        assert!(matches!(
            closes_from_chart(chart),
            Err(CollaboratorError::Request(_))
        ));
    }
}
