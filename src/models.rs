//! Core data models shared across the pipeline

use chrono::{Duration, NaiveDate, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

//
// ================= Enums =================
//

/// Discriminator set by classification.
///
/// Closed world: anything that is not `advice` or `strategy` is `Invalid`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(from = "String", into = "String")]
pub enum Usage {
    Advice,
    Strategy,
    Invalid,
}

impl Usage {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "advice" => Usage::Advice,
            "strategy" => Usage::Strategy,
            _ => Usage::Invalid,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Usage::Advice => "advice",
            Usage::Strategy => "strategy",
            Usage::Invalid => "invalid",
        }
    }
}

impl From<String> for Usage {
    fn from(raw: String) -> Self {
        Usage::parse(&raw)
    }
}

impl From<Usage> for String {
    fn from(usage: Usage) -> Self {
        usage.as_str().to_string()
    }
}

/// Stages of one pipeline run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Entry,
    Classifying,
    Enriching,
    Merging,
    Synthesizing,
    Routing,
    Generating,
    Done,
    Failed,
}

/// How the advice node shapes its output.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AdviceFormat {
    #[default]
    Narrative,
    Forecast,
}

impl AdviceFormat {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "narrative" => Some(AdviceFormat::Narrative),
            "forecast" => Some(AdviceFormat::Forecast),
            _ => None,
        }
    }
}

//
// ================= Investor Profile =================
//

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct InvestorProfile {
    pub age: Option<u32>,
    pub job_type: String,
    pub job: String,
    pub monthly_income: Option<f64>,
    pub side_income: Option<f64>,
    pub investment_goal: String,
    pub investment_duration: String,
    /// 0 (risk averse) to 1 (aggressive)
    pub risk_preference: Option<f64>,
    pub investing_years: Option<u32>,
    pub retirement_age: Option<u32>,
    pub marital_status: String,
    pub children: Option<u32>,
}

impl InvestorProfile {
    pub fn is_empty(&self) -> bool {
        *self == InvestorProfile::default()
    }

    pub fn total_monthly_income(&self) -> f64 {
        self.monthly_income.unwrap_or(0.0) + self.side_income.unwrap_or(0.0)
    }
}

//
// ================= Market Data =================
//

/// Metric label -> value, grouped by category (Valuation, Growth, ..., Today).
pub type MetricsByCategory = BTreeMap<String, BTreeMap<String, Option<f64>>>;

/// Inclusive calendar window used for news lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    /// Window ending today (UTC) and reaching back `days`.
    pub fn trailing_days(days: u32) -> Self {
        let to = Utc::now().date_naive();
        Self {
            from: to - Duration::days(i64::from(days)),
            to,
        }
    }
}

//
// ================= Advice Forecast =================
//

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct PriceForecast {
    pub day1: Option<f64>,
    pub day3: Option<f64>,
    pub day7: Option<f64>,
}

/// Structured advice record requested in `AdviceFormat::Forecast`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct AdviceForecast {
    pub advice: String,
    #[serde(default)]
    pub forecasts: BTreeMap<String, PriceForecast>,
}

impl fmt::Display for Usage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Entry => "ENTRY",
            Stage::Classifying => "CLASSIFY",
            Stage::Enriching => "ENRICH",
            Stage::Merging => "MERGE",
            Stage::Synthesizing => "SYNTHESIZE",
            Stage::Routing => "ROUTE",
            Stage::Generating => "GENERATE",
            Stage::Done => "DONE",
            Stage::Failed => "FAILED",
        };
        f.write_str(s)
    }
}
