//! Portfolio node (strategy route only, before the fork)
//!
//! Extracts an investor profile from the query when the request did not carry
//! one, appends any stocks the investor mentioned, and writes the portfolio
//! narrative. The only node allowed to grow the symbol set.

use super::{FailurePolicy, Node};
use crate::collaborators::{GenerationTask, Generator};
use crate::error::{CollaboratorError, PipelineError, Result};
use crate::models::InvestorProfile;
use crate::state::{is_valid_symbol, AnalysisState};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::debug;

const PROFILE_INSTRUCTIONS: &str = r#"Extract the investor profile from the user's query.

For text fields use "" when the query says nothing. For numeric fields use null when the query says nothing.
- age: the user's age, or an estimate from phrases like "young", "middle-aged", "retired"
- job_type: one of "private", "government", "semi private", "non profit", "business"
- job: job title
- monthly_income, side_income: monthly amounts
- investment_goal: e.g. "retirement", "wealth building"
- investment_duration: e.g. "short term", "12 years", "long term"
- risk_preference: 0 to 1; "risk-averse"/"low risk" ~0.2, "moderate" ~0.5, "aggressive"/"high risk" ~0.8
- investing_years: years of investing experience
- retirement_age: desired retirement age
- marital_status: e.g. "married", "single"
- children: number of children
- stocks: ticker symbols of any stocks the user is interested in, e.g. "AXP" for American Express"#;

#[derive(Debug, Deserialize, JsonSchema)]
struct ProfileExtraction {
    #[serde(flatten)]
    profile: InvestorProfile,
    #[serde(default)]
    stocks: Vec<String>,
}

pub struct PortfolioNode {
    generator: Generator,
}

impl PortfolioNode {
    pub fn new(generator: Generator) -> Self {
        Self { generator }
    }
}

fn or_unknown(value: &str) -> &str {
    if value.trim().is_empty() {
        "not stated"
    } else {
        value
    }
}

fn summary_prompt(profile: &InvestorProfile) -> String {
    let opt = |v: Option<u32>| v.map(|v| v.to_string()).unwrap_or_else(|| "not stated".to_string());
    let risk = profile
        .risk_preference
        .map(|r| format!("{:.2}", r))
        .unwrap_or_else(|| "not stated".to_string());

    format!(
        r#"Analyse the following investor profile and summarise their financial outlook, retirement strategy and risk assessment.

Personal information:
- Age: {age}
- Job type: {job_type}
- Job role: {job}
- Marital status: {marital}
- Number of children: {children}
- Years of investing experience: {years}
- Planned retirement age: {retirement}

Financial situation:
- Monthly income: {income:.2}
- Side income: {side:.2}
- Total monthly income: {total:.2}

Investment objectives:
- Goal: {goal}
- Duration: {duration}
- Risk preference (0 to 1): {risk}"#,
        age = opt(profile.age),
        job_type = or_unknown(&profile.job_type),
        job = or_unknown(&profile.job),
        marital = or_unknown(&profile.marital_status),
        children = profile.children.unwrap_or(0),
        years = profile.investing_years.unwrap_or(0),
        retirement = profile.retirement_age.unwrap_or(55),
        income = profile.monthly_income.unwrap_or(0.0),
        side = profile.side_income.unwrap_or(0.0),
        total = profile.total_monthly_income(),
        goal = or_unknown(&profile.investment_goal),
        duration = or_unknown(&profile.investment_duration),
        risk = risk,
    )
}

#[async_trait]
impl Node for PortfolioNode {
    fn name(&self) -> &'static str {
        "portfolio"
    }

    fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::Isolating
    }

    async fn run(&self, mut state: AnalysisState) -> Result<AnalysisState> {
        let to_error = |source: CollaboratorError| PipelineError::Collaborator {
            node: "portfolio",
            source,
        };

        let mut inferred = Vec::new();
        if state.profile.is_empty() {
            let extraction: ProfileExtraction = self
                .generator
                .structured(GenerationTask::ProfileExtraction, PROFILE_INSTRUCTIONS, &state.query)
                .await
                .map_err(to_error)?;
            state.profile = extraction.profile;
            inferred = extraction.stocks;
        }

        let summary = self
            .generator
            .text(GenerationTask::PortfolioSummary, summary_prompt(&state.profile))
            .await
            .map_err(to_error)?;

        let added = state.append_inferred_symbols(inferred.iter().filter(|s| is_valid_symbol(s)));
        debug!(run_id = %state.run_id, added, "Portfolio symbols appended");

        state.portfolio = summary;
        Ok(state)
    }

    fn degrade(&self, mut state: AnalysisState) -> AnalysisState {
        state.portfolio.clear();
        state
    }
}
