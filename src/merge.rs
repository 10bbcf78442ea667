//! Fan-in: reconcile the pre-fork state with both branch results
//!
//! Field ownership:
//! - pass-through (query, usage, symbols, profile, portfolio): pre-fork state
//! - news, news_by_symbol, market_news: news branch
//! - fundamentals, metrics_by_symbol: fundamentals branch
//!
//! A failed branch contributes defaults. A result in the wrong slot, from
//! another run, or with an altered symbol set is a `MergeInvariant` error.

use crate::error::{PipelineError, Result};
use crate::executor::{BranchKind, BranchResult};
use crate::state::AnalysisState;

pub fn merge(
    pre_fork: &AnalysisState,
    news: BranchResult,
    fundamentals: BranchResult,
) -> Result<AnalysisState> {
    let news_state = checked(pre_fork, news, BranchKind::News)?;
    let fundamentals_state = checked(pre_fork, fundamentals, BranchKind::Fundamentals)?;

    let mut merged = pre_fork.clone();
    merged.reset_news_fields();
    merged.reset_fundamentals_fields();

    if let Some(branch) = news_state {
        merged.news = branch.news;
        merged.news_by_symbol = branch.news_by_symbol;
        merged.market_news = branch.market_news;
    }
    if let Some(branch) = fundamentals_state {
        merged.fundamentals = branch.fundamentals;
        merged.metrics_by_symbol = branch.metrics_by_symbol;
    }

    Ok(merged)
}

fn checked(
    pre_fork: &AnalysisState,
    result: BranchResult,
    slot: BranchKind,
) -> Result<Option<AnalysisState>> {
    if result.kind != slot {
        return Err(PipelineError::MergeInvariant(format!(
            "{} result delivered to the {} slot",
            result.kind, slot
        )));
    }
    if result.run_id != pre_fork.run_id {
        return Err(PipelineError::MergeInvariant(format!(
            "{} result belongs to run {}, expected {}",
            slot, result.run_id, pre_fork.run_id
        )));
    }

    let Some(state) = result.state else {
        return Ok(None);
    };
    if state.run_id != pre_fork.run_id {
        return Err(PipelineError::MergeInvariant(format!(
            "{} state carries run {}, expected {}",
            slot, state.run_id, pre_fork.run_id
        )));
    }
    if state.symbols() != pre_fork.symbols() {
        return Err(PipelineError::MergeInvariant(format!(
            "{} branch altered the symbol set",
            slot
        )));
    }
    Ok(Some(state))
}
