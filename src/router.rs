//! Conditional router
//!
//! Pure, total mapping from the discriminator to the terminal node.

use crate::models::Usage;
use crate::state::AnalysisState;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a run goes after synthesis.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Advice,
    Strategy,
    /// Explicit halt: the request is not about investing.
    NotApplicable,
}

impl Route {
    /// Name of the terminal node this route dispatches to.
    pub fn node_name(&self) -> Option<&'static str> {
        match self {
            Route::Advice => Some("advice"),
            Route::Strategy => Some("strategy"),
            Route::NotApplicable => None,
        }
    }
}

pub fn route(usage: Option<Usage>) -> Route {
    match usage {
        Some(Usage::Advice) => Route::Advice,
        Some(Usage::Strategy) => Route::Strategy,
        Some(Usage::Invalid) | None => Route::NotApplicable,
    }
}

pub fn route_state(state: &AnalysisState) -> Route {
    route(state.usage)
}

/// Routes a raw discriminator string; unknown values map to `NotApplicable`.
pub fn route_raw(raw: &str) -> Route {
    route(Some(Usage::parse(raw)))
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.node_name().unwrap_or("not_applicable"))
    }
}
