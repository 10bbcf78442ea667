//! Enrichment branches and their results

use crate::nodes::{invoke, Node};
use crate::state::AnalysisState;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchKind {
    /// Branch A: news acquisition then sentiment
    News,
    /// Branch B: fundamentals and indicators
    Fundamentals,
}

impl fmt::Display for BranchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BranchKind::News => f.write_str("news"),
            BranchKind::Fundamentals => f.write_str("fundamentals"),
        }
    }
}

/// Ordered nodes run against one private copy of the pre-fork state.
pub struct Branch {
    kind: BranchKind,
    nodes: Vec<Arc<dyn Node>>,
}

impl Branch {
    pub fn new(kind: BranchKind, nodes: Vec<Arc<dyn Node>>) -> Self {
        Self { kind, nodes }
    }

    pub fn kind(&self) -> BranchKind {
        self.kind
    }

    /// Never fails: a propagated node error becomes a failed result.
    pub async fn execute(&self, state: AnalysisState) -> BranchResult {
        let run_id = state.run_id;
        let mut current = state;

        for node in &self.nodes {
            current = match invoke(node.as_ref(), current).await {
                Ok(next) => next,
                Err(err) => {
                    warn!(run_id = %run_id, branch = %self.kind, node = node.name(), error = %err, "Branch failed");
                    return BranchResult::failed(self.kind, run_id, err.to_string());
                }
            };
        }

        debug!(run_id = %run_id, branch = %self.kind, "Branch completed");
        BranchResult::completed(self.kind, current)
    }
}

/// Outcome of one branch. `state` is `None` when the branch failed as a whole.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchResult {
    pub kind: BranchKind,
    pub run_id: Uuid,
    pub state: Option<AnalysisState>,
    pub error: Option<String>,
}

impl BranchResult {
    pub fn completed(kind: BranchKind, state: AnalysisState) -> Self {
        Self {
            kind,
            run_id: state.run_id,
            state: Some(state),
            error: None,
        }
    }

    pub fn failed(kind: BranchKind, run_id: Uuid, error: impl Into<String>) -> Self {
        Self {
            kind,
            run_id,
            state: None,
            error: Some(error.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// `ok` or `failed(<reason>)`, for the run trace.
    pub fn status(&self) -> String {
        match &self.error {
            None => "ok".to_string(),
            Some(err) => format!("failed({})", err),
        }
    }
}
