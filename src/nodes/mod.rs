//! Pipeline nodes
//!
//! A node transforms one [`AnalysisState`] copy, calling only its declared
//! collaborators. Each node declares a failure policy:
//! - `Isolating`: a failure resets the node's owned fields and the run continues
//! - `Propagating`: a failure ends the run

pub mod advice;
pub mod classify;
pub mod fundamentals;
pub mod news;
pub mod portfolio;
pub mod sentiment;
pub mod strategy;
pub mod synthesis;

pub use advice::AdviceNode;
pub use classify::ClassifyNode;
pub use fundamentals::FundamentalsNode;
pub use news::NewsNode;
pub use portfolio::PortfolioNode;
pub use sentiment::SentimentNode;
pub use strategy::StrategyNode;
pub use synthesis::SynthesisNode;

use crate::error::Result;
use crate::state::AnalysisState;
use async_trait::async_trait;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    Isolating,
    Propagating,
}

#[async_trait]
pub trait Node: Send + Sync {
    fn name(&self) -> &'static str;

    fn failure_policy(&self) -> FailurePolicy;

    async fn run(&self, state: AnalysisState) -> Result<AnalysisState>;

    /// Reset owned fields after an isolated failure.
    fn degrade(&self, state: AnalysisState) -> AnalysisState {
        state
    }
}

/// Run `node`, applying its failure policy.
///
/// Isolating nodes degrade from the state they were given, so a partial
/// write made before the failure never survives.
pub async fn invoke(node: &dyn Node, state: AnalysisState) -> Result<AnalysisState> {
    let run_id = state.run_id;
    let fallback = match node.failure_policy() {
        FailurePolicy::Isolating => Some(state.clone()),
        FailurePolicy::Propagating => None,
    };

    debug!(run_id = %run_id, node = node.name(), "Running node");

    match (node.run(state).await, fallback) {
        (Ok(next), _) => Ok(next),
        (Err(err), Some(fallback)) => {
            warn!(
                run_id = %run_id,
                node = node.name(),
                error = %err,
                "Node failed, owned fields degraded to defaults"
            );
            Ok(node.degrade(fallback))
        }
        (Err(err), None) => {
            error!(run_id = %run_id, node = node.name(), error = %err, "Node failed");
            Err(err)
        }
    }
}

/// Remove markdown bold markers from generated narrative.
pub(crate) fn strip_bold(text: &str) -> String {
    text.replace("**", "")
}

/// `[AAPL, TSLA]`
pub(crate) fn symbol_list(symbols: &[String]) -> String {
    format!("[{}]", symbols.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CollaboratorError, PipelineError};

    struct FailingNode {
        policy: FailurePolicy,
    }

    #[async_trait]
    impl Node for FailingNode {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn failure_policy(&self) -> FailurePolicy {
            self.policy
        }

        async fn run(&self, mut state: AnalysisState) -> Result<AnalysisState> {
            state.news = "partial write".to_string();
            Err(PipelineError::Collaborator {
                node: "failing",
                source: CollaboratorError::EmptyResponse,
            })
        }

        fn degrade(&self, mut state: AnalysisState) -> AnalysisState {
            state.reset_news_fields();
            state
        }
    }

    #[tokio::test]
    async fn test_isolating_failure_degrades() {
        let node = FailingNode {
            policy: FailurePolicy::Isolating,
        };
        let state = AnalysisState::builder().query("q").symbols(["AAPL"]).build();

        let result = invoke(&node, state.clone()).await.unwrap();
        assert_eq!(result, state);
    }

    #[tokio::test]
    async fn test_propagating_failure_surfaces() {
        let node = FailingNode {
            policy: FailurePolicy::Propagating,
        };
        let state = AnalysisState::builder().query("q").build();

        assert!(invoke(&node, state).await.is_err());
    }

    #[test]
    fn test_strip_bold() {
        assert_eq!(strip_bold("**AAPL** looks **strong**"), "AAPL looks strong");
    }
}
