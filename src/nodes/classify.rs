//! Classification: sets the discriminator and seeds the symbol set

use super::{FailurePolicy, Node};
use crate::collaborators::{with_timeout, Classifier};
use crate::error::{PipelineError, Result};
use crate::state::{is_valid_symbol, AnalysisState};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct ClassifyNode {
    classifier: Arc<dyn Classifier>,
    timeout: Duration,
}

impl ClassifyNode {
    pub fn new(classifier: Arc<dyn Classifier>, timeout: Duration) -> Self {
        Self {
            classifier,
            timeout,
        }
    }
}

#[async_trait]
impl Node for ClassifyNode {
    fn name(&self) -> &'static str {
        "classify"
    }

    fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::Propagating
    }

    async fn run(&self, mut state: AnalysisState) -> Result<AnalysisState> {
        let classification = with_timeout(
            self.timeout,
            "classify",
            self.classifier.classify(&state.query),
        )
        .await
        .map_err(PipelineError::Classification)?;

        let (valid, rejected): (Vec<String>, Vec<String>) = classification
            .symbols
            .into_iter()
            .partition(|symbol| is_valid_symbol(symbol));
        if !rejected.is_empty() {
            debug!(run_id = %state.run_id, ?rejected, "Dropped malformed classifier symbols");
        }

        // Caller hints come first.
        let hints = state.symbols().to_vec();
        state.usage = Some(classification.usage);
        state.set_classified_symbols(hints.into_iter().chain(valid));

        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::mock::StaticClassifier;
    use crate::models::Usage;

    #[tokio::test]
    async fn test_hints_precede_classified_symbols() {
        let node = ClassifyNode::new(
            Arc::new(StaticClassifier::new(Usage::Advice, ["tsla", "AAPL", "Apple Inc"])),
            Duration::from_secs(1),
        );
        let state = AnalysisState::builder().query("q").symbols(["AAPL"]).build();

        let state = node.run(state).await.unwrap();
        assert_eq!(state.usage, Some(Usage::Advice));
        assert_eq!(state.symbols(), ["AAPL", "TSLA"]);
    }

    #[tokio::test]
    async fn test_classifier_failure() {
        let node = ClassifyNode::new(Arc::new(StaticClassifier::failing()), Duration::from_secs(1));
        let err = node
            .run(AnalysisState::builder().query("q").build())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Classification(_)));
    }
}
