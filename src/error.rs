//! Error types for the market analysis pipeline

use crate::models::Stage;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Result of a single collaborator call
pub type CollabResult<T> = std::result::Result<T, CollaboratorError>;

#[derive(Error, Debug)]
pub enum PipelineError {

    // =============================
    // Core Pipeline Errors
    // =============================

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Classification failed: {0}")]
    Classification(#[source] CollaboratorError),

    #[error("{node} collaborator failed: {source}")]
    Collaborator {
        node: &'static str,
        #[source]
        source: CollaboratorError,
    },

    #[error("Merge invariant violated: {0}")]
    MergeInvariant(String),

    #[error("Generation failed in {node}: {source}")]
    Generation {
        node: &'static str,
        #[source]
        source: CollaboratorError,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Stage of the run in which this failure surfaced.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Validation(_) | PipelineError::Config(_) => Stage::Entry,
            PipelineError::Classification(_) => Stage::Classifying,
            PipelineError::MergeInvariant(_) => Stage::Merging,
            PipelineError::Generation { .. } => Stage::Generating,
            PipelineError::Collaborator { .. } | PipelineError::Runtime(_) => Stage::Enriching,
            PipelineError::Serialization(_) | PipelineError::Io(_) => Stage::Failed,
        }
    }
}

/// Failure of a single collaborator call (language model, news, fundamentals, prices).
#[derive(Error, Debug)]
pub enum CollaboratorError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("response did not conform to the requested schema: {0}")]
    Parse(String),

    #[error("{call} timed out after {after:?}")]
    Timeout { call: &'static str, after: Duration },

    #[error("empty response")]
    EmptyResponse,

    #[error("collaborator not configured: {0}")]
    NotConfigured(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_mapping() {
        assert_eq!(PipelineError::Validation("x".into()).stage(), Stage::Entry);
        assert_eq!(
            PipelineError::Classification(CollaboratorError::EmptyResponse).stage(),
            Stage::Classifying
        );
        assert_eq!(PipelineError::MergeInvariant("x".into()).stage(), Stage::Merging);
        assert_eq!(
            PipelineError::Collaborator {
                node: "news",
                source: CollaboratorError::EmptyResponse,
            }
            .stage(),
            Stage::Enriching
        );
        assert_eq!(
            PipelineError::Generation {
                node: "advice",
                source: CollaboratorError::Parse("bad".into()),
            }
            .stage(),
            Stage::Generating
        );
    }

    #[test]
    fn test_timeout_message() {
        let err = CollaboratorError::Timeout {
            call: "news",
            after: Duration::from_secs(3),
        };
        assert_eq!(err.to_string(), "news timed out after 3s");
    }
}
