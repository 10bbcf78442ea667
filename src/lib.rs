//! Market Analysis Pipeline
//!
//! Turns a free-text investing question into investment advice or an
//! investment strategy by running a fixed graph of analysis nodes:
//! - Classifies the request (advice, strategy, or not applicable)
//! - Enriches it with company news and fundamentals on two parallel branches
//! - Merges the branch results under strict field ownership
//! - Synthesizes market trends and routes to exactly one terminal node
//!
//! UNIFIED FLOW:
//! ENTRY → CLASSIFY → [PORTFOLIO] → (NEWS → SENTIMENT ∥ FUNDAMENTALS) → MERGE → SYNTHESIZE → ROUTE → ADVICE | STRATEGY

pub mod api;
pub mod classifier;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod executor;
pub mod indicators;
pub mod logging;
pub mod merge;
pub mod models;
pub mod nodes;
pub mod pipeline;
pub mod router;
pub mod state;

pub use error::{PipelineError, Result};

// Re-export common types
pub use models::*;
pub use classifier::{KeywordClassifier, LlmClassifier};
pub use config::{PipelineConfig, PipelineSettings};
pub use pipeline::{Pipeline, RunOutcome, RunRequest};
pub use router::Route;
pub use state::AnalysisState;
