//! Request classifiers
//!
//! Decide whether a query asks for advice, a strategy, or neither, and pull
//! out the stock symbols it mentions:
//! - `LlmClassifier`: structured generation over the configured language model
//! - `KeywordClassifier`: offline keyword scoring (no network)

use crate::collaborators::{Classification, Classifier, GenerationTask, Generator};
use crate::error::CollabResult;
use crate::models::Usage;
use crate::state::is_valid_symbol;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;

const CLASSIFY_INSTRUCTIONS: &str = r#"Classify the user's query into exactly one intent and list the stock symbols it mentions.

usage = "advice" when the user asks whether to buy, sell or hold a stock, about the outlook of a company or sector, for stock recommendations, about price movements, or whether now is the time to invest in something.
usage = "strategy" when the user asks for a strategy, roadmap or plan, how to start investing, about investment duration or long-term goals, or about portfolio structure, risk allocation or retirement planning.
usage = "invalid" when the query is unrelated to investing or cannot be understood.

stocks = ticker symbols (e.g. ["AAPL", "GOOGL"]) of every company mentioned, or [] when none is mentioned."#;

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct UsageExtraction {
    /// One of "advice", "strategy", "invalid"
    usage: String,
    #[serde(default)]
    stocks: Vec<String>,
}

pub struct LlmClassifier {
    generator: Generator,
}

impl LlmClassifier {
    pub fn new(generator: Generator) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn classify(&self, query: &str) -> CollabResult<Classification> {
        let extraction: UsageExtraction = self
            .generator
            .structured(GenerationTask::Classification, CLASSIFY_INSTRUCTIONS, query.trim())
            .await?;

        Ok(Classification::new(
            Usage::parse(&extraction.usage),
            extraction.stocks,
        ))
    }
}

// ===== Keyword classifier =====

/// Static keyword lists
const STRATEGY_KEYWORDS: &[&str] = &[
    // Planning
    "strategy", "plan", "roadmap", "start investing", "get started",
    // Portfolio structure
    "portfolio", "allocate", "allocation", "diversify", "rebalance", "distribute",
    // Horizon
    "retire", "retirement", "long-term", "long term", "years", "duration", "goal",
    // Risk
    "risk", "savings", "income",
];

const ADVICE_KEYWORDS: &[&str] = &[
    // Actions
    "buy", "sell", "hold", "invest in", "enter", "exit",
    // Outlook
    "outlook", "future", "forecast", "predict", "price", "trend", "performing",
    // Recommendations
    "recommend", "should i", "good time", "right time", "worth", "look into",
    // Market words
    "stock", "share", "sector", "market",
];

/// Uppercase words that look like tickers but are not.
const TICKER_STOPWORDS: &[&str] = &[
    "I", "A", "AN", "THE", "AND", "OR", "TO", "IN", "ON", "OF", "FOR", "IS", "IT", "MY", "ME",
    "BE", "DO", "IF", "AT", "BY", "SO", "NO", "US", "UP", "AM", "ETF", "IPO", "CEO", "USD",
    "EUR", "INR", "GDP", "AI", "OK",
];

/// Offline classifier
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify by keyword scores; ties with any hit favour advice.
    pub fn classify_text(query: &str) -> Usage {
        let text = query.to_lowercase();

        let strategy_score = STRATEGY_KEYWORDS
            .iter()
            .filter(|kw| text.contains(**kw))
            .count();

        let advice_score = ADVICE_KEYWORDS
            .iter()
            .filter(|kw| text.contains(**kw))
            .count();

        if strategy_score == 0 && advice_score == 0 {
            Usage::Invalid
        } else if strategy_score > advice_score || contains_planning_phrase(&text) {
            Usage::Strategy
        } else {
            Usage::Advice
        }
    }

    /// Ticker-like tokens: `$aapl` anywhere, or bare all-caps words.
    pub fn extract_symbols(query: &str) -> Vec<String> {
        query
            .split(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | '?' | '!' | '(' | ')' | '"'))
            .filter_map(|raw| {
                let token = raw.trim_end_matches(['.', ':']);
                if let Some(cashtag) = token.strip_prefix('$') {
                    return Some(cashtag.to_ascii_uppercase());
                }
                let letters = token.chars().filter(|c| c.is_ascii_alphabetic()).count();
                let looks_like_ticker = letters >= 1
                    && token.len() <= 5
                    && token
                        .chars()
                        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '.');
                (looks_like_ticker && !TICKER_STOPWORDS.contains(&token)).then(|| token.to_string())
            })
            .filter(|symbol| is_valid_symbol(symbol))
            .collect()
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Classifier for KeywordClassifier {
    async fn classify(&self, query: &str) -> CollabResult<Classification> {
        Ok(Classification::new(
            Self::classify_text(query),
            Self::extract_symbols(query),
        ))
    }
}

/// Fast path planning phrase detection
fn contains_planning_phrase(text: &str) -> bool {
    text.contains("strategy")
        || text.contains("roadmap")
        || text.contains("how do i start")
        || text.contains("retirement")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::mock::ScriptedModel;
    use crate::error::CollaboratorError;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_advice_questions() {
        let cases = vec![
            "Should I buy AAPL right now?",
            "What is the outlook for TSLA?",
            "Is it the right time to enter the tech sector?",
            "should i look into microsoft",
        ];

        for c in cases {
            assert_eq!(KeywordClassifier::classify_text(c), Usage::Advice, "{}", c);
        }
    }

    #[test]
    fn test_strategy_requests() {
        let cases = vec![
            "Build me a retirement plan",
            "How do I start investing with a low risk appetite?",
            "Give me a strategy to diversify my portfolio across NVDA and MSFT",
            "I want a 10 years roadmap",
        ];

        for c in cases {
            assert_eq!(KeywordClassifier::classify_text(c), Usage::Strategy, "{}", c);
        }
    }

    #[test]
    fn test_edge_cases() {
        assert_eq!(KeywordClassifier::classify_text("hi"), Usage::Invalid);
        assert_eq!(
            KeywordClassifier::classify_text("what's the weather like"),
            Usage::Invalid
        );
    }

    #[test]
    fn test_symbol_extraction() {
        let symbols = KeywordClassifier::extract_symbols("Should I buy AAPL or $tsla? I think BRK.B too.");
        assert_eq!(symbols, vec!["AAPL", "TSLA", "BRK.B"]);

        assert!(KeywordClassifier::extract_symbols("is it a good time for an IPO").is_empty());
    }

    #[tokio::test]
    async fn test_llm_classifier_parses_structured_reply() {
        let model = Arc::new(ScriptedModel::new("").reply(
            GenerationTask::Classification,
            r#"{"usage": "advice", "stocks": ["AAPL", "TSLA"]}"#,
        ));
        let classifier = LlmClassifier::new(Generator::new(model, Duration::from_secs(1)));

        let classification = classifier.classify("Should I buy Apple or Tesla?").await.unwrap();
        assert_eq!(classification.usage, Usage::Advice);
        assert_eq!(classification.symbols, vec!["AAPL", "TSLA"]);
    }

    #[tokio::test]
    async fn test_llm_classifier_unknown_usage_is_invalid() {
        let model = Arc::new(ScriptedModel::new(r#"{"usage": "taxes", "stocks": []}"#));
        let classifier = LlmClassifier::new(Generator::new(model, Duration::from_secs(1)));

        let classification = classifier.classify("How do I file taxes?").await.unwrap();
        assert_eq!(classification.usage, Usage::Invalid);
    }

    #[tokio::test]
    async fn test_llm_classifier_rejects_prose() {
        let model = Arc::new(ScriptedModel::new("The user wants advice."));
        let classifier = LlmClassifier::new(Generator::new(model, Duration::from_secs(1)));

        let err = classifier.classify("Should I buy AAPL?").await.unwrap_err();
        assert!(matches!(err, CollaboratorError::Parse(_)));
    }
}
