//! Text and structured generation over a [`LanguageModel`]
//!
//! Structured calls send the JSON Schema of the target type alongside the
//! prompt and parse the reply strictly. A reply that does not deserialize
//! into the target is a `CollaboratorError::Parse`, never a best-effort scrape.

use super::{with_timeout, GenerationRequest, GenerationTask, LanguageModel};
use crate::error::{CollabResult, CollaboratorError};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Clone)]
pub struct Generator {
    model: Arc<dyn LanguageModel>,
    timeout: Duration,
}

impl Generator {
    pub fn new(model: Arc<dyn LanguageModel>, timeout: Duration) -> Self {
        Self { model, timeout }
    }

    /// Free-form narrative. Blank replies are an error.
    pub async fn text(&self, task: GenerationTask, prompt: impl Into<String>) -> CollabResult<String> {
        let request = GenerationRequest::text(task, prompt);
        let reply = self.call(&request).await?;

        let reply = reply.trim();
        if reply.is_empty() {
            return Err(CollaboratorError::EmptyResponse);
        }
        Ok(reply.to_string())
    }

    /// Schema-conforming record of type `T`.
    pub async fn structured<T>(&self, task: GenerationTask, instructions: &str, input: &str) -> CollabResult<T>
    where
        T: DeserializeOwned + JsonSchema,
    {
        let schema = schemars::schema_for!(T);
        let schema = serde_json::to_string(&schema)
            .map_err(|e| CollaboratorError::Parse(format!("schema rendering failed: {}", e)))?;

        let system = format!(
            "{}\n\nRespond with a single JSON object that conforms to this JSON Schema. \
             Do not add any text outside the object.\n{}",
            instructions.trim(),
            schema
        );
        let request = GenerationRequest::json(task, system, input);
        let reply = self.call(&request).await?;

        parse_structured(&reply)
    }

    async fn call(&self, request: &GenerationRequest) -> CollabResult<String> {
        debug!(
            model = self.model.name(),
            task = request.task.as_str(),
            json = request.json,
            "Calling language model"
        );
        with_timeout(self.timeout, request.task.as_str(), self.model.complete(request)).await
    }
}

/// Strictly deserialize a structured reply.
pub fn parse_structured<T: DeserializeOwned>(raw: &str) -> CollabResult<T> {
    let body = strip_code_fence(raw);
    if body.is_empty() {
        return Err(CollaboratorError::EmptyResponse);
    }
    serde_json::from_str(body).map_err(|e| CollaboratorError::Parse(e.to_string()))
}

/// Some providers wrap JSON mode output in a markdown fence.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::mock::ScriptedModel;
    use crate::models::AdviceForecast;

    #[test]
    fn test_parse_conforming_record() {
        let raw = r#"{"advice": "Hold AAPL", "forecasts": {"AAPL": {"day1": 190.5, "day3": null, "day7": 193.0}}}"#;
        let record: AdviceForecast = parse_structured(raw).unwrap();
        assert_eq!(record.advice, "Hold AAPL");
        assert_eq!(record.forecasts["AAPL"].day1, Some(190.5));
    }

    #[test]
    fn test_parse_fenced_record() {
        let raw = "```json\n{\"advice\": \"Buy\"}\n```";
        let record: AdviceForecast = parse_structured(raw).unwrap();
        assert_eq!(record.advice, "Buy");
        assert!(record.forecasts.is_empty());
    }

    #[test]
    fn test_prose_around_json_is_rejected() {
        let raw = "Sure! Here is the JSON: {\"advice\": \"Buy\"}";
        let err = parse_structured::<AdviceForecast>(raw).unwrap_err();
        assert!(matches!(err, CollaboratorError::Parse(_)));
    }

    #[test]
    fn test_empty_reply() {
        let err = parse_structured::<AdviceForecast>("  ").unwrap_err();
        assert!(matches!(err, CollaboratorError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_structured_call_sends_schema() {
        let model = Arc::new(ScriptedModel::new("unused").reply(
            GenerationTask::Advice,
            r#"{"advice": "Accumulate", "forecasts": {}}"#,
        ));
        let generator = Generator::new(model.clone(), Duration::from_secs(1));

        let record: AdviceForecast = generator
            .structured(GenerationTask::Advice, "Give advice.", "AAPL")
            .await
            .unwrap();
        assert_eq!(record.advice, "Accumulate");

        let requests = model.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].json);
        let system = requests[0].system.as_deref().unwrap_or_default();
        assert!(system.contains("\"forecasts\""));
    }

    #[tokio::test]
    async fn test_blank_text_is_an_error() {
        let model = Arc::new(ScriptedModel::new("   "));
        let generator = Generator::new(model, Duration::from_secs(1));

        let err = generator
            .text(GenerationTask::Sentiment, "news")
            .await
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::EmptyResponse));
    }
}
