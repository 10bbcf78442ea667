//! Gemini API client
//!
//! Alternative language model provider, selected with `LLM_PROVIDER=gemini`.

use super::{check_status, http_client, GenerationRequest, LanguageModel};
use crate::error::{CollabResult, CollaboratorError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

const GEMINI_BASE_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent";

/// Reusable Gemini client
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String) -> CollabResult<Self> {
        if api_key.trim().is_empty() {
            return Err(CollaboratorError::NotConfigured("GEMINI_API_KEY".to_string()));
        }
        Ok(Self {
            client: http_client()?,
            api_key,
            base_url: GEMINI_BASE_URL.to_string(),
        })
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn complete(&self, request: &GenerationRequest) -> CollabResult<String> {
        let url = format!("{}?key={}", self.base_url, self.api_key);
        let body = build_request(request);

        debug!(task = request.task.as_str(), "Calling Gemini API");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Gemini API request failed: {}", e);
                CollaboratorError::Request(format!("Gemini API error: {}", e))
            })?;

        let gemini_response: GeminiResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| CollaboratorError::Parse(format!("Gemini response: {}", e)))?;

        let candidate = gemini_response
            .candidates
            .into_iter()
            .next()
            .ok_or(CollaboratorError::EmptyResponse)?;

        if let Some(reason) = candidate.finish_reason.as_deref() {
            if reason != "STOP" {
                warn!(finish_reason = reason, "Gemini response did not finish cleanly");
            }
        }

        let text: String = candidate
            .content
            .parts
            .into_iter()
            .map(|part| part.text)
            .collect();

        if text.trim().is_empty() {
            return Err(CollaboratorError::EmptyResponse);
        }
        Ok(text)
    }
}

fn build_request(request: &GenerationRequest) -> GeminiRequest {
    GeminiRequest {
        contents: vec![Content {
            parts: vec![Part {
                text: request.prompt.clone(),
            }],
        }],
        generation_config: GenerationConfig {
            temperature: 0.0,
            top_p: 0.9,
            max_output_tokens: 4096,
            response_mime_type: request.json.then(|| "application/json".to_string()),
        },
        system_instruction: request.system.as_ref().map(|system| SystemInstruction {
            parts: vec![Part {
                text: system.clone(),
            }],
        }),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    max_output_tokens: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Content,
    finish_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::GenerationTask;

    #[test]
    fn test_request_serialization() {
        let request = GenerationRequest::json(
            GenerationTask::ProfileExtraction,
            "You extract investor profiles",
            "I am 32 and work in IT",
        );

        let json = serde_json::to_value(build_request(&request)).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "I am 32 and work in IT");
        assert_eq!(json["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(
            json["systemInstruction"]["parts"][0]["text"],
            "You extract investor profiles"
        );
    }

    #[test]
    fn test_text_request_omits_optional_fields() {
        let request = GenerationRequest::text(GenerationTask::MarketTrends, "What is RSI?");
        let json = serde_json::to_value(build_request(&request)).unwrap();

        assert!(json.get("systemInstruction").is_none());
        assert!(json["generationConfig"].get("responseMimeType").is_none());
    }

    #[test]
    fn test_response_parsing() {
        let raw = r#"{"candidates": [{"content": {"parts": [{"text": "Hold"}, {"text": " for now"}]}, "finishReason": "STOP"}]}"#;
        let parsed: GeminiResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.candidates[0].finish_reason.as_deref(), Some("STOP"));
        assert_eq!(parsed.candidates[0].content.parts.len(), 2);
    }
}
