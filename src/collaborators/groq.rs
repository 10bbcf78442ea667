//! Groq chat completions client (OpenAI-compatible endpoint)

use super::{check_status, http_client, GenerationRequest, LanguageModel};
use crate::error::{CollabResult, CollaboratorError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

pub const DEFAULT_GROQ_MODEL: &str = "llama-3.1-8b-instant";
const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

pub struct GroqClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GroqClient {
    pub fn new(api_key: String, model: String) -> CollabResult<Self> {
        if api_key.trim().is_empty() {
            return Err(CollaboratorError::NotConfigured("GROQ_API_KEY".to_string()));
        }
        Ok(Self {
            client: http_client()?,
            api_key,
            model,
            base_url: GROQ_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn build_request<'a>(&'a self, request: &'a GenerationRequest) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });

        ChatRequest {
            model: &self.model,
            messages,
            temperature: 0.0,
            response_format: request.json.then_some(ResponseFormat {
                kind: "json_object",
            }),
        }
    }
}

#[async_trait]
impl LanguageModel for GroqClient {
    fn name(&self) -> &'static str {
        "groq"
    }

    async fn complete(&self, request: &GenerationRequest) -> CollabResult<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_request(request);

        debug!(model = %self.model, task = request.task.as_str(), "Calling Groq API");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Groq API request failed: {}", e);
                CollaboratorError::Request(format!("Groq API error: {}", e))
            })?;

        let completion: ChatResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| CollaboratorError::Parse(format!("Groq response: {}", e)))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(CollaboratorError::EmptyResponse)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}
