//! OpenAI-compatible chat completions client
//!
//! Serves both AI capabilities against any provider that speaks the
//! `/chat/completions` API (xAI Grok by default):
//!
//! - `SchemaExtractor` via the `json_schema` response format
//! - `LlmClient` via a JSON-object response format

use crate::providers::{LlmClient, ProviderError, ProviderResult, SchemaExtractor};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const DEFAULT_BASE_URL: &str = "https://api.x.ai/v1";
const DEFAULT_MODEL: &str = "grok-2";

const SCHEMA_SYSTEM_PROMPT: &str = "You extract business listing details from web page text. \
Only report values that appear in the text. Use null for anything not present.";

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    response_format: Value,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Chat completions client
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiClient {
    /// Create a new client with the given API key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Set the chat model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set a custom base URL (for other OpenAI-compatible providers)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn chat(
        &self,
        system: &str,
        user: &str,
        temperature: f32,
        response_format: Value,
    ) -> ProviderResult<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user.to_string(),
                },
            ],
            temperature,
            response_format,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::Malformed("No completion in response".to_string()))
    }
}

#[async_trait]
impl SchemaExtractor for OpenAiClient {
    async fn extract_with_schema(&self, content: &str, schema: &Value) -> ProviderResult<String> {
        let response_format = serde_json::json!({
            "type": "json_schema",
            "json_schema": {
                "name": "business_record",
                "strict": true,
                "schema": schema,
            }
        });
        self.chat(SCHEMA_SYSTEM_PROMPT, content, 0.0, response_format)
            .await
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete_json(&self, system: &str, prompt: &str) -> ProviderResult<String> {
        let response_format = serde_json::json!({ "type": "json_object" });
        self.chat(system, prompt, 0.1, response_format).await
    }
}
