use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::ReviewError;
use crate::generation::{GenerationRequest, TextGenerator};
use crate::prompt::with_additions;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Connection settings for the OpenAI Responses API.
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

impl OpenAIConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

/// Async OpenAI client producing product descriptions
#[derive(Clone)]
pub struct OpenAIClient {
    client: reqwest::Client,
    config: OpenAIConfig,
}

#[derive(Debug, Serialize)]
pub struct InputMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct ResponsesRequest {
    pub model: String,
    pub input: Vec<InputMessage>,
}

#[derive(Debug, Deserialize)]
pub struct ResponsesResponse {
    pub id: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub output: Vec<OutputItem>,
}

#[derive(Debug, Deserialize)]
pub struct OutputItem {
    #[serde(rename = "type")]
    pub item_type: String,
    #[serde(default)]
    pub content: Vec<OutputContent>,
}

#[derive(Debug, Deserialize)]
pub struct OutputContent {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: Option<String>,
}

impl ResponsesResponse {
    /// Concatenate every `output_text` part of every message item.
    pub fn output_text(&self) -> String {
        self.output
            .iter()
            .filter(|item| item.item_type == "message")
            .flat_map(|item| item.content.iter())
            .filter(|part| part.content_type == "output_text")
            .filter_map(|part| part.text.as_deref())
            .collect()
    }
}

impl OpenAIClient {
    pub fn new(config: OpenAIConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("proofdesk/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    pub fn build_request(&self, request: &GenerationRequest) -> ResponsesRequest {
        ResponsesRequest {
            model: self.config.model.clone(),
            input: vec![
                InputMessage {
                    role: "system".to_string(),
                    content: request.system_prompt.clone(),
                },
                InputMessage {
                    role: "user".to_string(),
                    content: with_additions(&request.user_prompt, &request.additions),
                },
            ],
        }
    }

    pub async fn create_response(&self, body: &ResponsesRequest) -> Result<ResponsesResponse> {
        let url = format!("{}/responses", self.config.base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await
            .context("Failed to send request to OpenAI")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .context("Failed to read error response body")?;
            error!("OpenAI Responses API error: {} - {}", status, error_text);
            anyhow::bail!("OpenAI Responses API error: {} - {}", status, error_text);
        }

        response
            .json()
            .await
            .context("Failed to parse OpenAI response")
    }
}

#[async_trait]
impl TextGenerator for OpenAIClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ReviewError> {
        let body = self.build_request(request);
        let response = self
            .create_response(&body)
            .await
            .map_err(|e| ReviewError::Upstream(format!("{:#}", e)))?;

        let text = response.output_text();
        if text.trim().is_empty() {
            return Err(ReviewError::Upstream(format!(
                "response {} contained no output text",
                response.id.as_deref().unwrap_or("<unknown>")
            )));
        }

        info!(
            "Generated {} characters with {} (status {})",
            text.chars().count(),
            self.config.model,
            response.status.as_deref().unwrap_or("unknown")
        );
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> OpenAIClient {
        OpenAIClient::new(OpenAIConfig::new("sk-test")).unwrap()
    }

    #[test]
    fn test_request_carries_system_and_user_messages() {
        let request = GenerationRequest {
            user_prompt: "Produktname: X".to_string(),
            system_prompt: "Sei sachlich.".to_string(),
            additions: "Mit Etui".to_string(),
        };
        let body = serde_json::to_value(client().build_request(&request)).unwrap();

        assert_eq!(body["model"], DEFAULT_MODEL);
        assert_eq!(body["input"][0]["role"], "system");
        assert_eq!(body["input"][0]["content"], "Sei sachlich.");
        assert_eq!(body["input"][1]["role"], "user");
        assert_eq!(
            body["input"][1]["content"],
            "Produktname: X\n\nZusatzinfos:\nMit Etui"
        );
    }

    #[test]
    fn test_output_text_joins_message_parts() {
        let response: ResponsesResponse = serde_json::from_value(json!({
            "id": "resp_1",
            "status": "completed",
            "output": [
                { "type": "reasoning", "summary": [] },
                {
                    "type": "message",
                    "role": "assistant",
                    "content": [
                        { "type": "output_text", "text": "Erster Teil. ", "annotations": [] },
                        { "type": "refusal", "refusal": "nope" },
                        { "type": "output_text", "text": "Zweiter Teil." }
                    ]
                }
            ]
        }))
        .unwrap();

        assert_eq!(response.output_text(), "Erster Teil. Zweiter Teil.");
    }

    #[test]
    fn test_missing_output_is_empty_text() {
        let response: ResponsesResponse = serde_json::from_value(json!({ "id": "resp_2" })).unwrap();
        assert_eq!(response.output_text(), "");
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_upstream_error() {
        let mut config = OpenAIConfig::new("sk-test");
        config.base_url = "http://127.0.0.1:9".to_string();
        let client = OpenAIClient::new(config).unwrap();
        let request = GenerationRequest {
            user_prompt: "p".to_string(),
            system_prompt: "s".to_string(),
            additions: String::new(),
        };

        let err = client.generate(&request).await.unwrap_err();
        assert!(matches!(err, ReviewError::Upstream(_)));
    }
}
