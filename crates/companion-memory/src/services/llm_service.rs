use crate::config::LlmConfig;
use crate::services::chat_service::LlmProvider;
use crate::utils::error::ApiError;
use anyhow::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize)]
pub struct CompletionRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    pub max_tokens: usize,
    pub temperature: f32,
    pub stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    text: String,
}

/// Client for an OpenAI-compatible `/v1/completions` endpoint.
#[derive(Clone)]
pub struct LlmService {
    client: Client,
    config: LlmConfig,
}

impl LlmService {
    pub fn new(config: LlmConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| ApiError::InternalError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Sends `prompt` as a plain completion and returns the raw text of the
    /// first choice.
    pub async fn complete(&self, prompt: &str) -> Result<String, ApiError> {
        debug!("Requesting completion for a {} char prompt", prompt.len());

        let request = CompletionRequest {
            model: &self.config.model,
            prompt,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            stream: false,
        };

        let response = self
            .client
            .post(format!(
                "{}/v1/completions",
                self.config.base_url.trim_end_matches('/')
            ))
            .json(&request)
            .send()
            .await
            .map_err(|e| ApiError::LlmError(format!("Failed to call LLM API: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::LlmError(format!(
                "LLM API error: {} - {}",
                status, body
            )));
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| ApiError::LlmError(format!("Failed to parse LLM response: {}", e)))?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.text)
            .ok_or_else(|| ApiError::LlmError("No choices returned from LLM".to_string()))
    }
}

#[async_trait::async_trait]
impl LlmProvider for LlmService {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.complete(prompt).await.map_err(|e| anyhow::anyhow!(e))
    }
}
