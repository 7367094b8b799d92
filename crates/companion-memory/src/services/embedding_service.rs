use crate::config::EmbeddingConfig;
use crate::services::memory::EmbeddingProvider;
use anyhow::{Context, Result};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    content: &'a str,
    // llama.cpp reads `content`, OpenAI-style servers read `input`
    input: &'a str,
}

#[derive(Clone)]
pub struct EmbeddingService {
    client: Client,
    base_url: String,
    model: String,
    dimension: usize,
}

impl EmbeddingService {
    pub fn new(config: EmbeddingConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to build embedding HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model,
            dimension: config.dimension,
        })
    }

    async fn embed_internal(&self, text: &str) -> Result<Vec<f32>> {
        debug!("Generating embedding for {} chars", text.len());

        let request = EmbeddingRequest {
            model: &self.model,
            content: text,
            input: text,
        };

        let response = self
            .client
            .post(format!("{}/embedding", self.base_url))
            .json(&request)
            .send()
            .await
            .context("Failed to connect to embedding server")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Embedding API error ({}): {}", status, body);
        }

        let json_value: Value = response
            .json()
            .await
            .context("Failed to parse embedding response as JSON")?;

        let embedding = parse_embedding(&json_value)?;

        if self.dimension > 0 && embedding.len() != self.dimension {
            anyhow::bail!(
                "Embedding dimension mismatch: expected {}, got {}",
                self.dimension,
                embedding.len()
            );
        }

        Ok(embedding)
    }
}

/// Accepts `{"embedding": [..]}`, `[{"embedding": [..]}]`, `[..]` and
/// `{"data": [{"embedding": [..]}]}`.
fn parse_embedding(value: &Value) -> Result<Vec<f32>> {
    let floats = |arr: &Vec<Value>| -> Vec<f32> {
        arr.iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect()
    };

    let embedding = match value {
        Value::Array(arr) => match arr.first() {
            None => anyhow::bail!("Empty array returned from embedding server"),
            Some(first) => match first.get("embedding").and_then(Value::as_array) {
                Some(inner) => floats(inner),
                None => floats(arr),
            },
        },
        Value::Object(_) => {
            if let Some(inner) = value.get("embedding").and_then(Value::as_array) {
                floats(inner)
            } else if let Some(inner) = value
                .get("data")
                .and_then(|d| d.get(0))
                .and_then(|d| d.get("embedding"))
                .and_then(Value::as_array)
            {
                floats(inner)
            } else {
                anyhow::bail!("Unrecognized embedding response format: {}", value);
            }
        }
        _ => anyhow::bail!("Unrecognized embedding response format: {}", value),
    };

    if embedding.is_empty() {
        anyhow::bail!("Generated embedding is empty");
    }

    Ok(embedding)
}

#[async_trait::async_trait]
impl EmbeddingProvider for EmbeddingService {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_internal(text).await
    }
}
