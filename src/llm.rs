//! Text-completion client for the local inference service.
//!
//! The service is treated as a black box: one prompt in, one text out.
//! [`OllamaClient`] speaks Ollama's non-streaming `/api/generate`; tests
//! implement [`CompletionClient`] directly.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::{MemoryError, Result};

#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Send `prompt` and return the model's full response text.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Client for `POST {url}/api/generate`.
///
/// Single attempt per call: no timeout, retry, or backoff.
pub struct OllamaClient {
    url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl CompletionClient for OllamaClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.url))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                MemoryError::InferenceService(format!(
                    "could not reach {} (is Ollama running?): {}",
                    self.url, e
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MemoryError::InferenceService(format!(
                "{} returned {}: {}",
                self.url, status, body
            )));
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| {
            MemoryError::InferenceService(format!("unexpected response body: {}", e))
        })?;
        Ok(parsed.response)
    }
}
