//! Gemini API Client
//!
//! HTTP client for the Generative Language `generateContent` endpoint.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use super::models::{GenerateContentRequest, GenerateContentResponse};
use super::Assistant;

/// Default API base URL
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default model
pub const DEFAULT_MODEL: &str = "gemini-3-flash-preview";

pub struct GeminiClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    /// Create a new client from environment variables
    ///
    /// Expects:
    /// - `GEMINI_API_KEY` - API key
    /// - `GEMINI_MODEL` (optional) - model name, defaults to [`DEFAULT_MODEL`]
    /// - `GEMINI_BASE_URL` (optional) - API base URL
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .context("GEMINI_API_KEY environment variable not set")?;
        let model = std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let base_url =
            std::env::var("GEMINI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        Self::new(api_key, model, base_url)
    }

    /// Create a new client with explicit settings
    pub fn new(api_key: String, model: String, base_url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            api_key,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl Assistant for GeminiClient {
    async fn generate(&self, prompt_context: &str) -> Result<String> {
        debug!("Sending {} char prompt to {}", prompt_context.len(), self.model);

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&GenerateContentRequest::user_text(prompt_context))
            .send()
            .await
            .context("Failed to send generateContent request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("generateContent failed ({}): {}", status, body));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .context("Failed to parse generateContent response")?;

        Ok(parsed.text())
    }
}
