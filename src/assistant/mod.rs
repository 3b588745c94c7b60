//! Conversational assistant integration
//!
//! The level engine never calls the assistant; levels are handed to it as
//! prompt context by the surfaces that talk to the user.
//!
//! # Components
//!
//! - [`client`] - Gemini `generateContent` HTTP client
//! - [`models`] - Request/response data types
//! - [`prompt`] - Prompt composition and fallback replies
//!
//! # Usage
//!
//! ```rust,ignore
//! use session_levels::assistant::{compose_prompt, respond, GeminiClient};
//!
//! let client = GeminiClient::from_env()?;
//! let prompt = compose_prompt(&levels, &instruction, &logic_rules, "Should I buy?");
//! let reply = respond(&client, &prompt).await;
//! ```

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Arc;

pub mod client;
pub mod models;
pub mod prompt;

// Re-export commonly used types
pub use client::GeminiClient;
pub use prompt::{compose_prompt, respond, EMPTY_REPLY, FAILURE_REPLY};

/// External text generation service
#[async_trait]
pub trait Assistant: Send + Sync {
    async fn generate(&self, prompt_context: &str) -> Result<String>;
}

#[async_trait]
impl<T: Assistant + ?Sized> Assistant for Arc<T> {
    async fn generate(&self, prompt_context: &str) -> Result<String> {
        (**self).generate(prompt_context).await
    }
}

/// Stand-in used when no API key is configured; every call fails so
/// callers fall back to the static reply
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineAssistant;

#[async_trait]
impl Assistant for OfflineAssistant {
    async fn generate(&self, _prompt_context: &str) -> Result<String> {
        Err(anyhow!("Assistant not configured (set GEMINI_API_KEY)"))
    }
}
