//! Chat model provider abstractions and implementations.
//!
//! Providers speak one vendor's wire format and report raw failures. Retry and
//! failure classification live in the gateway on top.

pub mod gemini;
pub mod mock;

use async_trait::async_trait;
use thiserror::Error;

/// Error type for provider operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Content filtered")]
    ContentFiltered,

    #[error("Network error: {0}")]
    NetworkError(String),
}

/// Speaker of a message sent to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Result of a provider response.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    /// Concatenated text parts of the first candidate.
    pub text: Option<String>,

    pub input_tokens: i32,

    pub output_tokens: i32,

    pub finish_reason: FinishReason,
}

/// Reason why generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Complete,
    Length,
    ContentFilter,
    Error,
}

/// Sampling parameters for one call.
#[derive(Debug, Clone, Default)]
pub struct GenerationParams {
    /// Temperature (0.0 - 1.0).
    pub temperature: Option<f32>,

    pub max_tokens: Option<i32>,
}

/// A multi-turn chat backend (Gemini in production, scripted in tests).
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Generate the next assistant message for `messages`, which alternate
    /// user/assistant and end with a user message.
    async fn invoke(
        &self,
        system_instruction: &str,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<ProviderResponse, ProviderError>;

    /// Short name for logs and metrics labels.
    fn name(&self) -> &'static str;

    async fn health_check(&self) -> Result<(), ProviderError>;
}
