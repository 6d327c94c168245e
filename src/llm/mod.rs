//! Language model capabilities
//!
//! One [`LanguageModel`] trait exposes the three things the pipeline asks of a model:
//! free-form generation, single-shot classification and (query, text) relevance
//! scoring. Concrete backends are picked from config at startup.

mod cross_encoder;
mod gemini;
mod ollama;
mod provider;
mod retry;

pub use cross_encoder::CrossEncoder;
pub use gemini::GeminiClient;
pub use ollama::OllamaClient;
pub use provider::{ChatCompletion, ProviderModel};
pub use retry::{CallFailure, RetryPolicy};

use crate::memory::Message;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Provider returned {status}: {message}")]
    Provider { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Capability not supported: {0}")]
    Unsupported(String),

    #[error("Initialization failed: {0}")]
    Initialization(String),
}

impl LlmError {
    /// Timeouts, rate limits, overload and server errors are worth retrying
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::Timeout(_) | LlmError::RateLimited(_) | LlmError::Unavailable(_) => true,
            LlmError::Provider { status, .. } => *status >= 500,
            LlmError::InvalidResponse(_)
            | LlmError::Unsupported(_)
            | LlmError::Initialization(_) => false,
        }
    }

    /// Map an HTTP status to the matching variant
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            429 => LlmError::RateLimited(message),
            502..=504 => LlmError::Unavailable(message),
            _ => LlmError::Provider { status, message },
        }
    }

    /// Classify a transport error from reqwest
    pub fn from_transport(error: reqwest::Error, timeout: Duration) -> Self {
        if error.is_timeout() {
            LlmError::Timeout(timeout)
        } else if let Some(status) = error.status() {
            LlmError::from_status(status.as_u16(), error.to_string())
        } else {
            LlmError::Unavailable(error.to_string())
        }
    }
}

/// Capabilities the assistant needs from a model
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;

    /// Produce a reply given instructions and the conversation so far
    ///
    /// `prompt` carries the instructions (persona, retrieved products); `context` is the
    /// conversation, oldest first, ending with the message to answer.
    async fn generate(&self, prompt: &str, context: &[Message]) -> Result<String, LlmError>;

    /// Single-shot completion used for routing
    async fn classify(&self, prompt: &str) -> Result<String, LlmError> {
        self.generate(prompt, &[]).await
    }

    /// Relevance of `text` to `query`; higher is more relevant
    async fn score_pair(&self, _query: &str, _text: &str) -> Result<f32, LlmError> {
        Err(LlmError::Unsupported(format!(
            "{} has no relevance scorer",
            self.name()
        )))
    }

    /// Score many texts against one query, one score per text in input order
    async fn score_pairs(&self, query: &str, texts: &[String]) -> Result<Vec<f32>, LlmError> {
        let mut scores = Vec::with_capacity(texts.len());
        for text in texts {
            scores.push(self.score_pair(query, text).await?);
        }
        Ok(scores)
    }
}
