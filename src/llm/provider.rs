//! Provider selection

use super::{CrossEncoder, GeminiClient, LanguageModel, LlmError, OllamaClient};
use crate::config::{LlmConfig, RerankConfig};
use crate::error::{AssistError, Result};
use crate::memory::Message;
use async_trait::async_trait;
use std::sync::Arc;

/// Remote chat completion endpoint
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    fn name(&self) -> &str;

    /// `json` asks the backend to constrain its output to a JSON object
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        json: bool,
    ) -> std::result::Result<String, LlmError>;
}

/// A chat backend paired with an optional local cross-encoder
pub struct ProviderModel {
    completion: Arc<dyn ChatCompletion>,
    scorer: Option<Arc<CrossEncoder>>,
}

impl ProviderModel {
    pub fn new(completion: Arc<dyn ChatCompletion>, scorer: Option<Arc<CrossEncoder>>) -> Self {
        Self { completion, scorer }
    }

    /// Build the configured backend; the cross-encoder is loaded only when re-ranking is on
    pub fn from_config(llm: &LlmConfig, rerank: &RerankConfig) -> Result<Self> {
        let completion: Arc<dyn ChatCompletion> = match llm.provider.as_str() {
            "gemini" => Arc::new(GeminiClient::from_config(llm).map_err(|e| {
                AssistError::Config(format!("Cannot initialise Gemini client: {}", e))
            })?),
            "ollama" => Arc::new(OllamaClient::from_config(llm).map_err(|e| {
                AssistError::Config(format!("Cannot initialise Ollama client: {}", e))
            })?),
            other => {
                return Err(AssistError::InvalidConfigValue {
                    path: "llm.provider".to_string(),
                    message: format!("Unknown provider '{}'", other),
                })
            }
        };

        let scorer = if rerank.enabled {
            let encoder = CrossEncoder::new(&rerank.model).map_err(|e| {
                AssistError::Config(format!("Cannot load re-ranking model: {}", e))
            })?;
            Some(Arc::new(encoder))
        } else {
            None
        };

        tracing::info!(
            provider = completion.name(),
            reranker = scorer.as_ref().map(|s| s.model_name()).unwrap_or("none"),
            "Language model ready"
        );

        Ok(Self::new(completion, scorer))
    }
}

#[async_trait]
impl LanguageModel for ProviderModel {
    fn name(&self) -> &str {
        self.completion.name()
    }

    async fn generate(&self, prompt: &str, context: &[Message]) -> std::result::Result<String, LlmError> {
        self.completion.complete(prompt, context, false).await
    }

    async fn classify(&self, prompt: &str) -> std::result::Result<String, LlmError> {
        let message = Message::user(prompt);
        self.completion
            .complete("", std::slice::from_ref(&message), true)
            .await
    }

    async fn score_pair(&self, query: &str, text: &str) -> std::result::Result<f32, LlmError> {
        let scores = self.score_pairs(query, &[text.to_string()]).await?;
        scores
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("No score returned".to_string()))
    }

    async fn score_pairs(
        &self,
        query: &str,
        texts: &[String],
    ) -> std::result::Result<Vec<f32>, LlmError> {
        match &self.scorer {
            Some(scorer) => scorer.score(query, texts).await,
            None => Err(LlmError::Unsupported(
                "re-ranking model not loaded".to_string(),
            )),
        }
    }
}
