//! Cross-encoder relevance scoring using FastEmbed

use super::LlmError;
use fastembed::{RerankInitOptions, RerankerModel, TextRerank};
use std::sync::Arc;

/// Local cross-encoder that scores (query, text) pairs
pub struct CrossEncoder {
    model: Arc<TextRerank>,
    model_name: String,
}

impl CrossEncoder {
    /// Load a re-ranking model
    ///
    /// # Arguments
    /// * `model_name` - "bge-reranker-v2-m3" (multilingual) or "bge-reranker-base"
    pub fn new(model_name: &str) -> Result<Self, LlmError> {
        let model = match model_name.to_lowercase().as_str() {
            "bge-reranker-v2-m3" => RerankerModel::BGERerankerV2M3,
            "bge-reranker-base" => RerankerModel::BGERerankerBase,
            other => {
                return Err(LlmError::Initialization(format!(
                    "Unsupported reranker model: {}. Supported: bge-reranker-v2-m3, bge-reranker-base",
                    other
                )))
            }
        };

        tracing::info!("Initializing reranker model: {}", model_name);

        let init_options = RerankInitOptions::new(model).with_show_download_progress(true);
        let model = TextRerank::try_new(init_options)
            .map_err(|e| LlmError::Initialization(e.to_string()))?;

        Ok(Self {
            model: Arc::new(model),
            model_name: model_name.to_string(),
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Raw relevance logits, one per text in input order
    pub async fn score(&self, query: &str, texts: &[String]) -> Result<Vec<f32>, LlmError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model = Arc::clone(&self.model);
        let query = query.to_string();
        let documents = texts.to_vec();
        let expected = documents.len();

        let results = tokio::task::spawn_blocking(move || model.rerank(query, documents, false, None))
            .await
            .map_err(|e| LlmError::Unavailable(format!("Reranker task failed: {}", e)))?
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        // fastembed returns results sorted by score; put them back in input order
        let mut scores = vec![None; expected];
        for result in results {
            if let Some(slot) = scores.get_mut(result.index) {
                *slot = Some(result.score);
            }
        }

        scores
            .into_iter()
            .collect::<Option<Vec<f32>>>()
            .ok_or_else(|| LlmError::InvalidResponse("Reranker skipped some texts".to_string()))
    }
}
