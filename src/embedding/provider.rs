/// Embedding provider trait and FastEmbed implementation
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitializationError(String),

    #[error("Embedding generation failed: {0}")]
    GenerationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Trait for embedding providers
///
/// The indexes only see vectors; any backend producing fixed-size vectors fits.
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embedding for a single text
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Generate embeddings for multiple texts, one vector per input in input order
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Models the shop can embed with: (config name, fastembed model, dimension, approx download MB)
const SUPPORTED_MODELS: &[(&str, EmbeddingModel, usize, usize)] = &[
    (
        "paraphrase-multilingual-minilm-l12-v2",
        EmbeddingModel::ParaphraseMLMiniLML12V2,
        384,
        470,
    ),
    (
        "multilingual-e5-small",
        EmbeddingModel::MultilingualE5Small,
        384,
        470,
    ),
    (
        "multilingual-e5-base",
        EmbeddingModel::MultilingualE5Base,
        768,
        1110,
    ),
    ("all-minilm-l6-v2", EmbeddingModel::AllMiniLML6V2, 384, 90),
    ("bge-small-en-v1.5", EmbeddingModel::BGESmallENV15, 384, 130),
];

/// Look up a supported model by its config name (case-insensitive)
fn resolve_model(model_name: &str) -> Option<(EmbeddingModel, usize, usize)> {
    let wanted = model_name.to_lowercase();
    SUPPORTED_MODELS
        .iter()
        .find(|(name, ..)| *name == wanted)
        .map(|(_, model, dim, size)| (model.clone(), *dim, *size))
}

/// Dimension produced by a supported model
pub fn model_dimension(model_name: &str) -> Option<usize> {
    resolve_model(model_name).map(|(_, dim, _)| dim)
}

/// FastEmbed provider for local embedding generation
///
/// Product text is Vietnamese, so the default is a multilingual paraphrase model.
pub struct FastEmbedProvider {
    model: Arc<TextEmbedding>,
    model_name: String,
    dimension: usize,
}

impl FastEmbedProvider {
    /// Create a new FastEmbed provider with the specified model
    ///
    /// Models are downloaded on first use into the fastembed cache directory.
    pub fn new(model_name: &str) -> Result<Self, EmbeddingError> {
        let (embedding_model, dimension, model_size_mb) =
            resolve_model(model_name).ok_or_else(|| {
                let names: Vec<&str> = SUPPORTED_MODELS.iter().map(|(n, ..)| *n).collect();
                EmbeddingError::InitializationError(format!(
                    "Unsupported model: {}. Supported: {}",
                    model_name,
                    names.join(", ")
                ))
            })?;

        tracing::info!(
            "Initializing embedding model: {} ({}D, ~{}MB download if not cached)",
            model_name,
            dimension,
            model_size_mb
        );

        let init_options = InitOptions::new(embedding_model).with_show_download_progress(true);

        let model = TextEmbedding::try_new(init_options)
            .map_err(|e| EmbeddingError::InitializationError(e.to_string()))?;

        Ok(Self {
            model: Arc::new(model),
            model_name: model_name.to_string(),
            dimension,
        })
    }

    fn check_dimensions(&self, embeddings: &[Vec<f32>]) -> Result<(), EmbeddingError> {
        match embeddings.iter().find(|e| e.len() != self.dimension) {
            Some(bad) => Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: bad.len(),
            }),
            None => Ok(()),
        }
    }
}

impl EmbeddingProvider for FastEmbedProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
        }

        let mut embeddings = self
            .model
            .embed(vec![text.to_string()], None)
            .map_err(|e| EmbeddingError::GenerationError(e.to_string()))?;
        self.check_dimensions(&embeddings)?;

        embeddings
            .pop()
            .ok_or_else(|| EmbeddingError::GenerationError("No embeddings generated".to_string()))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        // Dropping empty texts would shift every later vector onto the wrong document
        if let Some(pos) = texts.iter().position(|t| t.trim().is_empty()) {
            return Err(EmbeddingError::InvalidInput(format!(
                "Text at position {} is empty",
                pos
            )));
        }

        let embeddings = self
            .model
            .embed(texts.to_vec(), None)
            .map_err(|e| EmbeddingError::GenerationError(e.to_string()))?;

        if embeddings.len() != texts.len() {
            return Err(EmbeddingError::GenerationError(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                embeddings.len()
            )));
        }
        self.check_dimensions(&embeddings)?;

        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
