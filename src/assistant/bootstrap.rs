//! Wiring the assistant together from config

use super::ShopAssistant;
use crate::catalog::{CatalogSource, Document, JsonCatalog};
use crate::config::{expand_path, Config};
use crate::embedding::{CatalogIndexer, EmbeddingProvider, FastEmbedProvider, IndexStats};
use crate::error::{AssistError, Result};
use crate::llm::{LanguageModel, ProviderModel, RetryPolicy};
use crate::memory::{ConversationMemory, SqliteThreadStore, ThreadStore};
use crate::retrieval::{FusionRetriever, LexicalIndex, Reranker, SemanticIndex};
use crate::router::QueryRouter;
use std::sync::Arc;
use std::time::Duration;

/// Both search indexes over one catalog snapshot
pub struct CatalogIndexes {
    pub lexical: LexicalIndex,
    pub semantic: SemanticIndex,
    pub stats: IndexStats,
}

/// Build the keyword and vector indexes; blocking
pub fn build_indexes(
    documents: Vec<Document>,
    embedder: Arc<dyn EmbeddingProvider>,
    config: &Config,
) -> Result<CatalogIndexes> {
    let documents: Vec<Arc<Document>> = documents.into_iter().map(Arc::new).collect();

    let lexical = LexicalIndex::build(&documents, config.indexing.keyword_writer_heap)
        .map_err(|e| AssistError::Index(format!("Keyword index: {}", e)))?;

    let embedded = CatalogIndexer::new(
        Arc::clone(&embedder),
        &config.indexing,
        config.embedding.batch_size,
    )
    .build(&documents)
    .map_err(|e| AssistError::Index(format!("Vector index: {}", e)))?;

    let semantic = SemanticIndex::new(
        embedder,
        embedded.vectors,
        embedded.slots,
        config.indexing.hnsw_ef_search,
    )
    .map_err(|e| AssistError::Index(format!("Vector index: {}", e)))?;

    tracing::info!(
        lexical = lexical.len(),
        semantic = semantic.len(),
        failed = embedded.stats.failed,
        "Catalog indexed"
    );

    Ok(CatalogIndexes {
        lexical,
        semantic,
        stats: embedded.stats,
    })
}

/// External collaborators the assistant is built from
pub struct AssistantComponents {
    pub model: Arc<dyn LanguageModel>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub catalog: Arc<dyn CatalogSource>,
    pub store: Arc<dyn ThreadStore>,
}

impl AssistantComponents {
    /// Concrete backends named in config: model provider, fastembed, JSON catalog, SQLite
    pub async fn from_config(config: &Config) -> Result<Self> {
        let llm = config.llm.clone();
        let rerank = config.rerank.clone();
        let model = tokio::task::spawn_blocking(move || ProviderModel::from_config(&llm, &rerank))
            .await
            .map_err(|e| AssistError::Other(anyhow::anyhow!("Model loading task failed: {}", e)))??;

        let model_name = config.embedding.model.clone();
        let embedder = tokio::task::spawn_blocking(move || FastEmbedProvider::new(&model_name))
            .await
            .map_err(|e| AssistError::Other(anyhow::anyhow!("Embedding loading task failed: {}", e)))?
            .map_err(|e| AssistError::Config(format!("Cannot load embedding model: {}", e)))?;

        let catalog = JsonCatalog::new(expand_path(&config.catalog.path)?);

        let store = SqliteThreadStore::open(&config.threads_db_path()?)?;

        Ok(Self {
            model: Arc::new(model),
            embedder: Arc::new(embedder),
            catalog: Arc::new(catalog),
            store: Arc::new(store),
        })
    }

    /// Index the catalog and connect every stage
    pub async fn assemble(self, config: &Config) -> Result<ShopAssistant> {
        let catalog = Arc::clone(&self.catalog);
        let embedder = Arc::clone(&self.embedder);
        let index_config = config.clone();

        let indexes = tokio::task::spawn_blocking(move || {
            let documents = catalog.get_all_documents()?;
            build_indexes(documents, embedder, &index_config)
        })
        .await
        .map_err(|e| AssistError::Other(anyhow::anyhow!("Index build task failed: {}", e)))??;

        let retriever = FusionRetriever::from_config(
            Arc::new(indexes.lexical),
            Arc::new(indexes.semantic),
            &config.retrieval,
        )?;

        let retry = RetryPolicy::from_config(&config.llm);

        let reranker = config.rerank.enabled.then(|| {
            Reranker::from_config(
                Arc::clone(&self.model),
                &config.rerank,
                Duration::from_secs(config.llm.request_timeout_secs),
            )
        });

        let router = QueryRouter::new(Arc::clone(&self.model), &config.router, retry.clone())?;
        let memory = ConversationMemory::new(self.store, Arc::clone(&self.model), &config.memory, retry);

        Ok(ShopAssistant::new(
            self.model,
            router,
            retriever,
            reranker,
            memory,
            config,
        ))
    }
}

impl ShopAssistant {
    /// Build with the backends named in config
    pub async fn from_config(config: &Config) -> Result<Self> {
        AssistantComponents::from_config(config)
            .await?
            .assemble(config)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DocumentMetadata;
    use crate::embedding::EmbeddingError;
    use crate::retrieval::RankedSearch;

    struct Hashing;

    impl EmbeddingProvider for Hashing {
        fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, EmbeddingError> {
            let mut v = vec![0.1f32; 8];
            for (i, b) in text.bytes().enumerate() {
                v[(b as usize + i) % 8] += 1.0;
            }
            Ok(v)
        }

        fn embed_batch(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError> {
            texts.iter().map(|t| self.embed(t)).collect()
        }

        fn dimension(&self) -> usize {
            8
        }

        fn model_name(&self) -> &str {
            "hashing"
        }
    }

    #[test]
    fn test_build_indexes() {
        let mut config = Config::default();
        config.indexing.vector_dim = 8;

        let documents = vec![
            Document::new("1", "iPhone 15 Pro Max 256GB", DocumentMetadata::default()),
            Document::new("2", "Samsung Galaxy S24 Ultra", DocumentMetadata::default()),
        ];

        let indexes = build_indexes(documents, Arc::new(Hashing), &config).unwrap();
        assert_eq!(indexes.lexical.len(), 2);
        assert_eq!(indexes.semantic.len(), 2);
        assert_eq!(indexes.stats.indexed, 2);

        let hits = indexes.lexical.search("galaxy", 3).unwrap();
        assert_eq!(hits.ids(), vec!["2"]);
    }

    #[test]
    fn test_dimension_mismatch_is_index_error() {
        let config = Config::default();
        let result = build_indexes(Vec::new(), Arc::new(Hashing), &config);
        assert!(matches!(result, Err(AssistError::Index(_))));
    }
}
