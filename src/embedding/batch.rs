/// Batch embedding of catalog documents into a vector index
use super::{EmbeddingError, EmbeddingProvider, VectorIndex, VectorIndexError};
use crate::catalog::Document;
use crate::config::IndexingConfig;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Counts from one indexing run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub indexed: usize,
    pub failed: usize,
    pub duration_ms: u64,
}

/// Vectors for the documents that embedded successfully
///
/// `slots[i]` is the document stored under vector slot `i`.
pub struct EmbeddedCatalog {
    pub vectors: VectorIndex,
    pub slots: Vec<Arc<Document>>,
    pub stats: IndexStats,
}

/// Embeds documents in batches and fills an HNSW index
///
/// A batch that fails to embed is skipped and counted; the rest of the catalog is
/// still indexed.
pub struct CatalogIndexer {
    provider: Arc<dyn EmbeddingProvider>,
    dimension: usize,
    ef_construction: usize,
    m: usize,
    batch_size: usize,
}

impl CatalogIndexer {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: &IndexingConfig, batch_size: usize) -> Self {
        Self {
            provider,
            dimension: config.vector_dim,
            ef_construction: config.hnsw_ef_construction,
            m: config.hnsw_m,
            batch_size: batch_size.max(1),
        }
    }

    /// Embed and insert every document; blocking, run it off the async runtime
    pub fn build(&self, documents: &[Arc<Document>]) -> Result<EmbeddedCatalog, VectorIndexError> {
        if self.provider.dimension() != self.dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension,
                actual: self.provider.dimension(),
            });
        }

        let start = Instant::now();
        let vectors = VectorIndex::new(self.dimension, documents.len(), self.ef_construction, self.m)?;
        let mut slots = Vec::with_capacity(documents.len());
        let mut failed = 0;

        info!(
            documents = documents.len(),
            model = self.provider.model_name(),
            "Embedding catalog"
        );

        for chunk in documents.chunks(self.batch_size) {
            match self.embed_chunk(chunk) {
                Ok(embeddings) => {
                    for (doc, embedding) in chunk.iter().zip(embeddings) {
                        let slot = slots.len();
                        match vectors.insert(slot, &embedding) {
                            Ok(()) => slots.push(Arc::clone(doc)),
                            Err(e) => {
                                warn!(id = %doc.id, error = %e, "Skipping document");
                                failed += 1;
                            }
                        }
                    }
                    debug!(batch = chunk.len(), "Embedded batch");
                }
                Err(e) => {
                    warn!(batch = chunk.len(), error = %e, "Failed to embed batch");
                    failed += chunk.len();
                }
            }
        }

        let stats = IndexStats {
            indexed: slots.len(),
            failed,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            "Catalog embedded: {} indexed, {} failed, {}ms",
            stats.indexed, stats.failed, stats.duration_ms
        );

        Ok(EmbeddedCatalog { vectors, slots, stats })
    }

    fn embed_chunk(&self, chunk: &[Arc<Document>]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let texts: Vec<String> = chunk.iter().map(|doc| doc.text.clone()).collect();
        let embeddings = self.provider.embed_batch(&texts)?;

        if embeddings.len() != chunk.len() {
            return Err(EmbeddingError::GenerationError(format!(
                "Embedding count mismatch: expected {}, got {}",
                chunk.len(),
                embeddings.len()
            )));
        }
        Ok(embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DocumentMetadata;
    use crate::config::Config;

    /// Three-dimensional embedder; texts containing "fail" break their batch
    struct Letters;

    impl EmbeddingProvider for Letters {
        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            if text.contains("fail") {
                return Err(EmbeddingError::GenerationError("bad input".to_string()));
            }
            let count = |c: char| text.chars().filter(|x| *x == c).count() as f32;
            Ok(vec![count('a') + 0.1, count('b'), count('c')])
        }

        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            texts.iter().map(|t| self.embed(t)).collect()
        }

        fn dimension(&self) -> usize {
            3
        }

        fn model_name(&self) -> &str {
            "letters"
        }
    }

    fn docs(texts: &[&str]) -> Vec<Arc<Document>> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| Arc::new(Document::new(i.to_string(), *t, DocumentMetadata::default())))
            .collect()
    }

    fn indexer(batch_size: usize) -> CatalogIndexer {
        let mut config = Config::default().indexing;
        config.vector_dim = 3;
        CatalogIndexer::new(Arc::new(Letters), &config, batch_size)
    }

    #[test]
    fn test_indexes_all_documents() {
        let catalog = indexer(2).build(&docs(&["aaa", "bbb", "ccc", "abc"])).unwrap();
        assert_eq!(catalog.stats.indexed, 4);
        assert_eq!(catalog.stats.failed, 0);
        assert_eq!(catalog.vectors.len(), 4);
        assert_eq!(catalog.slots[3].id, "3");
    }

    #[test]
    fn test_failed_batch_is_skipped() {
        let catalog = indexer(2).build(&docs(&["aaa", "fail", "bbb", "ccc"])).unwrap();
        assert_eq!(catalog.stats.failed, 2);
        assert_eq!(catalog.stats.indexed, 2);
        let ids: Vec<&str> = catalog.slots.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "3"]);
    }

    #[test]
    fn test_empty_catalog() {
        let catalog = indexer(8).build(&[]).unwrap();
        assert!(catalog.vectors.is_empty());
        assert_eq!(catalog.stats.indexed, 0);
    }

    #[test]
    fn test_dimension_mismatch() {
        let config = Config::default().indexing;
        let result = CatalogIndexer::new(Arc::new(Letters), &config, 4).build(&[]);
        assert!(matches!(result, Err(VectorIndexError::InvalidDimension { .. })));
    }
}
