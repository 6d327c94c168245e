//! Nearest-neighbour search over pre-embedded documents

use super::{CandidateSource, RankedList, RankedSearch, ScoredCandidate, SearchError};
use crate::catalog::Document;
use crate::embedding::{EmbeddingProvider, VectorIndex, VectorIndexError};
use std::sync::Arc;

/// HNSW index plus the provider used to embed queries
///
/// `slots[i]` is the document whose vector was inserted under slot `i`.
pub struct SemanticIndex {
    provider: Arc<dyn EmbeddingProvider>,
    vectors: VectorIndex,
    slots: Vec<Arc<Document>>,
    ef_search: usize,
}

impl SemanticIndex {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        vectors: VectorIndex,
        slots: Vec<Arc<Document>>,
        ef_search: usize,
    ) -> Result<Self, VectorIndexError> {
        if provider.dimension() != vectors.dimension() {
            return Err(VectorIndexError::InvalidDimension {
                expected: vectors.dimension(),
                actual: provider.dimension(),
            });
        }

        Ok(Self {
            provider,
            vectors,
            slots,
            ef_search,
        })
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

impl RankedSearch for SemanticIndex {
    fn source(&self) -> CandidateSource {
        CandidateSource::Semantic
    }

    /// Score is cosine similarity. `k == 0` returns early without embedding the query.
    fn search(&self, query: &str, k: usize) -> Result<RankedList, SearchError> {
        if k == 0 || query.trim().is_empty() {
            return Ok(RankedList::empty());
        }

        let embedding = self
            .provider
            .embed(query)
            .map_err(|e| SearchError::EmbeddingError(e.to_string()))?;

        let hits = self
            .vectors
            .search(&embedding, k, self.ef_search)
            .map_err(|e| SearchError::VectorSearchError(e.to_string()))?;

        let candidates = hits
            .into_iter()
            .filter_map(|hit| {
                self.slots.get(hit.slot).map(|doc| {
                    ScoredCandidate::new(Arc::clone(doc), hit.score, CandidateSource::Semantic)
                })
            })
            .collect();

        Ok(RankedList::new(candidates))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DocumentMetadata;
    use crate::embedding::EmbeddingError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// One axis per known word; counts calls so tests can check laziness
    struct AxisEmbedder {
        vocabulary: Vec<&'static str>,
        calls: AtomicUsize,
    }

    impl EmbeddingProvider for AxisEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let text = text.to_lowercase();
            let mut v: Vec<f32> = self
                .vocabulary
                .iter()
                .map(|w| if text.contains(w) { 1.0 } else { 0.0 })
                .collect();
            v.push(0.1);
            Ok(v)
        }

        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            texts.iter().map(|t| self.embed(t)).collect()
        }

        fn dimension(&self) -> usize {
            self.vocabulary.len() + 1
        }

        fn model_name(&self) -> &str {
            "axis"
        }
    }

    fn build(texts: &[&str]) -> (SemanticIndex, Arc<AxisEmbedder>) {
        let provider = Arc::new(AxisEmbedder {
            vocabulary: vec!["camera", "pin", "gaming"],
            calls: AtomicUsize::new(0),
        });
        let vectors = VectorIndex::new(provider.dimension(), texts.len(), 100, 16).unwrap();
        let mut slots = Vec::new();
        for (i, text) in texts.iter().enumerate() {
            vectors.insert(i, &provider.embed(text).unwrap()).unwrap();
            slots.push(Arc::new(Document::new(
                i.to_string(),
                *text,
                DocumentMetadata::default(),
            )));
        }
        provider.calls.store(0, Ordering::SeqCst);
        let index = SemanticIndex::new(provider.clone(), vectors, slots, 32).unwrap();
        (index, provider)
    }

    #[test]
    fn test_nearest_first() {
        let (index, _) = build(&["máy camera đẹp", "pin trâu", "gaming mượt"]);
        let results = index.search("điện thoại pin lâu", 2).unwrap();

        assert_eq!(results.as_slice()[0].id(), "1");
        assert_eq!(results.len(), 2);
        assert!(results.as_slice()[0].score >= results.as_slice()[1].score);
    }

    #[test]
    fn test_zero_k_skips_embedding() {
        let (index, provider) = build(&["pin trâu"]);
        assert!(index.search("pin", 0).unwrap().is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_dimension_mismatch() {
        let provider = Arc::new(AxisEmbedder {
            vocabulary: vec!["pin"],
            calls: AtomicUsize::new(0),
        });
        let vectors = VectorIndex::new(8, 1, 100, 16).unwrap();
        assert!(SemanticIndex::new(provider, vectors, Vec::new(), 32).is_err());
    }
}
