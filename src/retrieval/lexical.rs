//! Keyword (BM25) search over catalog documents

use super::{CandidateSource, RankedList, RankedSearch, ScoredCandidate, SearchError};
use crate::catalog::Document;
use crate::embedding::{KeywordIndex, KeywordIndexError};
use std::collections::HashMap;
use std::sync::Arc;

/// BM25 index that resolves hits back to shared documents
pub struct LexicalIndex {
    keywords: KeywordIndex,
    documents: HashMap<String, Arc<Document>>,
}

impl LexicalIndex {
    /// Index every document's title and text in memory
    pub fn build(documents: &[Arc<Document>], writer_heap: usize) -> Result<Self, KeywordIndexError> {
        let mut keywords = KeywordIndex::in_memory(writer_heap)?;
        let mut by_id = HashMap::with_capacity(documents.len());

        for doc in documents {
            keywords.insert(&doc.id, doc.title(), &doc.text)?;
            by_id.insert(doc.id.clone(), Arc::clone(doc));
        }
        keywords.commit()?;

        tracing::debug!(documents = by_id.len(), "Keyword index built");
        Ok(Self {
            keywords,
            documents: by_id,
        })
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl RankedSearch for LexicalIndex {
    fn source(&self) -> CandidateSource {
        CandidateSource::Lexical
    }

    fn search(&self, query: &str, k: usize) -> Result<RankedList, SearchError> {
        let hits = self
            .keywords
            .search(query, k)
            .map_err(|e| SearchError::KeywordSearchError(e.to_string()))?;

        let candidates = hits
            .into_iter()
            .filter_map(|hit| match self.documents.get(&hit.id) {
                Some(doc) => Some(ScoredCandidate::new(
                    Arc::clone(doc),
                    hit.score,
                    CandidateSource::Lexical,
                )),
                None => {
                    tracing::warn!(id = %hit.id, "Keyword hit without a catalog document");
                    None
                }
            })
            .collect();

        Ok(RankedList::new(candidates))
    }
}
