//! Hybrid search combining semantic and keyword search

use super::{reciprocal_rank_fusion, CandidateSource, FusionConfig, RankedList};
use crate::config::RetrievalConfig;
use crate::error::{AssistError, Result};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Embedding generation failed: {0}")]
    EmbeddingError(String),

    #[error("Vector search failed: {0}")]
    VectorSearchError(String),

    #[error("Keyword search failed: {0}")]
    KeywordSearchError(String),

    #[error("{index} search timed out after {timeout_ms}ms")]
    Timeout {
        index: CandidateSource,
        timeout_ms: u128,
    },

    #[error("Search task failed: {0}")]
    TaskFailed(String),
}

/// An index that answers a query with a ranked list
///
/// Implementations are synchronous and CPU-bound; the retriever runs them on the
/// blocking pool.
pub trait RankedSearch: Send + Sync {
    fn source(&self) -> CandidateSource;

    fn search(&self, query: &str, k: usize) -> std::result::Result<RankedList, SearchError>;
}

/// Fused candidates plus the sources that could not contribute
#[derive(Debug, Clone, Default)]
pub struct FusedResults {
    pub candidates: RankedList,
    pub degraded: Vec<CandidateSource>,
}

impl FusedResults {
    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }
}

/// Runs both indexes concurrently and fuses their rankings
pub struct FusionRetriever {
    lexical: Arc<dyn RankedSearch>,
    semantic: Arc<dyn RankedSearch>,
    fusion: FusionConfig,
    search_multiplier: usize,
    timeout: Duration,
}

impl FusionRetriever {
    pub fn new(
        lexical: Arc<dyn RankedSearch>,
        semantic: Arc<dyn RankedSearch>,
        fusion: FusionConfig,
        search_multiplier: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            lexical,
            semantic,
            fusion,
            search_multiplier: search_multiplier.max(1),
            timeout,
        }
    }

    pub fn from_config(
        lexical: Arc<dyn RankedSearch>,
        semantic: Arc<dyn RankedSearch>,
        config: &RetrievalConfig,
    ) -> Result<Self> {
        let fusion = FusionConfig::new(config.rrf_k, config.lexical_weight, config.semantic_weight)
            .map_err(|e| AssistError::InvalidConfigValue {
                path: "retrieval".to_string(),
                message: e.to_string(),
            })?;

        Ok(Self::new(
            lexical,
            semantic,
            fusion,
            config.search_multiplier,
            config.search_timeout(),
        ))
    }

    /// Top `k` documents by weighted reciprocal rank
    ///
    /// Each index is asked for `k * search_multiplier` candidates. If one index fails
    /// (after one immediate retry) the other's ranking is fused alone and the failed
    /// source is reported; if both fail the query is `RetrievalUnavailable`.
    pub async fn fuse(&self, query: &str, k: usize) -> Result<FusedResults> {
        if k == 0 {
            return Ok(FusedResults::default());
        }

        let search_limit = k.saturating_mul(self.search_multiplier);

        let (lexical, semantic) = tokio::join!(
            self.search_leg(&self.lexical, query, search_limit),
            self.search_leg(&self.semantic, query, search_limit)
        );

        let mut degraded = Vec::new();
        let (lexical, semantic) = match (lexical, semantic) {
            (Ok(l), Ok(s)) => (l, s),
            (Ok(l), Err(e)) => {
                tracing::warn!(error = %e, "Semantic search unavailable; using keyword results only");
                degraded.push(CandidateSource::Semantic);
                (l, RankedList::empty())
            }
            (Err(e), Ok(s)) => {
                tracing::warn!(error = %e, "Keyword search unavailable; using semantic results only");
                degraded.push(CandidateSource::Lexical);
                (RankedList::empty(), s)
            }
            (Err(le), Err(se)) => {
                return Err(AssistError::RetrievalUnavailable(format!(
                    "lexical: {}; semantic: {}",
                    le, se
                )));
            }
        };

        let candidates = reciprocal_rank_fusion(&lexical, &semantic, &self.fusion, k);

        tracing::debug!(
            lexical = lexical.len(),
            semantic = semantic.len(),
            fused = candidates.len(),
            "Fused search results"
        );

        Ok(FusedResults {
            candidates,
            degraded,
        })
    }

    /// One search with a single immediate retry
    async fn search_leg(
        &self,
        index: &Arc<dyn RankedSearch>,
        query: &str,
        limit: usize,
    ) -> std::result::Result<RankedList, SearchError> {
        match self.attempt(index, query, limit).await {
            Ok(list) => Ok(list),
            Err(e) => {
                tracing::debug!(source = %index.source(), error = %e, "Retrying search");
                self.attempt(index, query, limit).await
            }
        }
    }

    async fn attempt(
        &self,
        index: &Arc<dyn RankedSearch>,
        query: &str,
        limit: usize,
    ) -> std::result::Result<RankedList, SearchError> {
        let source = index.source();
        let index = Arc::clone(index);
        let query = query.to_string();
        let task = tokio::task::spawn_blocking(move || index.search(&query, limit));

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(SearchError::TaskFailed(join_error.to_string())),
            Err(_) => Err(SearchError::Timeout {
                index: source,
                timeout_ms: self.timeout.as_millis(),
            }),
        }
    }
}
