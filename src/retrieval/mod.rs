//! Hybrid Retrieval & Reranking
//!
//! Keyword and semantic search run side by side and are merged with weighted
//! Reciprocal Rank Fusion; a cross-encoder pass then filters the fused list by a
//! relevance threshold.

mod candidate;
mod fusion;
mod hybrid;
mod lexical;
mod reranker;
mod semantic;

pub use candidate::{CandidateSource, RankedList, ScoredCandidate};
pub use fusion::{reciprocal_rank_fusion, FusionConfig, FusionError};
pub use hybrid::{FusedResults, FusionRetriever, RankedSearch, SearchError};
pub use lexical::LexicalIndex;
pub use reranker::{RerankOutcome, Reranker};
pub use semantic::SemanticIndex;
