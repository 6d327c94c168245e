//! Weighted Reciprocal Rank Fusion for combining search results

use super::{CandidateSource, RankedList, ScoredCandidate};
use crate::catalog::Document;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum FusionError {
    #[error("Invalid weight configuration: {0}")]
    InvalidWeights(String),

    #[error("Invalid rank offset: {0}")]
    InvalidOffset(f32),
}

/// Configuration for fusion algorithm
#[derive(Debug, Clone, PartialEq)]
pub struct FusionConfig {
    /// RRF offset added to every 1-based rank (typically 60)
    pub rrf_k: f32,

    /// Weight for keyword results
    pub lexical_weight: f32,

    /// Weight for semantic results
    pub semantic_weight: f32,
}

impl FusionConfig {
    /// Weights must be finite and non-negative, and not both zero. They need not sum to 1.
    pub fn new(rrf_k: f32, lexical_weight: f32, semantic_weight: f32) -> Result<Self, FusionError> {
        for (name, weight) in [("lexical", lexical_weight), ("semantic", semantic_weight)] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(FusionError::InvalidWeights(format!(
                    "{} weight must be finite and non-negative, got {}",
                    name, weight
                )));
            }
        }
        if lexical_weight == 0.0 && semantic_weight == 0.0 {
            return Err(FusionError::InvalidWeights(
                "weights cannot both be zero".to_string(),
            ));
        }
        if !rrf_k.is_finite() || rrf_k < 0.0 {
            return Err(FusionError::InvalidOffset(rrf_k));
        }

        Ok(Self {
            rrf_k,
            lexical_weight,
            semantic_weight,
        })
    }

    /// Fused score for a document at the given ranks; an absent rank contributes nothing
    pub fn score(&self, lexical_rank: Option<usize>, semantic_rank: Option<usize>) -> f64 {
        let term = |weight: f32, rank: Option<usize>| match rank {
            Some(rank) => f64::from(weight) / (rank as f64 + f64::from(self.rrf_k)),
            None => 0.0,
        };
        term(self.lexical_weight, lexical_rank) + term(self.semantic_weight, semantic_rank)
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            rrf_k: 60.0,
            lexical_weight: 0.3,
            semantic_weight: 0.7,
        }
    }
}

struct FusedEntry {
    document: Arc<Document>,
    lexical_rank: Option<usize>,
    semantic_rank: Option<usize>,
    score: f64,
}

/// Present ranks sort before absent ones, lower ranks first
fn rank_order(a: Option<usize>, b: Option<usize>) -> Ordering {
    a.unwrap_or(usize::MAX).cmp(&b.unwrap_or(usize::MAX))
}

/// Apply weighted Reciprocal Rank Fusion to the two ranked lists
///
/// `score(d) = lexical_weight / (rank_lex(d) + k) + semantic_weight / (rank_sem(d) + k)`
///
/// Returns at most `limit` candidates, best first. Equal scores are ordered by lexical
/// rank, then semantic rank, then document id, so the output depends only on ranks.
pub fn reciprocal_rank_fusion(
    lexical: &RankedList,
    semantic: &RankedList,
    config: &FusionConfig,
    limit: usize,
) -> RankedList {
    let mut entries: HashMap<&str, FusedEntry> = HashMap::new();

    for (pos, candidate) in lexical.iter().enumerate() {
        entries
            .entry(candidate.id())
            .or_insert_with(|| FusedEntry {
                document: Arc::clone(&candidate.document),
                lexical_rank: None,
                semantic_rank: None,
                score: 0.0,
            })
            .lexical_rank = Some(pos + 1);
    }

    for (pos, candidate) in semantic.iter().enumerate() {
        entries
            .entry(candidate.id())
            .or_insert_with(|| FusedEntry {
                document: Arc::clone(&candidate.document),
                lexical_rank: None,
                semantic_rank: None,
                score: 0.0,
            })
            .semantic_rank = Some(pos + 1);
    }

    let mut fused: Vec<FusedEntry> = entries
        .into_values()
        .map(|mut entry| {
            entry.score = config.score(entry.lexical_rank, entry.semantic_rank);
            entry
        })
        .collect();

    fused.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| rank_order(a.lexical_rank, b.lexical_rank))
            .then_with(|| rank_order(a.semantic_rank, b.semantic_rank))
            .then_with(|| a.document.id.cmp(&b.document.id))
    });
    fused.truncate(limit);

    RankedList::new(
        fused
            .into_iter()
            .map(|e| ScoredCandidate::new(e.document, e.score as f32, CandidateSource::Fused))
            .collect(),
    )
}
