//! Cross-encoder re-ranking with a relevance threshold

use super::{RankedList, ScoredCandidate};
use crate::config::{RerankConfig, RerankMode};
use crate::llm::LanguageModel;
use std::sync::Arc;
use std::time::Duration;

/// Result of a re-ranking pass
#[derive(Debug, Clone)]
pub struct RerankOutcome {
    pub candidates: RankedList,
    /// Scoring was unavailable and the input passed through unfiltered
    pub degraded: bool,
}

/// Scores (query, document) pairs and keeps those at or above a threshold
pub struct Reranker {
    model: Arc<dyn LanguageModel>,
    mode: RerankMode,
    keywords: Vec<String>,
    timeout: Duration,
}

impl Reranker {
    pub fn new(model: Arc<dyn LanguageModel>, timeout: Duration) -> Self {
        Self {
            model,
            mode: RerankMode::Always,
            keywords: Vec::new(),
            timeout,
        }
    }

    pub fn from_config(model: Arc<dyn LanguageModel>, config: &RerankConfig, timeout: Duration) -> Self {
        Self {
            model,
            mode: config.mode,
            keywords: config.keywords.iter().map(|k| k.to_lowercase()).collect(),
            timeout,
        }
    }

    /// Whether the policy asks for re-ranking of this query
    ///
    /// In keyword mode only analytical queries ("so sánh", "đánh giá"...) are re-ranked.
    pub fn applies_to(&self, query: &str) -> bool {
        match self.mode {
            RerankMode::Always => true,
            RerankMode::Keywords => {
                let query = query.to_lowercase();
                self.keywords.iter().any(|k| query.contains(k.as_str()))
            }
        }
    }

    /// Re-score `candidates` and drop those scoring below `threshold`
    ///
    /// Survivors are sorted by score descending; equal scores keep their input order.
    /// If scoring fails the input is returned unchanged with `degraded` set.
    pub async fn rerank(&self, query: &str, candidates: RankedList, threshold: f32) -> RerankOutcome {
        if candidates.is_empty() {
            return RerankOutcome {
                candidates,
                degraded: false,
            };
        }

        let texts: Vec<String> = candidates.iter().map(|c| c.document.text.clone()).collect();
        let scored = tokio::time::timeout(self.timeout, self.model.score_pairs(query, &texts)).await;

        let scores = match scored {
            Ok(Ok(scores)) if scores.len() == texts.len() && scores.iter().all(|s| s.is_finite()) => {
                scores
            }
            Ok(Ok(scores)) => {
                tracing::warn!(
                    expected = texts.len(),
                    got = scores.len(),
                    "Reranker returned unusable scores; passing fused results through"
                );
                return Self::passthrough(candidates);
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Reranker unavailable; passing fused results through");
                return Self::passthrough(candidates);
            }
            Err(_) => {
                tracing::warn!(timeout = ?self.timeout, "Reranker timed out; passing fused results through");
                return Self::passthrough(candidates);
            }
        };

        let mut rescored: Vec<ScoredCandidate> = candidates
            .into_iter()
            .zip(scores)
            .filter(|(_, score)| *score >= threshold)
            .map(|(candidate, score)| ScoredCandidate::new(candidate.document, score, candidate.source))
            .collect();

        // sort_by is stable, so ties keep the fused order
        rescored.sort_by(|a, b| b.score.total_cmp(&a.score));

        tracing::debug!(kept = rescored.len(), threshold, "Re-ranked candidates");

        RerankOutcome {
            candidates: RankedList::new(rescored),
            degraded: false,
        }
    }

    fn passthrough(candidates: RankedList) -> RerankOutcome {
        RerankOutcome {
            candidates,
            degraded: true,
        }
    }
}
