//! Turn handling
//!
//! One turn: load the thread, route the message, search the catalog when the router
//! asks for it, generate the reply and commit the exchange to memory.

mod bootstrap;
mod prompt;

pub use bootstrap::{build_indexes, AssistantComponents, CatalogIndexes};
pub use prompt::{format_context, format_vnd, PromptBuilder, NO_PRODUCT_FOUND};

use crate::config::Config;
use crate::error::{AssistError, Result};
use crate::llm::{LanguageModel, RetryPolicy};
use crate::memory::{ConversationMemory, ConversationThread, Message, SummaryOutcome};
use crate::retrieval::{CandidateSource, FusionRetriever, RankedList, Reranker, ScoredCandidate};
use crate::router::{QueryRouter, RouteDecision};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Something the caller should know about a turn that still succeeded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "notice", content = "source", rename_all = "snake_case")]
pub enum TurnNotice {
    /// One index failed; results come from the other alone
    IndexDegraded(CandidateSource),
    /// Relevance scoring failed; fused results were used unfiltered
    RerankSkipped,
    /// History could not be read or the new exchange could not be saved
    ContinuityLost,
}

impl fmt::Display for TurnNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnNotice::IndexDegraded(source) => write!(f, "{} index unavailable, results may be incomplete", source),
            TurnNotice::RerankSkipped => f.write_str("re-ranking skipped, results are unfiltered"),
            TurnNotice::ContinuityLost => f.write_str("conversation history unavailable for this turn"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnResponse {
    pub thread_id: String,
    pub response: String,
    pub route: RouteDecision,
    /// Products the reply was grounded in, best first
    pub products: Vec<ScoredCandidate>,
    pub notices: Vec<TurnNotice>,
}

/// Ranked products for a query plus any degradation along the way
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub candidates: RankedList,
    pub notices: Vec<TurnNotice>,
}

pub struct ShopAssistant {
    model: Arc<dyn LanguageModel>,
    router: QueryRouter,
    retriever: FusionRetriever,
    reranker: Option<Reranker>,
    memory: ConversationMemory,
    prompts: PromptBuilder,
    retry: RetryPolicy,
    top_k: usize,
    rerank_threshold: f32,
}

impl ShopAssistant {
    /// `reranker` is `None` when re-ranking is switched off
    pub fn new(
        model: Arc<dyn LanguageModel>,
        router: QueryRouter,
        retriever: FusionRetriever,
        reranker: Option<Reranker>,
        memory: ConversationMemory,
        config: &Config,
    ) -> Self {
        Self {
            model,
            router,
            retriever,
            reranker,
            memory,
            prompts: PromptBuilder::new(&config.assistant),
            retry: RetryPolicy::from_config(&config.llm),
            top_k: config.retrieval.top_k,
            rerank_threshold: config.rerank.threshold,
        }
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    /// Answer one message; a missing thread id starts a new thread
    ///
    /// Memory is only written after a reply was generated, so a failed turn leaves the
    /// stored thread as it was.
    pub async fn handle_turn(&self, thread_id: Option<String>, message: &str) -> Result<TurnResponse> {
        let message = message.trim();
        if message.is_empty() {
            return Err(AssistError::InvalidRequest("Message must not be empty".to_string()));
        }

        let thread_id = thread_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let mut notices = Vec::new();

        let thread = match self.memory.load(&thread_id).await {
            Ok(thread) => thread,
            Err(e) => {
                tracing::warn!(thread_id = %thread_id, error = %e, "Continuing without history");
                notices.push(TurnNotice::ContinuityLost);
                ConversationThread::new(&thread_id)
            }
        };

        let route = self.router.route(message, &thread).await;

        let products = match &route {
            RouteDecision::Chat => None,
            RouteDecision::ProductSearch { normalized_query } => {
                let outcome = self.search(normalized_query, self.top_k, true).await?;
                notices.extend(outcome.notices);
                Some(outcome.candidates)
            }
        };

        let system = self.prompts.system_prompt(
            thread.summary.as_deref(),
            products.as_ref().map(RankedList::as_slice),
        );

        let mut context = thread.messages.clone();
        context.push(Message::user(message));

        let response = self
            .retry
            .run("generate", || self.model.generate(&system, &context))
            .await
            .map_err(|failure| AssistError::GenerationFailed {
                attempts: failure.attempts,
                message: failure.error.to_string(),
            })?;

        match self.memory.commit_turn(&thread_id, message, &response).await {
            Ok((_, SummaryOutcome::Failed { error })) => {
                tracing::warn!(thread_id = %thread_id, error = %error, "Thread kept unsummarized");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(thread_id = %thread_id, error = %e, "Exchange was not saved");
                if !notices.contains(&TurnNotice::ContinuityLost) {
                    notices.push(TurnNotice::ContinuityLost);
                }
            }
        }

        tracing::info!(
            thread_id = %thread_id,
            route = route.label(),
            products = products.as_ref().map(RankedList::len).unwrap_or(0),
            notices = notices.len(),
            "Turn complete"
        );

        Ok(TurnResponse {
            thread_id,
            response,
            route,
            products: products.map(RankedList::into_vec).unwrap_or_default(),
            notices,
        })
    }

    /// Fused search, re-ranked when enabled and the policy applies
    pub async fn search(&self, query: &str, k: usize, allow_rerank: bool) -> Result<SearchOutcome> {
        let fused = self.retriever.fuse(query, k).await?;
        let mut notices: Vec<TurnNotice> = fused
            .degraded
            .iter()
            .map(|source| TurnNotice::IndexDegraded(*source))
            .collect();

        let mut candidates = fused.candidates;

        match &self.reranker {
            Some(reranker) if allow_rerank && reranker.applies_to(query) => {
                let outcome = reranker.rerank(query, candidates, self.rerank_threshold).await;
                if outcome.degraded {
                    let error = AssistError::RerankUnavailable("relevance scoring failed".to_string());
                    tracing::warn!(error = %error, "Using fused ranking");
                    notices.push(TurnNotice::RerankSkipped);
                }
                candidates = outcome.candidates;
            }
            Some(_) if allow_rerank => {
                tracing::debug!("No analysis keyword in query; skipping re-ranking");
            }
            _ => {}
        }

        Ok(SearchOutcome { candidates, notices })
    }
}
