//! Query routing
//!
//! Decides whether a message needs a catalog lookup and, if so, rewrites it into a
//! standalone search query. Obvious small talk is caught by regexes before the model
//! is asked. Anything the router cannot decide falls back to plain chat.

mod parse;

pub use parse::{Classification, ParseError, ResponseParser, RouteLabel};

use crate::config::RouterConfig;
use crate::error::{AssistError, Result};
use crate::llm::{LanguageModel, RetryPolicy};
use crate::memory::{ConversationThread, Role};
use regex::Regex;
use serde::Serialize;
use std::sync::Arc;

const ROUTER_INSTRUCTION: &str = "You route messages for Lisa, a sales assistant in a Vietnamese phone shop. \
Decide whether the customer's latest message needs a lookup in the shop's product catalog.

- \"product_search\": questions about phones, prices, specs, colours, stock or promotions, \
including follow-ups about a product mentioned earlier in the conversation.
- \"chat\": greetings, thanks, small talk, questions about Lisa herself and anything else \
that needs no catalog data.

For product_search, rewrite the message as a standalone search query. Resolve references \
such as \"nó\" or \"máy đó\" from the conversation and keep brand, model, storage, colour and \
budget. Leave the query empty for chat.

Reply with a single JSON object and nothing else:
{\"route\": \"chat\" | \"product_search\", \"query\": \"<search query>\"}";

const STRICT_ADDITION: &str = "\n\nYour previous reply could not be parsed. Output ONLY the JSON object on one line, \
using double quotes, with no code fences and no explanation.";

/// Where a message goes next
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "route", rename_all = "snake_case")]
pub enum RouteDecision {
    Chat,
    ProductSearch { normalized_query: String },
}

impl RouteDecision {
    pub fn is_product_search(&self) -> bool {
        matches!(self, RouteDecision::ProductSearch { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            RouteDecision::Chat => "chat",
            RouteDecision::ProductSearch { .. } => "product_search",
        }
    }
}

pub struct QueryRouter {
    model: Arc<dyn LanguageModel>,
    fast_path: Vec<Regex>,
    parser: ResponseParser,
    max_attempts: u32,
    history_window: usize,
    retry: RetryPolicy,
}

impl QueryRouter {
    pub fn new(model: Arc<dyn LanguageModel>, config: &RouterConfig, retry: RetryPolicy) -> Result<Self> {
        let fast_path = if config.fast_path {
            config
                .chat_patterns
                .iter()
                .map(|p| {
                    Regex::new(p).map_err(|e| AssistError::InvalidConfigValue {
                        path: "router.chat_patterns".to_string(),
                        message: format!("Invalid regex '{}': {}", p, e),
                    })
                })
                .collect::<Result<Vec<_>>>()?
        } else {
            Vec::new()
        };

        let parser = ResponseParser::new()
            .map_err(|e| AssistError::Config(format!("Failed to compile router parser: {}", e)))?;

        Ok(Self {
            model,
            fast_path,
            parser,
            max_attempts: config.max_attempts.max(1),
            history_window: config.history_window,
            retry,
        })
    }

    /// Classify `query` given the thread so far; never fails
    pub async fn route(&self, query: &str, thread: &ConversationThread) -> RouteDecision {
        let query = query.trim();
        if query.is_empty() {
            return RouteDecision::Chat;
        }

        if self.fast_path.iter().any(|p| p.is_match(query)) {
            tracing::debug!("Fast-path chat pattern matched");
            return RouteDecision::Chat;
        }

        let mut last_error = String::from("no attempts made");

        for attempt in 1..=self.max_attempts {
            let prompt = self.build_prompt(query, thread, attempt > 1);

            let raw = match self.retry.run("route", || self.model.classify(&prompt)).await {
                Ok(raw) => raw,
                Err(failure) => {
                    let error = AssistError::RoutingAmbiguous(format!(
                        "classifier failed after {} attempts: {}",
                        failure.attempts, failure.error
                    ));
                    tracing::warn!(error = %error, "Routing to chat");
                    return RouteDecision::Chat;
                }
            };

            match self.parser.parse(&raw) {
                Ok(classification) => {
                    let decision = decide(classification, query);
                    tracing::info!(attempt, route = decision.label(), "Query routed");
                    return decision;
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Could not parse routing reply");
                    last_error = e.to_string();
                }
            }
        }

        let error = AssistError::RoutingAmbiguous(last_error);
        tracing::warn!(error = %error, "Routing to chat");
        RouteDecision::Chat
    }

    fn build_prompt(&self, query: &str, thread: &ConversationThread, strict: bool) -> String {
        let mut prompt = String::from(ROUTER_INSTRUCTION);
        if strict {
            prompt.push_str(STRICT_ADDITION);
        }

        if let Some(summary) = &thread.summary {
            prompt.push_str("\n\nConversation summary:\n");
            prompt.push_str(summary);
        }

        let recent = thread.recent(self.history_window);
        if !recent.is_empty() {
            prompt.push_str("\n\nRecent messages:\n");
            for message in recent {
                let speaker = match message.role {
                    Role::User => "Customer",
                    Role::Assistant => "Lisa",
                };
                prompt.push_str(speaker);
                prompt.push_str(": ");
                prompt.push_str(&message.content);
                prompt.push('\n');
            }
        }

        prompt.push_str("\n\nLatest message:\n");
        prompt.push_str(query);
        prompt
    }
}

fn decide(classification: Classification, query: &str) -> RouteDecision {
    match classification.label {
        RouteLabel::Chat => RouteDecision::Chat,
        RouteLabel::ProductSearch => RouteDecision::ProductSearch {
            normalized_query: classification.query.unwrap_or_else(|| query.to_string()),
        },
    }
}
