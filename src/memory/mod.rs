//! Conversation memory
//!
//! Per-thread message history with summarization once a thread grows past a
//! threshold. Writes to one thread are serialized; different threads never contend.

mod sqlite;
mod store;

pub use sqlite::SqliteThreadStore;
pub use store::{InMemoryThreadStore, StoreError, ThreadStore};

use crate::config::MemoryConfig;
use crate::error::{AssistError, Result};
use crate::llm::{LanguageModel, RetryPolicy};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Idle lock entries are dropped once the table grows past this size
const LOCK_TABLE_PRUNE_AT: usize = 1024;

const SUMMARY_SYSTEM_PROMPT: &str =
    "You maintain the running memory of a customer conversation in a phone shop.";

const SUMMARY_INSTRUCTION: &str = "Distill the above chat messages into a single summary message. \
Include as many specific details as you can: product names, prices, colours, budgets and \
anything the customer asked to compare or buy.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Stored state of one conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationThread {
    pub thread_id: String,
    /// Messages not covered by the summary, oldest first
    pub messages: Vec<Message>,
    /// Compressed form of everything older than `messages`
    pub summary: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationThread {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            messages: Vec::new(),
            summary: None,
            updated_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.summary.is_none()
    }

    /// The last `n` messages
    pub fn recent(&self, n: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }
}

/// What happened to a thread after a commit
#[derive(Debug, Clone, PartialEq)]
pub enum SummaryOutcome {
    NotNeeded,
    /// `compressed` older messages were folded into the summary
    Summarized { compressed: usize },
    /// The model call failed; the thread kept its prior summary and full tail
    Failed { error: String },
}

/// Thread history backed by a [`ThreadStore`]
pub struct ConversationMemory {
    store: Arc<dyn ThreadStore>,
    model: Arc<dyn LanguageModel>,
    summary_threshold: usize,
    keep_recent: usize,
    store_timeout: Duration,
    retry: RetryPolicy,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ConversationMemory {
    pub fn new(
        store: Arc<dyn ThreadStore>,
        model: Arc<dyn LanguageModel>,
        config: &MemoryConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            model,
            summary_threshold: config.summary_threshold.max(1),
            keep_recent: whole_exchanges(
                config.keep_recent.min(config.summary_threshold.saturating_sub(1)),
            ),
            store_timeout: config.store_timeout(),
            retry,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Stored thread, or an empty one for an unknown id
    pub async fn load(&self, thread_id: &str) -> Result<ConversationThread> {
        Ok(self
            .fetch(thread_id)
            .await?
            .unwrap_or_else(|| ConversationThread::new(thread_id)))
    }

    /// Append one exchange in a single write
    pub async fn append(&self, thread_id: &str, user: &str, assistant: &str) -> Result<ConversationThread> {
        let lock = self.thread_lock(thread_id);
        let _guard = lock.lock().await;

        let mut thread = self.load(thread_id).await?;
        push_exchange(&mut thread, user, assistant);
        self.save(&thread).await?;
        Ok(thread)
    }

    /// Compress old messages once the thread is past the threshold
    pub async fn maybe_summarize(&self, thread_id: &str) -> Result<SummaryOutcome> {
        let lock = self.thread_lock(thread_id);
        let _guard = lock.lock().await;

        let mut thread = self.load(thread_id).await?;
        let outcome = self.summarize_in_place(&mut thread).await;
        if let SummaryOutcome::Summarized { .. } = outcome {
            self.save(&thread).await?;
        }
        Ok(outcome)
    }

    /// Append an exchange and summarize if needed, under one per-thread lock
    ///
    /// The stored thread changes with a single `put`, so readers see either the old
    /// thread or the new one with its summary already applied.
    pub async fn commit_turn(
        &self,
        thread_id: &str,
        user: &str,
        assistant: &str,
    ) -> Result<(ConversationThread, SummaryOutcome)> {
        let lock = self.thread_lock(thread_id);
        let _guard = lock.lock().await;

        let mut thread = self.load(thread_id).await?;
        push_exchange(&mut thread, user, assistant);
        let outcome = self.summarize_in_place(&mut thread).await;
        self.save(&thread).await?;

        Ok((thread, outcome))
    }

    fn needs_summary(&self, thread: &ConversationThread) -> bool {
        thread.messages.len() > self.summary_threshold
    }

    async fn summarize_in_place(&self, thread: &mut ConversationThread) -> SummaryOutcome {
        if !self.needs_summary(thread) {
            return SummaryOutcome::NotNeeded;
        }

        let split = thread.messages.len() - self.keep_recent;
        let transcript = render_transcript(thread.summary.as_deref(), &thread.messages[..split]);
        let request = vec![Message::user(transcript)];

        let result = self
            .retry
            .run("summarize", || self.model.generate(SUMMARY_SYSTEM_PROMPT, &request))
            .await;

        match result {
            Ok(summary) if !summary.trim().is_empty() => {
                thread.messages.drain(..split);
                thread.summary = Some(summary.trim().to_string());
                thread.updated_at = Utc::now();
                tracing::info!(thread_id = %thread.thread_id, compressed = split, "Thread summarized");
                SummaryOutcome::Summarized { compressed: split }
            }
            Ok(_) => {
                tracing::warn!(thread_id = %thread.thread_id, "Summary came back empty");
                SummaryOutcome::Failed {
                    error: "empty summary".to_string(),
                }
            }
            Err(failure) => {
                tracing::warn!(
                    thread_id = %thread.thread_id,
                    attempts = failure.attempts,
                    error = %failure.error,
                    "Summarization failed; keeping full history"
                );
                SummaryOutcome::Failed {
                    error: failure.error.to_string(),
                }
            }
        }
    }

    async fn fetch(&self, thread_id: &str) -> Result<Option<ConversationThread>> {
        self.with_timeout(self.store.get(thread_id)).await
    }

    async fn save(&self, thread: &ConversationThread) -> Result<()> {
        self.with_timeout(self.store.put(thread)).await
    }

    async fn with_timeout<T>(
        &self,
        call: impl Future<Output = std::result::Result<T, StoreError>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.store_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(AssistError::MemoryStoreUnavailable(e.to_string())),
            Err(_) => Err(AssistError::MemoryStoreUnavailable(
                StoreError::Timeout(self.store_timeout).to_string(),
            )),
        }
    }

    fn thread_lock(&self, thread_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if locks.len() >= LOCK_TABLE_PRUNE_AT {
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }

        Arc::clone(
            locks
                .entry(thread_id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }
}

/// Round down to an even count so the kept tail starts with a user message
fn whole_exchanges(messages: usize) -> usize {
    messages - messages % 2
}

fn push_exchange(thread: &mut ConversationThread, user: &str, assistant: &str) {
    thread.messages.push(Message::user(user));
    thread.messages.push(Message::assistant(assistant));
    thread.updated_at = Utc::now();
}

fn render_transcript(summary: Option<&str>, messages: &[Message]) -> String {
    let mut out = String::new();
    if let Some(summary) = summary {
        out.push_str("Summary of the earlier conversation:\n");
        out.push_str(summary);
        out.push_str("\n\n");
    }
    for message in messages {
        let speaker = match message.role {
            Role::User => "Customer",
            Role::Assistant => "Assistant",
        };
        out.push_str(speaker);
        out.push_str(": ");
        out.push_str(&message.content);
        out.push('\n');
    }
    out.push('\n');
    out.push_str(SUMMARY_INSTRUCTION);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Summarizer {
        fail: bool,
        calls: AtomicUsize,
        last_request: Mutex<String>,
    }

    impl Summarizer {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                fail,
                calls: AtomicUsize::new(0),
                last_request: Mutex::new(String::new()),
            })
        }
    }

    #[async_trait]
    impl LanguageModel for Summarizer {
        fn name(&self) -> &str {
            "summarizer"
        }

        async fn generate(&self, _prompt: &str, context: &[Message]) -> std::result::Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = context[0].content.clone();
            if self.fail {
                Err(LlmError::Provider {
                    status: 400,
                    message: "rejected".to_string(),
                })
            } else {
                Ok("Khách quan tâm iPhone 15".to_string())
            }
        }
    }

    fn memory(model: Arc<Summarizer>) -> (ConversationMemory, Arc<InMemoryThreadStore>) {
        let store = Arc::new(InMemoryThreadStore::new());
        let config = MemoryConfig {
            summary_threshold: 4,
            keep_recent: 2,
            store_timeout_ms: 1_000,
        };
        let memory = ConversationMemory::new(store.clone(), model, &config, RetryPolicy::default());
        (memory, store)
    }

    #[tokio::test]
    async fn test_load_unknown_thread_is_empty_and_idempotent() {
        let (memory, store) = memory(Summarizer::new(false));
        let first = memory.load("new").await.unwrap();
        let second = memory.load("new").await.unwrap();

        assert!(first.is_empty());
        assert_eq!(first.messages, second.messages);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_append_writes_both_halves() {
        let (memory, _) = memory(Summarizer::new(false));
        memory.append("t", "Xin chào", "Chào bạn").await.unwrap();

        let thread = memory.load("t").await.unwrap();
        assert_eq!(thread.messages.len(), 2);
        assert_eq!(thread.messages[0].role, Role::User);
        assert_eq!(thread.messages[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_commit_summarizes_past_threshold() {
        let model = Summarizer::new(false);
        let (memory, _) = memory(model.clone());

        memory.commit_turn("t", "q1", "a1").await.unwrap();
        let (_, outcome) = memory.commit_turn("t", "q2", "a2").await.unwrap();
        assert_eq!(outcome, SummaryOutcome::NotNeeded);

        let (thread, outcome) = memory.commit_turn("t", "q3", "a3").await.unwrap();
        assert_eq!(outcome, SummaryOutcome::Summarized { compressed: 4 });
        assert_eq!(thread.messages.len(), 2);
        assert_eq!(thread.messages[0].content, "q3");
        assert_eq!(thread.summary.as_deref(), Some("Khách quan tâm iPhone 15"));

        let stored = memory.load("t").await.unwrap();
        assert_eq!(stored, thread);
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_previous_summary_feeds_next_one() {
        let model = Summarizer::new(false);
        let (memory, _) = memory(model.clone());

        for i in 0..5 {
            memory
                .commit_turn("t", &format!("q{}", i), &format!("a{}", i))
                .await
                .unwrap();
        }

        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
        let request = model.last_request.lock().unwrap().clone();
        assert!(request.starts_with("Summary of the earlier conversation:"));
        assert!(request.contains("Customer: q3"));
        assert!(request.ends_with(SUMMARY_INSTRUCTION));
    }

    #[tokio::test]
    async fn test_failed_summary_keeps_thread() {
        let (memory, _) = memory(Summarizer::new(true));

        for i in 0..3 {
            memory
                .commit_turn("t", &format!("q{}", i), &format!("a{}", i))
                .await
                .unwrap();
        }

        let thread = memory.load("t").await.unwrap();
        assert_eq!(thread.messages.len(), 6);
        assert!(thread.summary.is_none());

        let outcome = memory.maybe_summarize("t").await.unwrap();
        assert!(matches!(outcome, SummaryOutcome::Failed { .. }));
        assert_eq!(memory.load("t").await.unwrap().messages.len(), 6);
    }

    #[tokio::test]
    async fn test_odd_keep_recent_still_starts_tail_on_user() {
        let store = Arc::new(InMemoryThreadStore::new());
        let config = MemoryConfig {
            summary_threshold: 4,
            keep_recent: 3,
            store_timeout_ms: 1_000,
        };
        let memory = ConversationMemory::new(store, Summarizer::new(false), &config, RetryPolicy::default());

        for i in 0..3 {
            memory
                .commit_turn("t", &format!("q{}", i), &format!("a{}", i))
                .await
                .unwrap();
        }

        let thread = memory.load("t").await.unwrap();
        assert!(thread.summary.is_some());
        assert_eq!(thread.messages.len(), 2);
        assert_eq!(thread.messages[0].role, Role::User);
        assert_eq!(thread.messages[0].content, "q2");
    }

    #[tokio::test]
    async fn test_concurrent_commits_do_not_lose_updates() {
        let (memory, _) = memory(Summarizer::new(false));
        let memory = Arc::new(memory);

        let mut handles = Vec::new();
        for i in 0..8 {
            let memory = Arc::clone(&memory);
            handles.push(tokio::spawn(async move {
                memory
                    .append("shared", &format!("q{}", i), &format!("a{}", i))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(memory.load("shared").await.unwrap().messages.len(), 16);
    }

    #[test]
    fn test_recent_window() {
        let mut thread = ConversationThread::new("t");
        assert!(thread.recent(3).is_empty());
        for i in 0..5 {
            thread.messages.push(Message::user(format!("{}", i)));
        }
        let recent: Vec<&str> = thread.recent(2).iter().map(|m| m.content.as_str()).collect();
        assert_eq!(recent, vec!["3", "4"]);
    }
}
