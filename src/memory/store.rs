//! Keyed persistence for conversation threads

use super::ConversationThread;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Stored thread is corrupt: {0}")]
    Corrupt(String),

    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),
}

/// Get/put store for whole threads
///
/// `put` replaces the stored thread in one step; readers see either the old or the new
/// value, never a mix.
#[async_trait]
pub trait ThreadStore: Send + Sync {
    async fn get(&self, thread_id: &str) -> Result<Option<ConversationThread>, StoreError>;

    async fn put(&self, thread: &ConversationThread) -> Result<(), StoreError>;
}

/// Process-local store, lost on exit
#[derive(Default)]
pub struct InMemoryThreadStore {
    threads: RwLock<HashMap<String, ConversationThread>>,
}

impl InMemoryThreadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.threads
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ThreadStore for InMemoryThreadStore {
    async fn get(&self, thread_id: &str) -> Result<Option<ConversationThread>, StoreError> {
        let threads = self
            .threads
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(threads.get(thread_id).cloned())
    }

    async fn put(&self, thread: &ConversationThread) -> Result<(), StoreError> {
        let mut threads = self
            .threads
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        threads.insert(thread.thread_id.clone(), thread.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Message;

    #[tokio::test]
    async fn test_get_put() {
        let store = InMemoryThreadStore::new();
        assert!(store.get("t1").await.unwrap().is_none());

        let mut thread = ConversationThread::new("t1");
        thread.messages.push(Message::user("Xin chào"));
        store.put(&thread).await.unwrap();

        let loaded = store.get("t1").await.unwrap().unwrap();
        assert_eq!(loaded.messages.len(), 1);
        assert_eq!(store.len(), 1);
    }
}
