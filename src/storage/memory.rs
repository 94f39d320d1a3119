//! In-memory message log. Nothing survives the process; useful as a test
//! double and for throwaway sessions.

use super::{MessageStore, StoreError};
use crate::core::message::Message;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct InMemoryMessageStore {
    threads: Arc<RwLock<HashMap<String, Vec<Message>>>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self {
            threads: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryMessageStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn append(&self, thread_id: &str, message: &Message) -> Result<(), StoreError> {
        let mut threads = self.threads.write().await;
        threads
            .entry(thread_id.to_string())
            .or_default()
            .push(message.clone());
        tracing::debug!("[InMemoryMessageStore] Appended message for thread '{}'", thread_id);
        Ok(())
    }

    async fn read(&self, thread_id: &str) -> Result<Vec<Message>, StoreError> {
        let threads = self.threads.read().await;
        Ok(threads.get(thread_id).cloned().unwrap_or_default())
    }

    async fn list_threads(&self) -> Result<Vec<String>, StoreError> {
        let threads = self.threads.read().await;
        Ok(threads.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_and_read() {
        let store = InMemoryMessageStore::new();
        store.append("t", &Message::user("Hello")).await.unwrap();
        store
            .append("t", &Message::assistant("Hi there"))
            .await
            .unwrap();

        let history = store.read("t").await.unwrap();
        assert_eq!(
            history,
            vec![Message::user("Hello"), Message::assistant("Hi there")]
        );
    }

    #[tokio::test]
    async fn unknown_thread_is_empty() {
        let store = InMemoryMessageStore::new();
        assert!(store.read("nope").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn lists_distinct_threads() {
        let store = InMemoryMessageStore::new();
        store.append("one", &Message::user("x")).await.unwrap();
        store.append("one", &Message::user("y")).await.unwrap();
        store.append("two", &Message::user("z")).await.unwrap();

        let mut threads = store.list_threads().await.unwrap();
        threads.sort();
        assert_eq!(threads, vec!["one", "two"]);
    }
}
