//! The active conversation: a thread id plus its ordered message sequence,
//! kept in lockstep with the durable store.

use crate::core::message::{Message, Role};
use crate::storage::{MessageStore, StoreError};
use std::sync::Arc;
use uuid::Uuid;

pub struct ChatSession {
    thread_id: String,
    history: Vec<Message>,
    store: Arc<dyn MessageStore>,
}

impl ChatSession {
    /// A fresh conversation with a newly minted 128-bit random identifier.
    /// Nothing is written to the store until the first append.
    pub fn start_new(store: Arc<dyn MessageStore>) -> Self {
        let thread_id = Uuid::new_v4().to_string();
        tracing::info!("[ChatSession] Started new thread '{}'", thread_id);
        Self {
            thread_id,
            history: Vec::new(),
            store,
        }
    }

    /// Resume a conversation by replaying the store. An identifier the store
    /// has never seen yields an empty history: a pre-named conversation,
    /// not an error.
    pub async fn load(
        store: Arc<dyn MessageStore>,
        thread_id: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let thread_id = thread_id.into();
        let history = store.read(&thread_id).await?;
        tracing::info!(
            "[ChatSession] Loaded {} messages for thread '{}'",
            history.len(),
            thread_id
        );
        Ok(Self {
            thread_id,
            history,
            store,
        })
    }

    pub async fn append_user(&mut self, content: impl Into<String>) -> Result<(), StoreError> {
        self.append(Message::user(content)).await
    }

    pub async fn append_assistant(
        &mut self,
        content: impl Into<String>,
    ) -> Result<(), StoreError> {
        self.append(Message::assistant(content)).await
    }

    /// In-memory first, then durable; the in-memory entry is rolled back if
    /// the durable append fails, so history and store never diverge.
    async fn append(&mut self, message: Message) -> Result<(), StoreError> {
        self.history.push(message.clone());
        if let Err(err) = self.store.append(&self.thread_id, &message).await {
            self.history.pop();
            return Err(err);
        }
        Ok(())
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn message_count(&self) -> usize {
        self.history.len()
    }

    /// Role of the last entry, if any. The surface uses this to decide
    /// whether the previous turn got its reply.
    pub fn last_role(&self) -> Option<Role> {
        self.history.last().map(|m| m.role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryMessageStore;
    use async_trait::async_trait;

    /// Store double whose appends always fail.
    struct FailingStore;

    #[async_trait]
    impl MessageStore for FailingStore {
        async fn append(&self, _thread_id: &str, _message: &Message) -> Result<(), StoreError> {
            Err(StoreError::Corrupt("disk on fire".to_string()))
        }

        async fn read(&self, _thread_id: &str) -> Result<Vec<Message>, StoreError> {
            Ok(Vec::new())
        }

        async fn list_threads(&self) -> Result<Vec<String>, StoreError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn new_sessions_get_unique_ids_and_write_nothing() {
        let store = Arc::new(InMemoryMessageStore::new());
        let a = ChatSession::start_new(store.clone());
        let b = ChatSession::start_new(store.clone());

        assert_ne!(a.thread_id(), b.thread_id());
        assert!(store.list_threads().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn round_trip_through_store() {
        let store = Arc::new(InMemoryMessageStore::new());

        let mut session = ChatSession::start_new(store.clone());
        session.append_user("Hello").await.unwrap();
        session.append_assistant("Hi there").await.unwrap();

        let reloaded = ChatSession::load(store, session.thread_id().to_string())
            .await
            .unwrap();
        assert_eq!(
            reloaded.history(),
            &[Message::user("Hello"), Message::assistant("Hi there")]
        );
    }

    #[tokio::test]
    async fn load_of_unknown_id_is_empty_not_error() {
        let store = Arc::new(InMemoryMessageStore::new());
        let session = ChatSession::load(store, "pre-named").await.unwrap();
        assert_eq!(session.message_count(), 0);
        assert_eq!(session.thread_id(), "pre-named");
    }

    #[tokio::test]
    async fn failed_append_rolls_back_memory() {
        let mut session = ChatSession::start_new(Arc::new(FailingStore));

        let err = session.append_user("doomed").await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
        assert_eq!(session.message_count(), 0);
    }
}
