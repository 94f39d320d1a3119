//! Thread-keyed message log storage.
//!
//! Storage backends hide behind the [`MessageStore`] trait so the session and
//! turn layers can run against SQLite in production and an in-memory double
//! in tests. The log is append-only: entries are never rewritten or deleted,
//! and a thread exists exactly when it has at least one stored message.

use crate::core::message::Message;
use async_trait::async_trait;
use thiserror::Error;

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryMessageStore;
pub use sqlite::SqliteMessageStore;

/// Failure of the storage medium. Deliberately distinct from "no data": an
/// unknown thread id reads back as an empty history, never as an error, and
/// a real storage failure is never mapped to an empty result.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("storage worker failed: {0}")]
    Background(#[from] tokio::task::JoinError),
}

/// Durable, append-only log of messages grouped by thread identifier.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Append `message` as the new last entry for `thread_id`. Durable before
    /// this returns `Ok`. Appends to one thread are serialized; appends to
    /// distinct threads proceed independently.
    async fn append(&self, thread_id: &str, message: &Message) -> Result<(), StoreError>;

    /// Full history for `thread_id` in append order. Empty for an unknown
    /// identifier.
    async fn read(&self, thread_id: &str) -> Result<Vec<Message>, StoreError>;

    /// Every distinct thread identifier with at least one stored message,
    /// each exactly once. Order is not significant.
    async fn list_threads(&self) -> Result<Vec<String>, StoreError>;
}
