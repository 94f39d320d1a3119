//! High-level facade wiring the store, provider and turn processor into one
//! handle. Dependencies are injected at construction, so tests can swap in
//! doubles for either boundary.

use crate::config::Settings;
use crate::core::message::Message;
use crate::core::provider::{CompletionProvider, OpenAiProvider};
use crate::session::ChatSession;
use crate::storage::{MessageStore, SqliteMessageStore, StoreError};
use crate::turn::{TurnError, TurnProcessor};
use std::sync::Arc;

pub struct ChatApp {
    store: Arc<dyn MessageStore>,
    turns: TurnProcessor,
}

impl ChatApp {
    pub fn new(store: Arc<dyn MessageStore>, provider: Arc<dyn CompletionProvider>) -> Self {
        Self {
            store,
            turns: TurnProcessor::new(provider),
        }
    }

    /// Production wiring: SQLite store at the configured path, OpenAI-compatible
    /// provider.
    ///
    /// # Example
    /// ```no_run
    /// use chatloom::{ChatApp, Settings};
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let settings = Settings::new()?;
    ///     let app = ChatApp::from_settings(&settings, Settings::api_key()?)?;
    ///     let mut session = app.new_thread();
    ///     let reply = app.send(&mut session, "What is Rust?").await?;
    ///     println!("{}", reply.content);
    ///     Ok(())
    /// }
    /// ```
    pub fn from_settings(settings: &Settings, api_key: String) -> Result<Self, StoreError> {
        let store = SqliteMessageStore::open(&settings.storage.database_path)?;
        let provider = OpenAiProvider::new(api_key, settings.clone());
        Ok(Self::new(Arc::new(store), Arc::new(provider)))
    }

    /// Every stored thread identifier, each exactly once. A storage failure
    /// surfaces as an error, not an empty list.
    pub async fn threads(&self) -> Result<Vec<String>, StoreError> {
        self.store.list_threads().await
    }

    pub fn new_thread(&self) -> ChatSession {
        ChatSession::start_new(self.store.clone())
    }

    pub async fn resume(&self, thread_id: impl Into<String>) -> Result<ChatSession, StoreError> {
        ChatSession::load(self.store.clone(), thread_id).await
    }

    /// Run one turn and return the assistant's reply whole.
    pub async fn send(
        &self,
        session: &mut ChatSession,
        user_text: impl Into<String>,
    ) -> Result<Message, TurnError> {
        self.turns.run_turn(session, user_text).await
    }

    /// Run one turn, invoking `on_fragment` for each streamed delta before
    /// the assembled reply is persisted and returned.
    pub async fn send_streaming(
        &self,
        session: &mut ChatSession,
        user_text: impl Into<String>,
        on_fragment: impl FnMut(&str) + Send,
    ) -> Result<Message, TurnError> {
        self.turns
            .run_turn_streaming(session, user_text, on_fragment)
            .await
    }
}
