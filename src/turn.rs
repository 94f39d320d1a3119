//! One conversation turn: persist the user's message, replay the full
//! history into the completion provider, persist the reply.

use crate::core::message::Message;
use crate::core::provider::{CompletionProvider, ProviderError, RunMetadata, StreamEvent};
use crate::session::ChatSession;
use crate::storage::StoreError;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TurnError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

pub struct TurnProcessor {
    provider: Arc<dyn CompletionProvider>,
}

impl TurnProcessor {
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self { provider }
    }

    /// Single-shot turn: the reply arrives whole.
    ///
    /// The user message is persisted before the provider is called, so a
    /// provider failure leaves it in history with no reply; the caller may
    /// resubmit to retry.
    pub async fn run_turn(
        &self,
        session: &mut ChatSession,
        user_text: impl Into<String>,
    ) -> Result<Message, TurnError> {
        session.append_user(user_text).await?;

        let meta = RunMetadata {
            thread_id: session.thread_id().to_string(),
        };
        let reply = self.provider.complete(session.history(), &meta).await?;

        session.append_assistant(reply.content.clone()).await?;
        tracing::info!("[TurnProcessor] Turn completed for thread '{}'", meta.thread_id);
        Ok(reply)
    }

    /// Streaming turn: `on_fragment` fires for each delta as it arrives.
    /// Nothing is persisted until the stream terminates cleanly; a failure
    /// or abnormal termination discards the partial reply.
    pub async fn run_turn_streaming(
        &self,
        session: &mut ChatSession,
        user_text: impl Into<String>,
        mut on_fragment: impl FnMut(&str) + Send,
    ) -> Result<Message, TurnError> {
        session.append_user(user_text).await?;

        let meta = RunMetadata {
            thread_id: session.thread_id().to_string(),
        };
        let mut stream = self.provider.stream(session.history(), &meta).await?;

        let mut content = String::new();
        loop {
            match stream.next().await {
                Some(StreamEvent::Fragment(delta)) => {
                    on_fragment(&delta);
                    content.push_str(&delta);
                }
                Some(StreamEvent::Done) => break,
                Some(StreamEvent::Failed(err)) => {
                    tracing::warn!(
                        "[TurnProcessor] Stream failed for thread '{}', discarding {} partial chars",
                        meta.thread_id,
                        content.len()
                    );
                    return Err(err.into());
                }
                None => {
                    tracing::warn!(
                        "[TurnProcessor] Stream for thread '{}' closed without terminal event",
                        meta.thread_id
                    );
                    return Err(ProviderError::Interrupted.into());
                }
            }
        }

        session.append_assistant(content.clone()).await?;
        tracing::info!("[TurnProcessor] Turn completed for thread '{}'", meta.thread_id);
        Ok(Message::assistant(content))
    }
}
