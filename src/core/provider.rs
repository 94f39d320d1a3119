use crate::config::Settings;
use crate::core::message::Message;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

/// Failure at the completion boundary. A single failure is terminal for the
/// turn in progress; callers may re-submit the same sequence to retry.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request to completion endpoint failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("completion endpoint returned status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("could not decode completion response: {0}")]
    Decode(String),

    #[error("completion stream ended before completion")]
    Interrupted,
}

/// Per-request metadata, carried for correlation and tracing.
#[derive(Debug, Clone)]
pub struct RunMetadata {
    pub thread_id: String,
}

/// One event on a completion stream. `Fragment`s arrive in order and are
/// followed by exactly one terminal event.
#[derive(Debug)]
pub enum StreamEvent {
    Fragment(String),
    Done,
    Failed(ProviderError),
}

/// A finite, non-restartable stream of completion fragments.
///
/// Backed by a bounded channel: the producer buffers at most the configured
/// number of fragments ahead while the consumer drains at its own pace.
/// Dropping the stream cancels the in-flight request on a best-effort basis
/// (the producer stops at its next send).
pub struct CompletionStream {
    rx: mpsc::Receiver<StreamEvent>,
}

impl CompletionStream {
    pub(crate) fn new(rx: mpsc::Receiver<StreamEvent>) -> Self {
        Self { rx }
    }

    /// Next event, or `None` if the producer went away without a terminal
    /// event. Callers should treat `None` as an abnormal termination.
    pub async fn next(&mut self) -> Option<StreamEvent> {
        self.rx.recv().await
    }
}

/// The external completion service: an ordered role-tagged sequence in, one
/// role-tagged message (or a stream of fragments) out.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Request a single completed message for the given history.
    async fn complete(
        &self,
        messages: &[Message],
        meta: &RunMetadata,
    ) -> Result<Message, ProviderError>;

    /// Request a streamed completion for the given history. Transport-level
    /// failures surface here; failures mid-stream arrive as a terminal
    /// `StreamEvent::Failed`.
    async fn stream(
        &self,
        messages: &[Message],
        meta: &RunMetadata,
    ) -> Result<CompletionStream, ProviderError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Delta,
}

#[derive(Debug, Deserialize)]
struct Delta {
    content: Option<String>,
}

/// OpenAI-compatible chat-completions client.
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    settings: Settings,
}

impl OpenAiProvider {
    pub fn new(api_key: String, settings: Settings) -> Self {
        Self {
            client: Client::new(),
            api_key,
            settings,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.settings.provider.api_base.trim_end_matches('/')
        )
    }

    fn request<'a>(&'a self, messages: &'a [Message], stream: bool) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.settings.provider.model,
            messages,
            max_tokens: self.settings.provider.max_tokens,
            temperature: self.settings.provider.temperature,
            stream,
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn complete(
        &self,
        messages: &[Message],
        meta: &RunMetadata,
    ) -> Result<Message, ProviderError> {
        tracing::debug!("[OpenAiProvider] Requesting completion for thread '{}'", meta.thread_id);

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&self.request(messages, false))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| ProviderError::Decode("response contained no choices".to_string()))
    }

    async fn stream(
        &self,
        messages: &[Message],
        meta: &RunMetadata,
    ) -> Result<CompletionStream, ProviderError> {
        tracing::debug!(
            "[OpenAiProvider] Requesting streamed completion for thread '{}'",
            meta.thread_id
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&self.request(messages, true))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let (tx, rx) = mpsc::channel(self.settings.system.channel_buffer_size);
        let thread_id = meta.thread_id.clone();

        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            // SSE lines can straddle chunk boundaries, so keep a carry-over
            // buffer and only parse complete lines.
            let mut buf = String::new();
            let mut done = false;

            'outer: while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx.send(StreamEvent::Failed(ProviderError::Http(e))).await;
                        return;
                    }
                };

                buf.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(pos) = buf.find('\n') {
                    let line: String = buf.drain(..=pos).collect();
                    let line = line.trim_end();

                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };

                    if data == "[DONE]" {
                        done = true;
                        break 'outer;
                    }

                    if let Ok(parsed) = serde_json::from_str::<StreamChunk>(data) {
                        if let Some(content) = parsed
                            .choices
                            .first()
                            .and_then(|c| c.delta.content.as_ref())
                        {
                            if tx.send(StreamEvent::Fragment(content.clone())).await.is_err() {
                                // Receiver dropped: the caller abandoned the
                                // turn, so stop reading and let the response
                                // drop with us.
                                tracing::debug!(
                                    "[OpenAiProvider] Fragment receiver for thread '{}' dropped, cancelling stream",
                                    thread_id
                                );
                                return;
                            }
                        }
                    }
                }
            }

            let terminal = if done {
                StreamEvent::Done
            } else {
                StreamEvent::Failed(ProviderError::Interrupted)
            };
            let _ = tx.send(terminal).await;
        });

        Ok(CompletionStream::new(rx))
    }
}
