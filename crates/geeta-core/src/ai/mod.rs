//! Streaming chat-completion clients
//!
//! Each provider opens one streaming request and hands back a [`ChunkStream`]:
//! the receiving end of a bounded channel fed by a spawned producer task.
//! Dropping the stream stops the producer, which drops the upstream response.

pub mod lines;
pub mod ollama;
pub mod openrouter;

pub use ollama::OllamaClient;
pub use openrouter::OpenRouterClient;

use crate::config::Config;
use crate::error::{ChatError, ChatResult};
use crate::prompt::{Prompt, Query};
use crate::provider::Provider;
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use lines::LineBuffer;
use reqwest::{RequestBuilder, Response};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Low sampling temperature keeps answers close to the template rules
pub const DEFAULT_TEMPERATURE: f32 = 0.3;

/// Fragments buffered between the producer task and the consumer
const CHUNK_CHANNEL_CAPACITY: usize = 32;

#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Start a streamed completion with the system prompt and the raw query
    /// as two ordered turns.
    ///
    /// Failures before the stream opens are returned here; later failures
    /// arrive as a final `Err` item on the stream.
    async fn complete(&self, prompt: &Prompt, query: &Query) -> ChatResult<ChunkStream>;
}

/// Single-pass sequence of answer fragments in arrival order.
pub struct ChunkStream {
    inner: ReceiverStream<ChatResult<String>>,
}

impl ChunkStream {
    pub fn channel(capacity: usize) -> (mpsc::Sender<ChatResult<String>>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self { inner: ReceiverStream::new(rx) })
    }

    /// A stream over already-known items, e.g. a canned answer.
    pub fn from_items(items: impl IntoIterator<Item = ChatResult<String>>) -> Self {
        let items: Vec<_> = items.into_iter().collect();
        let (tx, stream) = Self::channel(items.len());
        for item in items {
            // capacity equals the item count, so this cannot be full
            let _ = tx.try_send(item);
        }
        stream
    }
}

impl Stream for ChunkStream {
    type Item = ChatResult<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Build the configured completion provider.
pub fn completion_from_config(config: &Config) -> anyhow::Result<Arc<dyn CompletionService>> {
    let model = config.model()?;
    let service: Arc<dyn CompletionService> = match config.provider()? {
        Provider::OpenRouter => Arc::new(
            OpenRouterClient::new(config.openrouter_api_key()?, &model)
                .with_base_url(config.openrouter_base_url())
                .with_temperature(config.temperature())
                .with_timeout(config.request_timeout()),
        ),
        Provider::Ollama => Arc::new(
            OllamaClient::new(config.ollama_base_url(), &model)
                .with_temperature(config.temperature())
                .with_timeout(config.request_timeout()),
        ),
    };
    Ok(service)
}

/// Send a request, bounding only the wait for response headers.
pub(crate) async fn send_with_timeout(
    builder: RequestBuilder,
    timeout: Option<Duration>,
) -> ChatResult<Response> {
    let send = builder.send();
    let result = match timeout {
        Some(limit) => tokio::time::timeout(limit, send)
            .await
            .map_err(|_| ChatError::completion("timed out waiting for the completion service"))?,
        None => send.await,
    };
    result.map_err(|e| ChatError::completion(e.to_string()))
}

/// Reject non-success responses, logging the provider body but not returning it.
pub(crate) async fn check_status(response: Response, provider: &str) -> ChatResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::warn!(provider, %status, body = %body, "completion request rejected");
    Err(ChatError::completion(format!("{} returned {}", provider, status)))
}

/// What one line of a provider's wire format means.
#[derive(Debug, PartialEq)]
pub(crate) enum LineEvent {
    Skip,
    Fragment(String),
    /// Completion signal, with any text carried on the same line
    Done(Option<String>),
}

/// Line-oriented streaming wire format.
pub(crate) trait StreamFormat: Send + 'static {
    fn parse_line(&mut self, line: &str) -> ChatResult<LineEvent>;
}

enum Step {
    Continue,
    Stop,
}

/// Spawn the producer that turns an upstream body into fragments.
pub(crate) fn spawn_producer<F: StreamFormat>(response: Response, format: F) -> ChunkStream {
    let (tx, stream) = ChunkStream::channel(CHUNK_CHANNEL_CAPACITY);
    tokio::spawn(pump(response, format, tx));
    stream
}

async fn pump<F: StreamFormat>(
    response: Response,
    mut format: F,
    tx: mpsc::Sender<ChatResult<String>>,
) {
    let mut body = response.bytes_stream();
    let mut lines = LineBuffer::new();

    loop {
        let chunk = tokio::select! {
            _ = tx.closed() => {
                tracing::debug!("consumer went away, cancelling completion");
                return;
            }
            chunk = body.next() => chunk,
        };

        match chunk {
            Some(Ok(bytes)) => {
                for line in lines.push(&bytes) {
                    if let Step::Stop = dispatch(&mut format, &line, &tx).await {
                        return;
                    }
                }
            }
            Some(Err(e)) => {
                let _ = tx
                    .send(Err(ChatError::completion(format!("stream interrupted: {}", e))))
                    .await;
                return;
            }
            None => break,
        }
    }

    if let Some(line) = lines.finish() {
        if let Step::Stop = dispatch(&mut format, &line, &tx).await {
            return;
        }
    }

    let _ = tx
        .send(Err(ChatError::completion("stream ended before the completion signal")))
        .await;
}

async fn dispatch<F: StreamFormat>(
    format: &mut F,
    line: &str,
    tx: &mpsc::Sender<ChatResult<String>>,
) -> Step {
    match format.parse_line(line) {
        Ok(LineEvent::Skip) => Step::Continue,
        Ok(LineEvent::Fragment(text)) => {
            if tx.send(Ok(text)).await.is_err() {
                return Step::Stop;
            }
            Step::Continue
        }
        Ok(LineEvent::Done(tail)) => {
            if let Some(text) = tail {
                let _ = tx.send(Ok(text)).await;
            }
            Step::Stop
        }
        Err(e) => {
            let _ = tx.send(Err(e)).await;
            Step::Stop
        }
    }
}
