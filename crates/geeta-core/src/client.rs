//! Chat client: sends one question at a time and renders the streamed answer
//!
//! A fetch task reads the HTTP body, decodes it incrementally and sends
//! [`StreamEvent`]s over a channel. The session applies them to its message
//! list; the UI redraws after each applied update.

use crate::http_client::build_http_client;
use crate::state::{ChatMessage, ChatRole};
use futures_util::StreamExt;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

/// Shown in place of the answer when the stream cannot be read to the end
pub const APOLOGY_MESSAGE: &str =
    "I am sorry, I couldn't connect to the wisdom source right now. Please try again.";

const EVENT_CHANNEL_CAPACITY: usize = 32;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Server responded with status {0}")]
    Status(u16),

    #[error("Stream interrupted: {0}")]
    Interrupted(String),
}

/// Progress of one in-flight answer.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Fragment(String),
    Finished,
    Failed(TransportError),
}

/// What changed in the message list after applying an event.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatUpdate {
    Appended,
    Completed,
    Failed,
}

/// Incremental UTF-8 decoder for a byte stream cut at arbitrary points.
///
/// Incomplete trailing sequences are held back until the next chunk; invalid
/// bytes become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8StreamDecoder {
    pending: Vec<u8>,
}

impl Utf8StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(valid) => {
                    out.push_str(valid);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid_up_to = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid_up_to]));
                    match e.error_len() {
                        // truncated sequence at the end: wait for more bytes
                        None => {
                            self.pending.drain(..valid_up_to);
                            break;
                        }
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid_up_to + len);
                        }
                    }
                }
            }
        }

        out
    }

    /// Flush at end of stream; a dangling partial sequence becomes U+FFFD.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        let rest = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&rest).into_owned()
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
}

/// HTTP client for the `/chat` endpoint.
#[derive(Clone)]
pub struct ChatClient {
    client: Client,
    endpoint: String,
}

impl ChatClient {
    pub fn new(server_url: &str) -> Self {
        Self {
            client: build_http_client(),
            endpoint: format!("{}/chat", server_url.trim_end_matches('/')),
        }
    }

    pub(crate) fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Post one message and forward the decoded answer as events.
    ///
    /// Always ends with `Finished` or `Failed`, unless the receiver is gone.
    pub async fn stream_reply(&self, message: &str, tx: mpsc::Sender<StreamEvent>) {
        let response = match self
            .client
            .post(self.endpoint())
            .json(&ChatRequest { message })
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let _ = tx.send(StreamEvent::Failed(TransportError::Request(e.to_string()))).await;
                return;
            }
        };

        let status = response.status();
        if !status.is_success() {
            let _ = tx
                .send(StreamEvent::Failed(TransportError::Status(status.as_u16())))
                .await;
            return;
        }

        let mut decoder = Utf8StreamDecoder::new();
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => {
                    let text = decoder.decode(&bytes);
                    if !text.is_empty() && tx.send(StreamEvent::Fragment(text)).await.is_err() {
                        return;
                    }
                }
                Err(e) => {
                    let _ = tx
                        .send(StreamEvent::Failed(TransportError::Interrupted(e.to_string())))
                        .await;
                    return;
                }
            }
        }

        let tail = decoder.finish();
        if !tail.is_empty() && tx.send(StreamEvent::Fragment(tail)).await.is_err() {
            return;
        }
        let _ = tx.send(StreamEvent::Finished).await;
    }
}

/// Ordered conversation with at most one request in flight.
pub struct ChatSession {
    client: ChatClient,
    messages: Vec<ChatMessage>,
    inbound: Option<mpsc::Receiver<StreamEvent>>,
}

impl ChatSession {
    pub fn new(client: ChatClient) -> Self {
        Self {
            client,
            messages: Vec::new(),
            inbound: None,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn is_pending(&self) -> bool {
        self.inbound.is_some()
    }

    /// Send a question. Ignored while an answer is still streaming or when
    /// the text is blank.
    pub fn submit(&mut self, text: &str) -> bool {
        let Some(tx) = self.begin(text) else {
            return false;
        };

        let client = self.client.clone();
        let message = text.to_string();
        tokio::spawn(async move {
            client.stream_reply(&message, tx).await;
        });
        true
    }

    /// Append the user message and an empty assistant placeholder, and open
    /// the event channel for the answer.
    fn begin(&mut self, text: &str) -> Option<mpsc::Sender<StreamEvent>> {
        if self.is_pending() || text.trim().is_empty() {
            return None;
        }

        self.messages.push(ChatMessage::user(text));
        self.messages.push(ChatMessage::assistant(""));

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        self.inbound = Some(rx);
        Some(tx)
    }

    /// Wait for the next event of the pending answer and apply it.
    ///
    /// Returns `None` when nothing is pending.
    pub async fn next_update(&mut self) -> Option<ChatUpdate> {
        let rx = self.inbound.as_mut()?;
        let event = rx.recv().await.unwrap_or_else(|| {
            StreamEvent::Failed(TransportError::Interrupted("reader stopped".to_string()))
        });
        Some(self.apply(event))
    }

    /// Apply every event that is already queued, without waiting.
    pub fn drain_updates(&mut self) -> Vec<ChatUpdate> {
        let mut updates = Vec::new();
        while let Some(rx) = self.inbound.as_mut() {
            let event = match rx.try_recv() {
                Ok(event) => event,
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    StreamEvent::Failed(TransportError::Interrupted("reader stopped".to_string()))
                }
            };
            updates.push(self.apply(event));
        }
        updates
    }

    /// Drive the pending answer to its end.
    pub async fn wait_for_reply(&mut self) {
        while self.next_update().await.is_some() {}
    }

    fn apply(&mut self, event: StreamEvent) -> ChatUpdate {
        match event {
            StreamEvent::Fragment(text) => {
                if let Some(last) = self.pending_reply() {
                    last.content.push_str(&text);
                }
                ChatUpdate::Appended
            }
            StreamEvent::Finished => {
                self.inbound = None;
                ChatUpdate::Completed
            }
            StreamEvent::Failed(err) => {
                tracing::warn!(error = %err, "chat stream failed");
                if let Some(last) = self.pending_reply() {
                    last.content = APOLOGY_MESSAGE.to_string();
                }
                self.inbound = None;
                ChatUpdate::Failed
            }
        }
    }

    fn pending_reply(&mut self) -> Option<&mut ChatMessage> {
        self.messages
            .last_mut()
            .filter(|m| m.role == ChatRole::Assistant)
    }
}
