use super::{
    check_status, send_with_timeout, spawn_producer, ChunkStream, CompletionService, LineEvent,
    StreamFormat, DEFAULT_TEMPERATURE,
};
use crate::error::{ChatError, ChatResult};
use crate::http_client::build_http_client;
use crate::prompt::{Prompt, Query};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Serialize)]
struct OllamaMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage<'a>>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Deserialize)]
struct OllamaResponseMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct OllamaChunk {
    #[serde(default)]
    message: Option<OllamaResponseMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Local Ollama chat endpoint, streamed as newline-delimited JSON.
#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
    timeout: Option<Duration>,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            client: build_http_client(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            timeout: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl CompletionService for OllamaClient {
    async fn complete(&self, prompt: &Prompt, query: &Query) -> ChatResult<ChunkStream> {
        let url = format!("{}/api/chat", self.base_url);

        let request = OllamaRequest {
            model: &self.model,
            messages: vec![
                OllamaMessage {
                    role: "system",
                    content: prompt.system(),
                },
                OllamaMessage {
                    role: "user",
                    content: query.as_str(),
                },
            ],
            stream: true,
            options: OllamaOptions {
                temperature: self.temperature,
            },
        };

        let response = send_with_timeout(self.client.post(&url).json(&request), self.timeout)
            .await
            .map_err(|e| {
                tracing::warn!("Ollama unreachable at {}. Make sure it is running with: ollama serve", self.base_url);
                e
            })?;
        let response = check_status(response, "ollama").await?;

        Ok(spawn_producer(response, NdjsonFormat))
    }
}

/// One JSON object per line; the last one has `done: true`.
pub(crate) struct NdjsonFormat;

impl StreamFormat for NdjsonFormat {
    fn parse_line(&mut self, line: &str) -> ChatResult<LineEvent> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(LineEvent::Skip);
        }

        let chunk: OllamaChunk = serde_json::from_str(line)
            .map_err(|e| ChatError::completion(format!("Failed to parse Ollama chunk: {}", e)))?;

        if let Some(error) = chunk.error {
            return Err(ChatError::completion(error));
        }

        let content = chunk
            .message
            .map(|m| m.content)
            .filter(|c| !c.is_empty());

        Ok(match (chunk.done, content) {
            (true, tail) => LineEvent::Done(tail),
            (false, Some(text)) => LineEvent::Fragment(text),
            (false, None) => LineEvent::Skip,
        })
    }
}
