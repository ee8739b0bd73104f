use super::{
    check_status, send_with_timeout, spawn_producer, ChunkStream, CompletionService, LineEvent,
    StreamFormat, DEFAULT_TEMPERATURE,
};
use crate::config::DEFAULT_OPENROUTER_BASE_URL;
use crate::error::{ChatError, ChatResult};
use crate::http_client::build_http_client;
use crate::prompt::{Prompt, Query};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

#[derive(Serialize)]
struct ChatTurn<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatTurn<'a>>,
    stream: bool,
    temperature: f32,
}

#[derive(Deserialize)]
struct StreamEvent {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Option<Delta>,
}

#[derive(Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible chat completions (OpenRouter by default), streamed as SSE.
#[derive(Clone)]
pub struct OpenRouterClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    timeout: Option<Duration>,
}

impl OpenRouterClient {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            client: build_http_client(),
            base_url: DEFAULT_OPENROUTER_BASE_URL.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            timeout: None,
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
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
impl CompletionService for OpenRouterClient {
    async fn complete(&self, prompt: &Prompt, query: &Query) -> ChatResult<ChunkStream> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = CompletionRequest {
            model: &self.model,
            messages: vec![
                ChatTurn {
                    role: "system",
                    content: prompt.system(),
                },
                ChatTurn {
                    role: "user",
                    content: query.as_str(),
                },
            ],
            stream: true,
            temperature: self.temperature,
        };

        let builder = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("X-Title", "GeetaGPT")
            .json(&request);

        let response = send_with_timeout(builder, self.timeout).await?;
        let response = check_status(response, "openrouter").await?;

        tracing::debug!(model = %self.model, "completion stream opened");
        Ok(spawn_producer(response, SseFormat))
    }
}

/// `data:` lines carrying OpenAI-style deltas, terminated by `data: [DONE]`.
pub(crate) struct SseFormat;

impl StreamFormat for SseFormat {
    fn parse_line(&mut self, line: &str) -> ChatResult<LineEvent> {
        let line = line.trim();

        // Blank separators and `: keep-alive` comments
        if line.is_empty() || line.starts_with(':') {
            return Ok(LineEvent::Skip);
        }

        let data = match line.strip_prefix("data:") {
            Some(data) => data.trim_start(),
            None => return Ok(LineEvent::Skip),
        };

        if data == "[DONE]" {
            return Ok(LineEvent::Done(None));
        }

        let event: StreamEvent = serde_json::from_str(data)
            .map_err(|e| ChatError::completion(format!("Failed to parse stream event: {}", e)))?;

        if let Some(error) = event.error {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            tracing::warn!(error = %message, "completion failed mid-stream");
            return Err(ChatError::completion(message));
        }

        let content = event
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta)
            .and_then(|d| d.content)
            .filter(|c| !c.is_empty());

        Ok(match content {
            Some(text) => LineEvent::Fragment(text),
            None => LineEvent::Skip,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> ChatResult<LineEvent> {
        SseFormat.parse_line(line)
    }

    #[test]
    fn test_delta_content() {
        let line = r#"data: {"id":"gen-1","choices":[{"index":0,"delta":{"role":"assistant","content":"In Chapter 2"}}]}"#;
        assert_eq!(parse(line).unwrap(), LineEvent::Fragment("In Chapter 2".to_string()));
    }

    #[test]
    fn test_whitespace_content_is_kept() {
        let line = r#"data: {"choices":[{"delta":{"content":" "}}]}"#;
        assert_eq!(parse(line).unwrap(), LineEvent::Fragment(" ".to_string()));
    }

    #[test]
    fn test_done_marker() {
        assert_eq!(parse("data: [DONE]").unwrap(), LineEvent::Done(None));
        assert_eq!(parse("data:[DONE]").unwrap(), LineEvent::Done(None));
    }

    #[test]
    fn test_comments_and_blank_lines_are_skipped() {
        assert_eq!(parse(": OPENROUTER PROCESSING").unwrap(), LineEvent::Skip);
        assert_eq!(parse("").unwrap(), LineEvent::Skip);
        assert_eq!(parse("event: message").unwrap(), LineEvent::Skip);
    }

    #[test]
    fn test_role_only_and_finish_chunks_are_skipped() {
        let role = r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#;
        let finish = r#"data: {"choices":[{"delta":{"content":""},"finish_reason":"stop"}]}"#;
        assert_eq!(parse(role).unwrap(), LineEvent::Skip);
        assert_eq!(parse(finish).unwrap(), LineEvent::Skip);
    }

    #[test]
    fn test_in_band_error() {
        let line = r#"data: {"error":{"code":502,"message":"Provider disconnected"},"choices":[{"delta":{"content":""},"finish_reason":"error"}]}"#;
        assert_eq!(
            parse(line).unwrap_err(),
            ChatError::completion("Provider disconnected")
        );
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            parse("data: {not json"),
            Err(ChatError::CompletionUnavailable(_))
        ));
    }

    #[test]
    fn test_request_turn_order() {
        let request = CompletionRequest {
            model: "m",
            messages: vec![
                ChatTurn { role: "system", content: "grounding" },
                ChatTurn { role: "user", content: "question" },
            ],
            stream: true,
            temperature: 0.3,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "question");
        assert_eq!(json["stream"], true);
    }
}
