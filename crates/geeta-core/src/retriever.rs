//! Context retrieval from the managed vector index
//!
//! The index embeds the query text itself; this module only sends the raw
//! query and reads back ranked passages.

use crate::error::{ChatError, ChatResult};
use crate::http_client::build_http_client;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

pub const DEFAULT_TOP_K: usize = 5;

/// A retrieved text snippet with its relevance score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub id: Option<String>,
    pub text: String,
    pub score: f32,
    pub chunk_index: Option<u64>,
}

impl Passage {
    pub fn new(text: impl Into<String>, score: f32) -> Self {
        Self {
            id: None,
            text: text.into(),
            score,
            chunk_index: None,
        }
    }
}

/// Source of grounding passages for a query.
///
/// Implementations return passages in the service's relevance order and never
/// substitute cached results on failure.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str, top_k: usize) -> ChatResult<Vec<Passage>>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    data: &'a str,
    top_k: usize,
    include_metadata: bool,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    result: Vec<QueryMatch>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct QueryMatch {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<Value>,
}

/// Upstash Vector index queried by raw text (`/query-data`).
#[derive(Clone)]
pub struct UpstashRetriever {
    client: Client,
    url: String,
    token: String,
    timeout: Option<Duration>,
}

impl UpstashRetriever {
    pub fn new(url: &str, token: &str) -> Self {
        Self {
            client: build_http_client(),
            url: url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Retriever for UpstashRetriever {
    async fn retrieve(&self, query: &str, top_k: usize) -> ChatResult<Vec<Passage>> {
        let url = format!("{}/query-data", self.url);
        let request = QueryRequest {
            data: query,
            top_k: top_k.max(1),
            include_metadata: true,
        };

        let mut builder = self.client.post(&url).bearer_auth(&self.token).json(&request);
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ChatError::retrieval(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%status, body = %body, "vector query rejected");
            return Err(ChatError::retrieval(format!("vector index returned {}", status)));
        }

        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| ChatError::retrieval(format!("Failed to parse query response: {}", e)))?;

        if let Some(error) = parsed.error {
            return Err(ChatError::retrieval(error));
        }

        let total = parsed.result.len();
        let passages = passages_from_matches(parsed.result);
        tracing::debug!(total, usable = passages.len(), "retrieved passages");
        Ok(passages)
    }
}

/// Keep matches that carry text, in the order given.
fn passages_from_matches(matches: Vec<QueryMatch>) -> Vec<Passage> {
    matches
        .into_iter()
        .filter_map(|m| {
            let metadata = m.metadata?;
            let text = metadata.get("text")?.as_str()?;
            if text.trim().is_empty() {
                return None;
            }
            let id = m.id.map(|id| match id {
                Value::String(s) => s,
                other => other.to_string(),
            });
            Some(Passage {
                id,
                text: text.to_string(),
                score: m.score,
                chunk_index: metadata.get("chunkIndex").and_then(Value::as_u64),
            })
        })
        .collect()
}
