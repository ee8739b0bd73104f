pub mod ai;
pub mod client;
pub mod config;
pub mod error;
pub mod http_client;
pub mod pipeline;
pub mod prompt;
pub mod provider;
pub mod relay;
pub mod retriever;
pub mod state;

// Re-export main types for convenience
pub use ai::{ChunkStream, CompletionService, OllamaClient, OpenRouterClient};
pub use client::{ChatClient, ChatSession, ChatUpdate, APOLOGY_MESSAGE};
pub use config::Config;
pub use error::{ChatError, ChatResult};
pub use pipeline::{Answer, ChatPipeline};
pub use prompt::{Prompt, PromptTemplate, Query, FALLBACK_ANSWER};
pub use provider::Provider;
pub use relay::{relay, RelayError};
pub use retriever::{Passage, Retriever, UpstashRetriever};
pub use state::{ChatMessage, ChatRole};
