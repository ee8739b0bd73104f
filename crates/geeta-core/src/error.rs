//! Error types for the chat pipeline
//!
//! Every failure is scoped to a single request. The HTTP layer maps these
//! variants onto a fixed JSON error shape; the detail strings are for logs.

use thiserror::Error;

/// Failure kinds of the retrieve → compose → complete pipeline.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChatError {
    /// Missing or malformed query
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The retrieval service could not be reached or returned an error
    #[error("Retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    /// Retrieval succeeded but yielded no usable passages
    #[error("No relevant context found")]
    NoContextFound,

    /// The completion service failed before or during streaming
    #[error("Completion unavailable: {0}")]
    CompletionUnavailable(String),

    /// Invalid prompt template or service configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for pipeline errors
pub type ChatResult<T> = Result<T, ChatError>;

impl ChatError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn retrieval(msg: impl Into<String>) -> Self {
        Self::RetrievalUnavailable(msg.into())
    }

    pub fn completion(msg: impl Into<String>) -> Self {
        Self::CompletionUnavailable(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ChatError::retrieval("connection refused");
        assert_eq!(err.to_string(), "Retrieval unavailable: connection refused");
    }

    #[test]
    fn test_no_context_display() {
        assert_eq!(ChatError::NoContextFound.to_string(), "No relevant context found");
    }

    #[test]
    fn test_completion_error() {
        let err = ChatError::completion("stream closed");
        assert!(matches!(err, ChatError::CompletionUnavailable(_)));
        assert_eq!(err.to_string(), "Completion unavailable: stream closed");
    }
}
