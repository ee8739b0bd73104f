//! Mapping of pipeline failures onto the fixed JSON error shape
//!
//! Callers only ever see one of three messages; the underlying error is
//! logged and never serialized.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use geeta_core::ChatError;
use serde_json::json;

pub const MESSAGE_REQUIRED: &str = "Message is required";
pub const NO_CONTEXT: &str = "No relevant context found";
pub const PROCESSING_FAILED: &str = "Failed to process request";

#[derive(Debug)]
pub struct ApiError(pub ChatError);

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            ChatError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ChatError::NoContextFound => StatusCode::NOT_FOUND,
            ChatError::RetrievalUnavailable(_)
            | ChatError::CompletionUnavailable(_)
            | ChatError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> &'static str {
        match self.status() {
            StatusCode::BAD_REQUEST => MESSAGE_REQUIRED,
            StatusCode::NOT_FOUND => NO_CONTEXT,
            _ => PROCESSING_FAILED,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "chat request failed");
        } else {
            tracing::info!(error = %self.0, %status, "chat request rejected");
        }

        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}
