//! HTTP surface of the chat pipeline
//!
//! `POST /chat` streams the grounded answer as plain text; every failure
//! before the first fragment becomes a JSON error.

pub mod error;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use error::ApiError;
use geeta_core::{relay, ChatError, ChatPipeline};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<ChatPipeline>,
}

pub fn router(pipeline: ChatPipeline) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(AppState {
            pipeline: Arc::new(pipeline),
        })
}

async fn chat(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let message = parse_message(&body)?;
    let answer = state.pipeline.answer(&message).await?;

    // Fragments go out as they arrive; a later failure aborts the body.
    let body = Body::from_stream(relay(answer.into_chunks()));
    Ok(([(header::CONTENT_TYPE, TEXT_CONTENT_TYPE)], body).into_response())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Extract `message` from a JSON object body.
fn parse_message(body: &[u8]) -> Result<String, ChatError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| ChatError::invalid_input(format!("body is not JSON: {}", e)))?;

    value
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ChatError::invalid_input("message is missing or not a string"))
}
