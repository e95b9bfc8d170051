use axum::{Json, extract::State, http::StatusCode, response::Response};
use serde::Deserialize;
use tracing::info;

use super::super::AppState;
use super::{STREAM_BUFFER, error_response, session_or_new, sse_response};
use crate::core::chat::run_chat_session;
use crate::core::llm::ChatMessage;
use crate::core::stream::StreamEmitter;

#[derive(Deserialize)]
pub struct ChatStreamRequest {
    #[serde(default)]
    messages: Vec<ChatMessage>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
}

pub async fn chat_stream_endpoint(
    State(state): State<AppState>,
    Json(payload): Json<ChatStreamRequest>,
) -> Response {
    let tag = match payload.model.as_deref().map(str::trim) {
        Some(tag) if !tag.is_empty() => tag.to_string(),
        _ => match state.config.battle_models.first() {
            Some(spec) => spec.tag.clone(),
            None => return error_response(StatusCode::SERVICE_UNAVAILABLE, "No models configured"),
        },
    };
    let Some(spec) = state.config.chat_model(&tag) else {
        return error_response(StatusCode::BAD_REQUEST, format!("Unknown model '{tag}'"));
    };

    let session_id = session_or_new(payload.session_id);
    let adapter = match state
        .llm
        .adapter(spec, &session_id, state.config.llm_timeout())
    {
        Ok(adapter) => adapter,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
    };

    info!(
        "Chat [{}] session {} ({} messages)",
        tag,
        session_id,
        payload.messages.len()
    );

    let (emitter, rx) = StreamEmitter::channel(state.config.stream_pacing(), STREAM_BUFFER);
    let store = state.store.clone();
    let messages = payload.messages;
    tokio::spawn(async move {
        let _ = run_chat_session(&adapter, messages, emitter, store.as_ref()).await;
    });

    sse_response(rx)
}
