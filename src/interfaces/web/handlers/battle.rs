use axum::{Json, extract::State, http::StatusCode, response::Response};
use serde::Deserialize;
use tracing::info;

use super::super::AppState;
use super::{STREAM_BUFFER, error_response, session_or_new, sse_response};
use crate::core::battle::{contenders, run_battle};
use crate::core::stream::StreamEmitter;

#[derive(Deserialize)]
pub struct BattleRequest {
    prompt: String,
    #[serde(default)]
    session_id: Option<String>,
}

pub async fn battle_stream_endpoint(
    State(state): State<AppState>,
    Json(payload): Json<BattleRequest>,
) -> Response {
    let prompt = payload.prompt.trim().to_string();
    if prompt.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Prompt must not be empty");
    }

    let session_id = session_or_new(payload.session_id);
    let entrants = contenders(
        &state.llm,
        &state.config.battle_models,
        &session_id,
        state.config.llm_timeout(),
    );
    info!("Battle {} started with {} models", session_id, entrants.len());

    let (emitter, rx) = StreamEmitter::channel(state.config.stream_pacing(), STREAM_BUFFER);
    let store = state.store.clone();
    tokio::spawn(async move {
        let _ = run_battle(entrants, &prompt, &session_id, emitter, store.as_ref()).await;
    });

    sse_response(rx)
}
