use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::warn;

use super::super::AppState;
use super::error_response;

pub const DEFAULT_LIMIT: usize = 20;
pub const MAX_LIMIT: usize = 100;

#[derive(Deserialize)]
pub struct ListQuery {
    limit: Option<usize>,
}

impl ListQuery {
    fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }
}

pub async fn list_chats(State(state): State<AppState>, Query(q): Query<ListQuery>) -> Response {
    match state.store.recent_chats(q.limit()).await {
        Ok(chats) => Json(serde_json::json!({ "chats": chats })).into_response(),
        Err(e) => {
            warn!("Failed to list chats: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

pub async fn list_battles(State(state): State<AppState>, Query(q): Query<ListQuery>) -> Response {
    match state.store.recent_battles(q.limit()).await {
        Ok(battles) => Json(serde_json::json!({ "battles": battles })).into_response(),
        Err(e) => {
            warn!("Failed to list battles: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
