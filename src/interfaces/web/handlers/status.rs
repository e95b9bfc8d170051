use axum::{Json, extract::State};
use serde_json::{Value, json};

use super::super::AppState;

pub async fn root() -> Json<Value> {
    Json(json!({
        "app": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "status": "ready",
    }))
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let database = if state.store.is_connected().await {
        "connected"
    } else {
        "disconnected"
    };
    Json(json!({ "status": "healthy", "database": database }))
}

/// Configured models in battle order, plus the analysis model.
pub async fn models(State(state): State<AppState>) -> Json<Value> {
    let battle: Vec<Value> = state
        .config
        .battle_models
        .iter()
        .map(|m| json!({ "tag": m.tag, "provider": m.provider, "model": m.model }))
        .collect();
    let analysis = &state.config.analysis_model;
    Json(json!({
        "models": battle,
        "analysis_model": { "provider": analysis.provider, "model": analysis.model },
        "image_model": state.config.image_model,
    }))
}
