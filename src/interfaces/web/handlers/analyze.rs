use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};

use super::super::AppState;
use crate::core::analysis::AnalysisPipeline;
use crate::core::error::{AnalysisError, FetchError};

#[derive(Deserialize)]
pub struct AnalyzeRequest {
    url: String,
}

fn failure_status(err: &AnalysisError) -> StatusCode {
    match err {
        AnalysisError::Fetch(FetchError::InvalidUrl(_)) => StatusCode::BAD_REQUEST,
        AnalysisError::Fetch(_) | AnalysisError::Provider(_) => StatusCode::BAD_GATEWAY,
        AnalysisError::Parse(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn failure_response(err: AnalysisError) -> Response {
    let status = failure_status(&err);
    (
        status,
        Json(serde_json::json!({
            "success": false,
            "stage": err.stage(),
            "error": err.to_string(),
        })),
    )
        .into_response()
}

pub async fn analyze_endpoint(
    State(state): State<AppState>,
    Json(payload): Json<AnalyzeRequest>,
) -> Response {
    let session_id = format!("analyzer-{}", Utc::now().timestamp_millis());
    let scorer = match state.llm.adapter(
        &state.config.analysis_model,
        &session_id,
        state.config.llm_timeout(),
    ) {
        Ok(adapter) => adapter,
        Err(e) => return failure_response(AnalysisError::Provider(e)),
    };

    let pipeline = AnalysisPipeline::new(state.fetcher.clone(), scorer, state.images.clone());
    match pipeline.run(&payload.url).await {
        Ok(result) => {
            info!(
                "Analysis of {} done: score {}, mockup {}",
                result.url,
                result.overall_score,
                if result.mockup_generated { "yes" } else { "no" }
            );
            Json(result).into_response()
        }
        Err(e) => {
            warn!("Analysis of {} failed at {}: {}", payload.url, e.stage(), e);
            failure_response(e)
        }
    }
}
