pub mod analyze;
pub mod battle;
pub mod chat;
pub mod history;
pub mod status;

use axum::{
    Json,
    http::StatusCode,
    response::sse::{Event, Sse},
    response::{IntoResponse, Response},
};
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

use crate::core::stream::StreamEvent;

/// Events buffered per connection before the producer waits on the client.
pub(crate) const STREAM_BUFFER: usize = 64;

/// Named SSE events carrying the JSON payload of each stream event.
pub(crate) fn sse_response(rx: mpsc::Receiver<StreamEvent>) -> Response {
    let stream = ReceiverStream::new(rx).map(|ev| {
        Ok::<_, Infallible>(
            Event::default()
                .event(ev.name())
                .data(ev.payload().to_string()),
        )
    });
    Sse::new(stream).into_response()
}

pub(crate) fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({ "success": false, "error": error.into() })),
    )
        .into_response()
}

/// Uses the client's session id when one was sent, otherwise a fresh one.
pub(crate) fn session_or_new(session_id: Option<String>) -> String {
    session_id
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}
