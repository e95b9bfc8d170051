//! Incremental delivery of complete model replies to one client connection.
//!
//! Providers answer with a whole string; the emitter replays it as word-sized
//! increments with an optional pause between them, so a provider that streams
//! natively could feed the same event contract later.

use serde_json::json;
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Start { model: String },
    Token { model: String, token: String },
    Complete { model: String, response: String },
    Error { model: String, error: String },
    Done,
}

impl StreamEvent {
    pub fn name(&self) -> &'static str {
        match self {
            StreamEvent::Start { .. } => "start",
            StreamEvent::Token { .. } => "token",
            StreamEvent::Complete { .. } => "complete",
            StreamEvent::Error { .. } => "error",
            StreamEvent::Done => "done",
        }
    }

    pub fn payload(&self) -> serde_json::Value {
        match self {
            StreamEvent::Start { model } => json!({ "model": model }),
            StreamEvent::Token { model, token } => {
                json!({ "model": model, "token": token, "done": false })
            }
            StreamEvent::Complete { model, response } => {
                json!({ "model": model, "response": response })
            }
            StreamEvent::Error { model, error } => json!({ "model": model, "error": error }),
            StreamEvent::Done => json!({ "done": true }),
        }
    }
}

#[derive(Debug, Error)]
#[error("client disconnected")]
pub struct Disconnected;

pub struct StreamEmitter {
    tx: mpsc::Sender<StreamEvent>,
    pacing: Duration,
    finished: HashSet<String>,
}

impl StreamEmitter {
    pub fn new(tx: mpsc::Sender<StreamEvent>, pacing: Duration) -> Self {
        Self {
            tx,
            pacing,
            finished: HashSet::new(),
        }
    }

    pub fn channel(pacing: Duration, capacity: usize) -> (Self, mpsc::Receiver<StreamEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx, pacing), rx)
    }

    async fn send(&self, event: StreamEvent) -> Result<(), Disconnected> {
        self.tx.send(event).await.map_err(|_| Disconnected)
    }

    pub async fn begin(&mut self, label: &str) -> Result<(), Disconnected> {
        self.send(StreamEvent::Start {
            model: label.to_string(),
        })
        .await
    }

    pub async fn emit(&mut self, label: &str, increment: &str) -> Result<(), Disconnected> {
        self.send(StreamEvent::Token {
            model: label.to_string(),
            token: increment.to_string(),
        })
        .await
    }

    pub async fn end(&mut self, label: &str, full_text: &str) -> Result<(), Disconnected> {
        if !self.finished.insert(label.to_string()) {
            warn!("[{}] unit already finished, dropping duplicate end", label);
            return Ok(());
        }
        self.send(StreamEvent::Complete {
            model: label.to_string(),
            response: full_text.to_string(),
        })
        .await
    }

    pub async fn fail(&mut self, label: &str, reason: &str) -> Result<(), Disconnected> {
        if !self.finished.insert(label.to_string()) {
            warn!("[{}] unit already finished, dropping fail: {}", label, reason);
            return Ok(());
        }
        self.send(StreamEvent::Error {
            model: label.to_string(),
            error: reason.to_string(),
        })
        .await
    }

    /// Terminal event. Consumes the emitter so the connection closes once
    /// the client has drained it.
    pub async fn done(self) -> Result<(), Disconnected> {
        self.send(StreamEvent::Done).await
    }

    /// `begin`, one `emit` per word-boundary increment, then `end`.
    pub async fn stream_text(&mut self, label: &str, text: &str) -> Result<(), Disconnected> {
        self.begin(label).await?;
        for (i, increment) in split_increments(text).into_iter().enumerate() {
            if i > 0 && !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }
            self.emit(label, increment).await?;
        }
        self.end(label, text).await
    }
}

/// Splits text after each run of whitespace. Every piece is a word plus the
/// whitespace that followed it (leading whitespace stands alone), so
/// concatenating the pieces gives back `text`.
pub fn split_increments(text: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut in_space = false;
    for (idx, ch) in text.char_indices() {
        let space = ch.is_whitespace();
        if in_space && !space && idx > start {
            pieces.push(&text[start..idx]);
            start = idx;
        }
        in_space = space;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}
