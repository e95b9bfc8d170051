use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::llm::ChatMessage;

/// Transcript of one chat request: the conversation the client sent plus the
/// assistant reply (absent when the model failed, in which case `error` is set).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub record_id: Uuid,
    pub session_id: String,
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub model: String,
    pub response: String,
}

/// One battle. `responses` holds successful models only, in declared model order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleRun {
    pub record_id: Uuid,
    pub session_id: String,
    pub prompt: String,
    pub responses: Vec<ModelResponse>,
    pub created_at: DateTime<Utc>,
}
