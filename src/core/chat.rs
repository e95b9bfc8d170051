use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::core::llm::{ChatMessage, ModelAdapter, Role};
use crate::core::memory::types::ChatSession;
use crate::core::memory::{TranscriptSink, persist_chat};
use crate::core::stream::{Disconnected, StreamEmitter};

/// Prompt used when the client sends no user message at all.
pub const DEFAULT_GREETING: &str = "Hello! Please introduce yourself briefly.";

/// The conversation up to and including the most recent user message.
/// Trailing assistant turns are dropped so the model always answers a user.
fn prompt_window(conversation: &[ChatMessage]) -> Vec<ChatMessage> {
    match conversation.iter().rposition(|m| m.role == Role::User) {
        Some(last_user) => conversation[..=last_user].to_vec(),
        None => {
            let mut window = conversation.to_vec();
            window.push(ChatMessage::user(DEFAULT_GREETING));
            window
        }
    }
}

/// Runs one chat turn against `adapter`, streams the reply through `emitter`
/// and records the transcript once the terminal event has been sent.
///
/// The stored transcript is the client's conversation plus the assistant
/// reply. A failed turn stores the conversation alone with `error` set.
/// If the client goes away mid-stream nothing is stored.
pub async fn run_chat_session(
    adapter: &ModelAdapter,
    conversation: Vec<ChatMessage>,
    mut emitter: StreamEmitter,
    sink: &dyn TranscriptSink,
) -> Result<(), Disconnected> {
    let label = adapter.tag().to_string();
    let window = prompt_window(&conversation);

    let outcome = adapter.invoke(&window).await;

    let mut session = ChatSession {
        record_id: Uuid::new_v4(),
        session_id: adapter.session_id().to_string(),
        model: label.clone(),
        messages: conversation,
        error: None,
        created_at: Utc::now(),
    };

    let streamed = match outcome {
        Ok(reply) => {
            let sent = emitter.stream_text(&label, &reply).await;
            session.messages.push(ChatMessage::assistant(reply));
            sent
        }
        Err(e) => {
            warn!("[{}] chat failed for {}: {}", label, session.session_id, e);
            let reason = e.to_string();
            session.error = Some(reason.clone());
            emitter.fail(&label, &reason).await
        }
    };

    if let Err(e) = streamed.and(emitter.done().await) {
        info!(
            "[{}] client left session {} before the reply finished",
            label, session.session_id
        );
        return Err(e);
    }

    persist_chat(sink, &session).await;
    Ok(())
}
