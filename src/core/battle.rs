//! Fan one prompt out to every configured model and replay the answers in
//! declared model order, whatever order they arrive in.

use chrono::Utc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

use crate::core::config::ModelSpec;
use crate::core::error::ProviderError;
use crate::core::llm::{ChatMessage, LlmManager, ModelAdapter};
use crate::core::memory::types::{BattleRun, ModelResponse};
use crate::core::memory::{TranscriptSink, persist_battle};
use crate::core::stream::{Disconnected, StreamEmitter};

/// One battle participant. A model whose provider could not be resolved is
/// still a participant; it just fails without being invoked.
pub struct Contender {
    pub tag: String,
    pub adapter: Result<ModelAdapter, ProviderError>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelOutcome {
    pub model: String,
    pub result: Result<String, String>,
}

/// Builds contenders in declared order. Each adapter gets its own session id,
/// `{session_id}-{tag}`, so model conversations never mix.
pub fn contenders(
    llm: &LlmManager,
    models: &[ModelSpec],
    session_id: &str,
    timeout: Duration,
) -> Vec<Contender> {
    models
        .iter()
        .map(|spec| Contender {
            tag: spec.tag.clone(),
            adapter: llm.adapter(spec, &format!("{session_id}-{}", spec.tag), timeout),
        })
        .collect()
}

/// Invokes every contender concurrently, exactly once each. The returned
/// outcomes are indexed like `contenders`.
pub async fn collect_outcomes(contenders: Vec<Contender>, prompt: &str) -> Vec<ModelOutcome> {
    let tags: Vec<String> = contenders.iter().map(|c| c.tag.clone()).collect();
    let mut slots: Vec<Option<Result<String, String>>> = vec![None; contenders.len()];
    let conversation = vec![ChatMessage::user(prompt)];

    let mut set = JoinSet::new();
    for (idx, contender) in contenders.into_iter().enumerate() {
        match contender.adapter {
            Ok(adapter) => {
                let conversation = conversation.clone();
                set.spawn(async move {
                    let result = adapter.invoke(&conversation).await;
                    (idx, result)
                });
            }
            Err(e) => {
                warn!("[{}] not invoked: {}", contender.tag, e);
                slots[idx] = Some(Err(e.to_string()));
            }
        }
    }

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((idx, Ok(text))) => {
                info!("[{}] answered ({} chars)", tags[idx], text.len());
                slots[idx] = Some(Ok(text));
            }
            Ok((idx, Err(e))) => {
                warn!("[{}] failed: {}", tags[idx], e);
                slots[idx] = Some(Err(e.to_string()));
            }
            Err(e) => warn!("Battle task aborted: {}", e),
        }
    }

    tags.into_iter()
        .zip(slots)
        .map(|(model, slot)| ModelOutcome {
            model,
            result: slot.unwrap_or_else(|| Err("model task aborted".to_string())),
        })
        .collect()
}

/// Runs a full battle: concurrent invocation, ordered replay, `done`, then a
/// best-effort write of the successful answers. Nothing is stored if the
/// client disconnects before `done`.
pub async fn run_battle(
    contenders: Vec<Contender>,
    prompt: &str,
    session_id: &str,
    mut emitter: StreamEmitter,
    sink: &dyn TranscriptSink,
) -> Result<Vec<ModelOutcome>, Disconnected> {
    let outcomes = collect_outcomes(contenders, prompt).await;

    for outcome in &outcomes {
        match &outcome.result {
            Ok(text) => emitter.stream_text(&outcome.model, text).await?,
            Err(reason) => emitter.fail(&outcome.model, reason).await?,
        }
    }
    emitter.done().await?;

    let run = BattleRun {
        record_id: Uuid::new_v4(),
        session_id: session_id.to_string(),
        prompt: prompt.to_string(),
        responses: outcomes
            .iter()
            .filter_map(|o| {
                o.result.as_ref().ok().map(|text| ModelResponse {
                    model: o.model.clone(),
                    response: text.clone(),
                })
            })
            .collect(),
        created_at: Utc::now(),
    };
    info!(
        "Battle {} finished: {}/{} models answered",
        session_id,
        run.responses.len(),
        outcomes.len()
    );
    persist_battle(sink, &run).await;

    Ok(outcomes)
}
