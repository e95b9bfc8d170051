pub mod generic_provider;
pub mod image;
pub mod registry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::core::config::ModelSpec;
use crate::core::error::ProviderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A backend that answers a whole conversation with one complete reply.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn provider_id(&self) -> &str;

    async fn generate(
        &self,
        model_id: &str,
        system_prompt: &str,
        messages: &[ChatMessage],
    ) -> Result<String, ProviderError>;
}

/// One provider bound to one model and one conversation.
#[derive(Clone)]
pub struct ModelAdapter {
    tag: String,
    model_id: String,
    system_prompt: String,
    session_id: String,
    timeout: Duration,
    provider: Arc<dyn LlmProvider>,
}

impl ModelAdapter {
    pub fn new(
        tag: impl Into<String>,
        provider: Arc<dyn LlmProvider>,
        model_id: impl Into<String>,
        system_prompt: impl Into<String>,
        session_id: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            tag: tag.into(),
            model_id: model_id.into(),
            system_prompt: system_prompt.into(),
            session_id: session_id.into(),
            timeout,
            provider,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub async fn invoke(&self, conversation: &[ChatMessage]) -> Result<String, ProviderError> {
        let call = self
            .provider
            .generate(&self.model_id, &self.system_prompt, conversation);
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "[{}] {} timed out (session {})",
                    self.tag, self.model_id, self.session_id
                );
                Err(ProviderError::Timeout {
                    provider: self.provider.provider_id().to_string(),
                    secs: self.timeout.as_secs(),
                })
            }
        }
    }
}

/// Registered providers, keyed by provider id.
#[derive(Clone, Default)]
pub struct LlmManager {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
}

impl LlmManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_provider(&mut self, provider: Arc<dyn LlmProvider>) {
        info!("Registered LLM Provider: {}", provider.provider_id());
        self.providers
            .insert(provider.provider_id().to_string(), provider);
    }

    pub fn get_provider(&self, id: &str) -> Option<Arc<dyn LlmProvider>> {
        self.providers.get(id).cloned()
    }

    pub fn list_providers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn adapter(
        &self,
        spec: &ModelSpec,
        session_id: &str,
        timeout: Duration,
    ) -> Result<ModelAdapter, ProviderError> {
        let provider = self
            .get_provider(&spec.provider)
            .ok_or_else(|| ProviderError::Unavailable(spec.provider.clone()))?;
        Ok(ModelAdapter::new(
            spec.tag.clone(),
            provider,
            spec.model.clone(),
            spec.system_prompt.clone(),
            session_id,
            timeout,
        ))
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedProvider;
    use super::*;

    fn spec(tag: &str, provider: &str) -> ModelSpec {
        ModelSpec {
            tag: tag.to_string(),
            provider: provider.to_string(),
            model: "m-1".to_string(),
            system_prompt: "Be concise.".to_string(),
        }
    }

    #[test]
    fn chat_message_uses_lowercase_roles_on_the_wire() {
        let json = serde_json::to_value(ChatMessage::assistant("hi")).unwrap();
        assert_eq!(json["role"], "assistant");
        let parsed: ChatMessage =
            serde_json::from_str(r#"{"role":"user","content":"yo"}"#).unwrap();
        assert_eq!(parsed, ChatMessage::user("yo"));
    }

    #[test]
    fn adapter_for_unknown_provider_is_unavailable() {
        let manager = LlmManager::new();
        let err = manager
            .adapter(&spec("gpt", "openai"), "s1", Duration::from_secs(1))
            .err()
            .expect("no provider registered");
        assert!(matches!(err, ProviderError::Unavailable(ref p) if p == "openai"));
    }

    #[tokio::test]
    async fn adapter_times_out_slow_provider() {
        let mut manager = LlmManager::new();
        manager.register_provider(Arc::new(
            ScriptedProvider::replying("openai", "late").delayed(Duration::from_millis(200)),
        ));
        let adapter = manager
            .adapter(&spec("gpt", "openai"), "s1", Duration::from_millis(20))
            .unwrap();
        let err = adapter.invoke(&[ChatMessage::user("hi")]).await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout { .. }));
    }

    #[tokio::test]
    async fn adapter_passes_conversation_through() {
        let provider = Arc::new(ScriptedProvider::replying("anthropic", "hello back"));
        let mut manager = LlmManager::new();
        manager.register_provider(provider.clone());
        let adapter = manager
            .adapter(&spec("claude", "anthropic"), "s-claude", Duration::from_secs(1))
            .unwrap();
        assert_eq!(adapter.tag(), "claude");
        assert_eq!(adapter.session_id(), "s-claude");
        let out = adapter.invoke(&[ChatMessage::user("hello")]).await.unwrap();
        assert_eq!(out, "hello back");
        assert_eq!(provider.call_count(), 1);
    }
}
