use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};

use super::registry::{ApiFormat, AuthType, ProviderDef};
use super::{ChatMessage, LlmProvider, Role};
use crate::core::error::ProviderError;

const ANTHROPIC_MAX_TOKENS: u32 = 4096;

// ── OpenAI-compatible request/response ──

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage<'a>>,
}

#[derive(Serialize, Deserialize)]
struct OpenAiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessageOwned,
}

#[derive(Deserialize)]
struct OpenAiMessageOwned {
    content: Option<String>,
}

// ── Anthropic request/response ──

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "is_blank")]
    system: &'a str,
    messages: Vec<OpenAiMessage<'a>>,
}

fn is_blank(s: &&str) -> bool {
    s.is_empty()
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicBlock>,
}

#[derive(Deserialize)]
struct AnthropicBlock {
    #[serde(default)]
    text: Option<String>,
}

// ── Gemini request/response ──

#[derive(Serialize)]
struct GeminiRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    contents: Vec<GeminiContent>,
}

#[derive(Serialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Deserialize)]
struct GeminiResponse {
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiResContent,
}

#[derive(Deserialize)]
struct GeminiResContent {
    parts: Vec<GeminiResPart>,
}

#[derive(Deserialize)]
struct GeminiResPart {
    text: String,
}

// ── Generic Provider ──

pub struct GenericProvider {
    provider_def: ProviderDef,
    api_key: String,
    client: Client,
}

impl GenericProvider {
    pub fn new(provider_def: ProviderDef, api_key: String) -> Self {
        Self {
            provider_def,
            api_key,
            client: Client::new(),
        }
    }

    fn authorize(&self, mut request: RequestBuilder) -> RequestBuilder {
        request = match self.provider_def.auth.auth_type {
            AuthType::Bearer => request.bearer_auth(&self.api_key),
            AuthType::Header => {
                let name = self
                    .provider_def
                    .auth
                    .header_name
                    .as_deref()
                    .unwrap_or("x-api-key");
                request.header(name, &self.api_key)
            }
            AuthType::QueryParam => {
                let name = self.provider_def.auth.param_name.as_deref().unwrap_or("key");
                request.query(&[(name, self.api_key.as_str())])
            }
        };
        for (name, value) in &self.provider_def.extra_headers {
            request = request.header(name, value);
        }
        request
    }

    fn transport(&self, err: reqwest::Error) -> ProviderError {
        ProviderError::Transport {
            provider: self.provider_def.name.clone(),
            reason: err.to_string(),
        }
    }

    fn malformed(&self, reason: impl Into<String>) -> ProviderError {
        ProviderError::Malformed {
            provider: self.provider_def.name.clone(),
            reason: reason.into(),
        }
    }

    async fn send<T: for<'de> Deserialize<'de>>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, ProviderError> {
        let res = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        let status = res.status();
        if !status.is_success() {
            return Err(ProviderError::Http {
                provider: self.provider_def.name.clone(),
                status: status.as_u16(),
                body: res.text().await.unwrap_or_default(),
            });
        }
        res.json::<T>()
            .await
            .map_err(|e| self.malformed(e.to_string()))
    }

    async fn generate_openai(
        &self,
        model_id: &str,
        system_prompt: &str,
        messages: &[ChatMessage],
    ) -> Result<String, ProviderError> {
        let mut req_messages = Vec::with_capacity(messages.len() + 1);
        if !system_prompt.is_empty() {
            req_messages.push(OpenAiMessage {
                role: "system",
                content: system_prompt,
            });
        }
        req_messages.extend(messages.iter().map(|m| OpenAiMessage {
            role: m.role.as_str(),
            content: &m.content,
        }));

        let req = OpenAiRequest {
            model: model_id,
            messages: req_messages,
        };
        let parsed: OpenAiResponse = self
            .send(self.client.post(&self.provider_def.base_url).json(&req))
            .await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| self.malformed("no choices in completion"))
    }

    async fn generate_anthropic(
        &self,
        model_id: &str,
        system_prompt: &str,
        messages: &[ChatMessage],
    ) -> Result<String, ProviderError> {
        let req = AnthropicRequest {
            model: model_id,
            max_tokens: ANTHROPIC_MAX_TOKENS,
            system: system_prompt,
            messages: messages
                .iter()
                .map(|m| OpenAiMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
        };
        let parsed: AnthropicResponse = self
            .send(self.client.post(&self.provider_def.base_url).json(&req))
            .await?;
        let text: String = parsed
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect();
        if text.is_empty() {
            return Err(self.malformed("no text blocks in message"));
        }
        Ok(text)
    }

    async fn generate_gemini(
        &self,
        model_id: &str,
        system_prompt: &str,
        messages: &[ChatMessage],
    ) -> Result<String, ProviderError> {
        let mut contents: Vec<GeminiContent> = Vec::new();
        for m in messages {
            let gemini_role = match m.role {
                Role::Assistant => "model",
                Role::User => "user",
            };

            // Gemini requires strictly alternating roles. Merge consecutive same-role entries.
            if let Some(last) = contents.last_mut()
                && last.role == gemini_role
                && let Some(part) = last.parts.first_mut()
            {
                part.text.push('\n');
                part.text.push_str(&m.content);
                continue;
            }
            contents.push(GeminiContent {
                role: gemini_role.to_string(),
                parts: vec![GeminiPart {
                    text: m.content.clone(),
                }],
            });
        }

        let system_instruction = (!system_prompt.is_empty()).then(|| GeminiContent {
            role: "user".to_string(),
            parts: vec![GeminiPart {
                text: system_prompt.to_string(),
            }],
        });
        let req = GeminiRequest {
            system_instruction,
            contents,
        };

        let url = self.provider_def.base_url.replace("{model}", model_id);
        let parsed: GeminiResponse = self.send(self.client.post(&url).json(&req)).await?;
        parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| self.malformed("no candidates in response"))
    }
}

#[async_trait]
impl LlmProvider for GenericProvider {
    fn provider_id(&self) -> &str {
        &self.provider_def.id
    }

    async fn generate(
        &self,
        model_id: &str,
        system_prompt: &str,
        messages: &[ChatMessage],
    ) -> Result<String, ProviderError> {
        match self.provider_def.api_format {
            ApiFormat::Openai => self.generate_openai(model_id, system_prompt, messages).await,
            ApiFormat::Anthropic => {
                self.generate_anthropic(model_id, system_prompt, messages)
                    .await
            }
            ApiFormat::Gemini => self.generate_gemini(model_id, system_prompt, messages).await,
        }
    }
}
