use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const PROVIDERS_JSON: &str = include_str!("providers.json");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRegistry {
    pub providers: Vec<ProviderDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderDef {
    pub id: String,
    pub name: String,
    pub api_format: ApiFormat,
    pub base_url: String,
    pub auth: AuthConfig,
    pub default_model: String,
    #[serde(default)]
    pub extra_headers: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiFormat {
    Openai,
    Gemini,
    Anthropic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(rename = "type")]
    pub auth_type: AuthType,
    #[serde(default)]
    pub param_name: Option<String>,
    /// Header carrying the raw key when `auth_type` is `header`.
    #[serde(default)]
    pub header_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    Bearer,
    QueryParam,
    Header,
}

impl ProviderRegistry {
    pub fn load() -> Result<Self> {
        serde_json::from_str(PROVIDERS_JSON).context("embedded providers.json is invalid")
    }

    pub fn get_provider(&self, id: &str) -> Option<&ProviderDef> {
        let normalized = id.to_lowercase();
        self.providers
            .iter()
            .find(|p| p.id == normalized || p.name.to_lowercase() == normalized)
    }

    /// Point providers at alternate endpoints (proxies, mock servers).
    pub fn with_base_urls(mut self, overrides: &HashMap<String, String>) -> Self {
        for provider in &mut self.providers {
            if let Some(url) = overrides.get(&provider.id) {
                provider.base_url = url.clone();
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_registry_has_battle_providers() {
        let registry = ProviderRegistry::load().unwrap();
        for id in ["anthropic", "openai", "gemini"] {
            assert!(registry.get_provider(id).is_some(), "missing {id}");
        }
        let gemini = registry.get_provider("Google Gemini").unwrap();
        assert_eq!(gemini.api_format, ApiFormat::Gemini);
        assert_eq!(gemini.auth.auth_type, AuthType::QueryParam);
    }

    #[test]
    fn base_url_overrides_only_touch_named_providers() {
        let mut overrides = HashMap::new();
        overrides.insert("openai".to_string(), "http://127.0.0.1:9/v1".to_string());
        let registry = ProviderRegistry::load().unwrap().with_base_urls(&overrides);
        assert_eq!(
            registry.get_provider("openai").unwrap().base_url,
            "http://127.0.0.1:9/v1"
        );
        assert!(
            registry
                .get_provider("anthropic")
                .unwrap()
                .base_url
                .starts_with("https://api.anthropic.com")
        );
    }
}
