use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_API_PORT: u16 = 8001;

const ANALYSIS_SYSTEM_PROMPT: &str =
    "You are a website analysis expert. Respond only with valid JSON.";

/// One configured model: the tag clients see, the provider that serves it,
/// the provider's model id and the model's own system prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub tag: String,
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub system_prompt: String,
}

impl ModelSpec {
    fn new(tag: &str, provider: &str, model: &str) -> Self {
        Self {
            tag: tag.to_string(),
            provider: provider.to_string(),
            model: model.to_string(),
            system_prompt: default_system_prompt(tag),
        }
    }
}

fn default_system_prompt(tag: &str) -> String {
    let persona = match tag {
        "claude" => "Claude",
        "gpt" => "GPT",
        "gemini" => "Gemini",
        other => other,
    };
    format!(
        "You are {persona}, answering for the App Studio Pro website. \
         Be helpful, accurate and concise."
    )
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub api_host: String,
    pub api_port: u16,
    pub cors_origins: Vec<String>,
    pub data_dir: PathBuf,
    #[serde(skip_serializing)]
    pub api_key: String,
    /// Provider id -> endpoint override.
    pub provider_urls: HashMap<String, String>,
    pub image_url: Option<String>,
    /// Ordered; battle events are emitted in this order.
    pub battle_models: Vec<ModelSpec>,
    pub analysis_model: ModelSpec,
    pub image_model: String,
    pub fetch_timeout_secs: u64,
    pub llm_timeout_secs: u64,
    pub image_timeout_secs: u64,
    pub stream_pacing_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("studio-engine");
        Self {
            api_host: "0.0.0.0".to_string(),
            api_port: DEFAULT_API_PORT,
            cors_origins: vec!["*".to_string()],
            data_dir,
            api_key: String::new(),
            provider_urls: HashMap::new(),
            image_url: None,
            battle_models: vec![
                ModelSpec::new("claude", "anthropic", "claude-sonnet-4-20250514"),
                ModelSpec::new("gpt", "openai", "gpt-5.1"),
                ModelSpec::new("gemini", "gemini", "gemini-2.5-pro"),
            ],
            analysis_model: ModelSpec {
                tag: "analyzer".to_string(),
                provider: "anthropic".to_string(),
                model: "claude-sonnet-4-20250514".to_string(),
                system_prompt: ANALYSIS_SYSTEM_PROMPT.to_string(),
            },
            image_model: "gpt-image-1".to_string(),
            fetch_timeout_secs: 15,
            llm_timeout_secs: 60,
            image_timeout_secs: 120,
            stream_pacing_ms: 30,
        }
    }
}

impl ServiceConfig {
    /// Missing fields keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let mut config: Self = toml::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        validate_models(&mut config.battle_models)
            .with_context(|| format!("battle_models in {}", path.display()))?;
        if config.analysis_model.system_prompt.trim().is_empty() {
            config.analysis_model.system_prompt = ANALYSIS_SYSTEM_PROMPT.to_string();
        }
        Ok(config)
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("STUDIO_API_HOST") {
            self.api_host = host;
        }
        if let Some(port) = lookup("STUDIO_API_PORT") {
            self.api_port = port
                .parse()
                .with_context(|| format!("STUDIO_API_PORT is not a port: {port}"))?;
        }
        if let Some(dir) = lookup("STUDIO_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(key) = lookup("STUDIO_LLM_KEY").or_else(|| lookup("EMERGENT_LLM_KEY")) {
            self.api_key = key;
        }
        for provider in ["anthropic", "openai", "gemini"] {
            let var = format!("STUDIO_{}_BASE_URL", provider.to_uppercase());
            if let Some(url) = lookup(&var) {
                self.provider_urls.insert(provider.to_string(), url);
            }
        }
        if let Some(url) = lookup("STUDIO_IMAGE_BASE_URL") {
            self.image_url = Some(url);
        }
        if let Some(models) = lookup("STUDIO_BATTLE_MODELS") {
            self.battle_models = parse_model_list(&models)?;
        }
        if let Some(model) = lookup("STUDIO_ANALYSIS_MODEL") {
            let (provider, model) = split_provider_model(&model)?;
            self.analysis_model.provider = provider;
            self.analysis_model.model = model;
        }
        if let Some(model) = lookup("STUDIO_IMAGE_MODEL") {
            self.image_model = model;
        }
        if let Some(origins) = lookup("CORS_ORIGINS") {
            self.cors_origins = origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }
        set_u64(&lookup, "STUDIO_FETCH_TIMEOUT_SECS", &mut self.fetch_timeout_secs)?;
        set_u64(&lookup, "STUDIO_LLM_TIMEOUT_SECS", &mut self.llm_timeout_secs)?;
        set_u64(&lookup, "STUDIO_IMAGE_TIMEOUT_SECS", &mut self.image_timeout_secs)?;
        set_u64(&lookup, "STUDIO_STREAM_PACING_MS", &mut self.stream_pacing_ms)?;
        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }

    pub fn image_timeout(&self) -> Duration {
        Duration::from_secs(self.image_timeout_secs)
    }

    pub fn stream_pacing(&self) -> Duration {
        Duration::from_millis(self.stream_pacing_ms)
    }

    /// Chat sessions may target any battle model by tag.
    pub fn chat_model(&self, tag: &str) -> Option<&ModelSpec> {
        self.battle_models.iter().find(|m| m.tag == tag)
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("transcripts.db")
    }

    pub fn masked_key(&self) -> String {
        if self.api_key.is_empty() {
            return "(not set)".to_string();
        }
        let visible: String = self.api_key.chars().take(6).collect();
        format!("{visible}…")
    }
}

fn set_u64<F>(lookup: &F, key: &str, slot: &mut u64) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(key) {
        *slot = raw
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a non-negative integer, got '{raw}'"))?;
    }
    Ok(())
}

fn split_provider_model(raw: &str) -> Result<(String, String)> {
    let (provider, model) = raw
        .trim()
        .split_once(':')
        .ok_or_else(|| anyhow!("expected provider:model, got '{raw}'"))?;
    if provider.is_empty() || model.is_empty() {
        return Err(anyhow!("expected provider:model, got '{raw}'"));
    }
    Ok((provider.trim().to_lowercase(), model.trim().to_string()))
}

/// Parses `tag=provider:model,tag=provider:model`, keeping the declared order.
pub fn parse_model_list(raw: &str) -> Result<Vec<ModelSpec>> {
    let mut specs: Vec<ModelSpec> = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (tag, target) = entry
            .split_once('=')
            .ok_or_else(|| anyhow!("expected tag=provider:model, got '{entry}'"))?;
        let (provider, model) = split_provider_model(target)?;
        specs.push(ModelSpec::new(tag.trim(), &provider, &model));
    }
    validate_models(&mut specs)?;
    Ok(specs)
}

/// Battle models need at least one entry and unique, non-empty tags, since
/// the tag labels every stream event. Blank system prompts get the
/// per-model default.
fn validate_models(specs: &mut [ModelSpec]) -> Result<()> {
    if specs.is_empty() {
        return Err(anyhow!("at least one battle model is required"));
    }
    for i in 0..specs.len() {
        let tag = specs[i].tag.trim().to_string();
        if tag.is_empty() {
            return Err(anyhow!("battle model {} has an empty tag", i + 1));
        }
        if specs[..i].iter().any(|s| s.tag == tag) {
            return Err(anyhow!("model tag '{tag}' listed twice"));
        }
        let spec = &mut specs[i];
        spec.tag = tag;
        if spec.system_prompt.trim().is_empty() {
            spec.system_prompt = default_system_prompt(&spec.tag);
        }
    }
    Ok(())
}
