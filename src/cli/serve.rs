use anyhow::{Context, Result};
use console::style;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::core::analysis::scrape::HttpFetcher;
use crate::core::config::ServiceConfig;
use crate::core::lifecycle::LifecycleManager;
use crate::core::llm::LlmManager;
use crate::core::llm::generic_provider::GenericProvider;
use crate::core::llm::image::OpenAiImageGenerator;
use crate::core::llm::registry::ProviderRegistry;
use crate::core::memory::TranscriptStore;
use crate::core::terminal::{self, GuideSection, print_info, print_link, print_success, print_warn};
use crate::interfaces::web::{ApiServer, AppState};
use crate::logging::init_logging;

/// Registers one provider per registry entry, all sharing the configured key.
pub(crate) fn build_llm_manager(config: &ServiceConfig) -> Result<LlmManager> {
    let registry = ProviderRegistry::load()?.with_base_urls(&config.provider_urls);
    for spec in config
        .battle_models
        .iter()
        .chain(std::iter::once(&config.analysis_model))
    {
        if registry.get_provider(&spec.provider).is_none() {
            warn!(
                "Model '{}' names unknown provider '{}'; requests for it will fail",
                spec.tag, spec.provider
            );
        }
    }
    let mut llm = LlmManager::new();
    for def in &registry.providers {
        llm.register_provider(Arc::new(GenericProvider::new(
            def.clone(),
            config.api_key.clone(),
        )));
    }
    Ok(llm)
}

async fn open_store(config: &ServiceConfig) -> TranscriptStore {
    let path = config.db_path();
    match TranscriptStore::open(&path).await {
        Ok(store) => {
            info!("Transcript store opened at {}", path.display());
            store
        }
        Err(e) => {
            warn!("Transcript store unavailable at {}: {}", path.display(), e);
            print_warn(&format!(
                "Database unavailable ({e}); transcripts will not be saved."
            ));
            TranscriptStore::detached()
        }
    }
}

pub(crate) async fn run(config: ServiceConfig) -> Result<()> {
    let log_tx = init_logging();
    terminal::print_banner();

    if config.api_key.is_empty() {
        print_warn("No LLM key set (STUDIO_LLM_KEY); provider calls will be rejected upstream.");
    }

    let llm = build_llm_manager(&config)?;
    let images = OpenAiImageGenerator::new(
        config
            .image_url
            .clone()
            .unwrap_or_else(|| OpenAiImageGenerator::DEFAULT_ENDPOINT.to_string()),
        config.api_key.clone(),
        config.image_model.clone(),
        config.image_timeout(),
    );
    let fetcher = HttpFetcher::new(config.fetch_timeout()).context("building page fetcher")?;
    let store = open_store(&config).await;

    let config = Arc::new(config);
    let state = AppState {
        config: config.clone(),
        llm,
        images: Arc::new(images),
        fetcher: Arc::new(fetcher),
        store: Arc::new(store.clone()),
        log_tx,
    };

    let mut lifecycle = LifecycleManager::new();
    lifecycle.attach(Arc::new(Mutex::new(store)));
    let server = Arc::new(Mutex::new(ApiServer::new(state)));
    lifecycle.attach(server.clone());
    lifecycle.start().await?;

    let bound = server
        .lock()
        .await
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|| format!("{}:{}", config.api_host, config.api_port));
    let models: Vec<&str> = config.battle_models.iter().map(|m| m.tag.as_str()).collect();

    print_success("Studio engine is running");
    GuideSection::new("API Server")
        .status("Address", &bound)
        .status("Battle models", &models.join(", "))
        .status(
            "Analysis model",
            &format!("{}:{}", config.analysis_model.provider, config.analysis_model.model),
        )
        .status("Database", &config.db_path().display().to_string())
        .blank()
        .text(&format!(
            "Press {} to stop.",
            style("Ctrl+C").bold().yellow()
        ))
        .print();
    print_link("Health", &format!("http://{bound}/api/health"));

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    print_info("Shutting down...");
    lifecycle.shutdown().await
}
