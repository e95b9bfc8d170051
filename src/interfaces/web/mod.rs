mod handlers;
mod router;

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio_stream::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

use crate::core::analysis::scrape::PageFetcher;
use crate::core::config::ServiceConfig;
use crate::core::lifecycle::LifecycleComponent;
use crate::core::llm::LlmManager;
use crate::core::llm::image::ImageGenerator;
use crate::core::memory::SharedSink;

/// Everything a request handler needs. Built once at startup; every field is
/// cheap to clone and shared across requests.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub llm: LlmManager,
    pub images: Arc<dyn ImageGenerator>,
    pub fetcher: Arc<dyn PageFetcher>,
    pub store: SharedSink,
    pub log_tx: broadcast::Sender<String>,
}

pub struct ApiServer {
    state: AppState,
    addr: String,
    bound: Option<SocketAddr>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ApiServer {
    pub fn new(state: AppState) -> Self {
        let addr = format!("{}:{}", state.config.api_host, state.config.api_port);
        Self {
            state,
            addr,
            bound: None,
            shutdown: None,
            task: None,
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.bound
    }
}

// --- SSE Logs (used by router) ---

async fn sse_logs_endpoint(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.log_tx.subscribe();
    let stream = BroadcastStream::new(receiver).map(|msg| match msg {
        Ok(line) => Ok(Event::default().data(line)),
        Err(_) => Ok(Event::default().data("Log stream lagged")),
    });

    Sse::new(stream)
}

#[async_trait]
impl LifecycleComponent for ApiServer {
    async fn on_init(&mut self) -> Result<()> {
        info!(
            "API Server initializing ({} battle models, providers: {})",
            self.state.config.battle_models.len(),
            self.state.llm.list_providers().join(", ")
        );
        Ok(())
    }

    async fn on_start(&mut self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(&self.addr)
            .await
            .with_context(|| format!("Failed to bind API server to {}", self.addr))?;
        let bound = listener.local_addr()?;
        self.bound = Some(bound);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        self.shutdown = Some(shutdown_tx);

        let app = router::build_api_router(self.state.clone());
        self.task = Some(tokio::spawn(async move {
            info!("API Server running at http://{bound}");
            let server = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = server.await {
                tracing::error!("API Server crashed: {}", e);
            }
        }));
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        info!("API Server shutting down...");
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take()
            && tokio::time::timeout(std::time::Duration::from_secs(5), task)
                .await
                .is_err()
        {
            warn!("API Server did not drain within 5s");
        }
        Ok(())
    }
}
