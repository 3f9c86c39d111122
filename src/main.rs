mod api_server;
mod config;
mod error;
mod executor;
mod knowledge_store;
mod llm_gateway;
mod observer;
mod orchestrator;
mod planner;
mod retrieval;
mod scene;
mod schema;
mod seed_data;
mod session;

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::api_server::AppState;
use crate::config::Config;
use crate::knowledge_store::KnowledgeStore;
use crate::llm_gateway::{LLMClient, LanguageBackend};
use crate::orchestrator::Orchestrator;
use crate::session::SessionRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    info!(addr = %config.bind_addr, storage = %config.storage_dir.display(), "starting scene-pilot");

    let backend: Arc<dyn LanguageBackend> = Arc::new(LLMClient::new(&config)?);

    let store = Arc::new(KnowledgeStore::open(&config.storage_dir, backend.clone())?);
    match store.seed_defaults().await {
        Ok(0) => {}
        Ok(seeded) => info!(seeded, "knowledge store seeded"),
        Err(e) => warn!(error = %e, "knowledge seeding failed, continuing with what loaded"),
    }

    // The browser-automation collaborator registers a surface in its own
    // build; this binary runs planning-only (LIGHTWEIGHT) sessions.
    let registry = Arc::new(SessionRegistry::new(
        None,
        &config.storage_dir,
        config.scene_ready_timeout,
    ));

    let orchestrator = Arc::new(Orchestrator::new(
        backend,
        store.clone(),
        config.settle_delay,
    ));

    let app = api_server::create_router(AppState {
        registry: registry.clone(),
        orchestrator,
        store,
    });

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("listening on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown({
            let registry = registry.clone();
            async move {
                let _ = tokio::signal::ctrl_c().await;
                info!("shutdown signal received, closing sessions");
                registry.close_all().await;
            }
        })
        .await?;

    Ok(())
}
