mod config;
mod errors;
mod extraction;
mod llm_client;
mod routes;
mod state;
mod storage;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::extraction::completion::CompletionClient;
use crate::extraction::moderation::ModerationGate;
use crate::extraction::pipeline::ExtractionPipeline;
use crate::llm_client::LlmClient;
use crate::routes::build_router;
use crate::state::AppState;
use crate::storage::{FileStorage, Storage};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting JobScan API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize provider client
    let llm = Arc::new(LlmClient::new(
        config.openai_api_key.clone(),
        &config.openai_base_url,
        config.llm_max_attempts,
    )?);
    info!(
        "LLM client initialized (base url: {}, max attempts: {})",
        config.openai_base_url, config.llm_max_attempts
    );

    if config.verify_api_key {
        llm.verify_credentials()
            .await
            .context("OPENAI_API_KEY was rejected by the provider")?;
        info!("API key verified");
    }

    // Initialize storage (disabled in deployed mode)
    let storage: Option<Arc<dyn Storage>> = if config.persist_results {
        info!("Persisting results under {}", config.data_dir.display());
        Some(Arc::new(FileStorage::new(&config.data_dir)))
    } else {
        warn!("PERSIST_RESULTS=false: extractions will not be stored");
        None
    };

    let pipeline = ExtractionPipeline::new(
        ModerationGate::new(llm.clone()),
        CompletionClient::new(llm),
        storage,
    );

    // Build app state
    let state = AppState {
        pipeline: Arc::new(pipeline),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once the UI host is fixed

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
