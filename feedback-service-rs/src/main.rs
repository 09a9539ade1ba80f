// feedback-service-rs/src/main.rs
// Main Entry Point for the review feedback service

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use feedback_service::api::FeedbackApi;
use feedback_service::config::ServiceConfig;
use feedback_service::llm_client::HttpCompletionBackend;
use feedback_service::store::ReviewStore;
use feedback_service::FeedbackGenerator;

const SERVICE_NAME: &str = "FEEDBACK";
const DEFAULT_PORT: u16 = 8000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    config_rs::load_env();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServiceConfig::from_env().context("invalid configuration")?;

    let generator = match config.llm.clone() {
        Some(settings) => {
            let backend = HttpCompletionBackend::new(settings)
                .context("failed to initialize LLM client")?;
            tracing::info!("Feedback drafted by provider '{}'", backend.provider());
            FeedbackGenerator::new(Arc::new(backend))
        }
        None => FeedbackGenerator::classifier_only(),
    };

    let store = ReviewStore::open(&config.database_path).with_context(|| {
        format!("failed to open review store at {}", config.database_path.display())
    })?;

    let addr = config_rs::get_bind_address(SERVICE_NAME, DEFAULT_PORT);
    let app = Arc::new(FeedbackApi::new(config, generator, store)).create_router();

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("Feedback service listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Feedback service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
