use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{fmt, EnvFilter};

use geo_avatar::config::Config;
use geo_avatar::gemini::GeminiClient;
use geo_avatar::location::NominatimResolver;
use geo_avatar::routes::{router, spawn_session_sweeper, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Init tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = Config::from_env();
    tracing::info!("Using API key: {}", config.redacted_key());
    if config.api_key.is_none() {
        tracing::warn!("⚠️ No GEMINI_API_KEY set; generation requests will fail until one is provided");
    }

    let state = AppState::new(
        Arc::new(NominatimResolver::new(config.geocoder_base.clone())),
        Arc::new(GeminiClient::new(config.api_key.clone(), config.gemini_base.clone())),
        config.app_url.clone(),
    )
    .with_session_ttl(config.session_ttl);
    let sweep_every = (config.session_ttl / 4).max(Duration::from_secs(1));
    spawn_session_sweeper(state.clone(), sweep_every);
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "Starting server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
