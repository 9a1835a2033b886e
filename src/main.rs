mod config;
mod error;
mod models;
mod routes;
mod services;
#[cfg(test)]
mod test_support;

use tokio::net::TcpListener;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = config::AppConfig::from_env()?;
    if config.llm.api_key.is_none() {
        tracing::warn!("no LLM API key configured, text requests will be sent unauthenticated");
    }
    tracing::info!(
        model = %config.llm.model,
        image_provider = ?config.image.provider,
        max_attempts = config.image.max_attempts,
        "configuration loaded"
    );

    let bind_addr = config.bind_addr;
    let app_state = routes::AppState::new(config)?;
    let app = routes::router(app_state);

    let listener = TcpListener::bind(bind_addr).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
