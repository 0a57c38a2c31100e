use anyhow::Context;
use std::sync::Arc;
use switchboard_server::{AppState, Config, WebRtcEngine, router};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("failed to load configuration")?;
    info!(?config, "Configuration loaded");

    let engine = WebRtcEngine::new(config.engine_config())
        .context("failed to initialize the media engine")?;
    let state = AppState::for_all_modes(&config, Arc::new(engine));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address))?;
    info!("Signaling server listening on ws://{}/ws/{{mode}}", config.bind_address);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
