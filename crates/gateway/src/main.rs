mod feedback;
mod state;
mod ws;

use anyhow::Context;
use axum::routing::{get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use voiceagent_domain::config::Config;

use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    tracing::info!("voiceagent gateway starting");

    let (config, issues) = Config::from_env();
    for issue in &issues {
        tracing::error!("config: {issue}");
    }
    if !issues.is_empty() {
        tracing::error!("config validation failed with {} error(s)", issues.len());
        std::process::exit(2);
    }

    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState::new(config);

    let max_concurrent = std::env::var("VOICEAGENT_MAX_CONCURRENT_SESSIONS")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(256);
    tracing::info!(max_concurrent, "concurrency limit set");

    let app = Router::new()
        .route("/ws/agent", get(ws::agent_ws))
        .route("/api/feedback", post(feedback::feedback_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(ConcurrencyLimitLayer::new(max_concurrent))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    tracing::info!(addr = %addr, "voiceagent gateway listening");

    axum::serve(listener, app)
        .await
        .context("axum server error")?;

    Ok(())
}

/// Structured JSON tracing, mirroring the teacher's `init_tracing`.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,voiceagent_gateway=debug")),
        )
        .json()
        .init();
}
