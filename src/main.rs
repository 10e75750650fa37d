use std::sync::Arc;

use anyhow::Context;
use blogicum::{
    app,
    database::schema::migrate,
    utils::{snowflake::set_server_id, state::AppState},
};
use dotenvy::dotenv;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "blogicum=info,tower_http=info";

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let state = AppState::create_from_env()
        .await
        .context("Failed to create AppState")?;
    set_server_id(state.config.server_id);
    migrate(&state.db_pool)
        .await
        .context("Failed to apply database schema")?;

    let shared_state = Arc::new(state);
    let router = app(shared_state.clone());

    let listener = tokio::net::TcpListener::bind(&shared_state.config.url)
        .await
        .with_context(|| format!("Failed to bind {}", shared_state.config.url))?;
    info!("Listening on {}", shared_state.config.url);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;
    Ok(())
}
