//! Mood journaling assistant - local web chat.
//!
//! Listens on `JOURNAL_WEB_ADDR` (default `127.0.0.1:7860`). Stop it with
//! Ctrl+C or `POST /api/shutdown`.

use anyhow::Context;
use journal::web::{self, AppState};
use journal_core::AssistantConfig;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AssistantConfig::load().context("invalid configuration")?;
    journal::init_tracing("info");

    let session = journal::build_session(&config).await;
    let state = Arc::new(AppState::new(session));

    let shutdown = state.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl+C received, shutting down");
            shutdown.cancel();
        }
    });

    let listener = tokio::net::TcpListener::bind(&config.web_addr)
        .await
        .with_context(|| format!("could not bind {}", config.web_addr))?;
    tracing::info!(addr = %config.web_addr, "journal web chat listening");

    web::serve(listener, state).await.context("server error")?;
    tracing::info!("server stopped");
    Ok(())
}
