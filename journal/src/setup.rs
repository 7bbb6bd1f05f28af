//! Logging and session wiring.

use journal_core::retrieval::{DocumentIndex, NoDocument, Retriever};
use journal_core::{AssistantConfig, JournalSession, JournalStore};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a stderr subscriber filtered by `RUST_LOG`, or `default_filter`
/// when it is unset.
pub fn init_tracing(default_filter: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Build a session from configuration.
///
/// A legacy line-delimited journal is converted first. If the reference
/// document cannot be indexed, follow-up questions are answered without
/// retrieved context.
pub async fn build_session(config: &AssistantConfig) -> JournalSession {
    let store = JournalStore::open(&config.journal_path);
    match store.migrate_legacy().await {
        Ok(0) => {}
        Ok(count) => tracing::info!(count, path = %store.path().display(), "migrated legacy journal"),
        Err(e) => tracing::warn!(error = %e, "could not migrate legacy journal"),
    }

    let client = Arc::new(config.ollama().with_timeout(config.turn_timeout));
    let retriever: Arc<dyn Retriever> = match DocumentIndex::load_or_build(
        &config.document_path,
        &config.index_path,
        client.clone(),
        config.chunking,
    )
    .await
    {
        Ok(index) => {
            tracing::info!(chunks = index.len(), "reference document ready");
            Arc::new(index)
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                document = %config.document_path.display(),
                "reference document unavailable, answering without context"
            );
            Arc::new(NoDocument)
        }
    };

    JournalSession::from_config(config, client, retriever)
}
