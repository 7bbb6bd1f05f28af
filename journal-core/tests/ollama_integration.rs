//! Integration tests that call a real local Ollama runtime.
//!
//! These tests need `ollama serve` running with the configured chat and
//! embedding models pulled.
//! Run with: `cargo test -p journal-core --test ollama_integration -- --ignored`

use journal_core::retrieval::{ChunkOptions, DocumentIndex, Embedder, Retriever};
use journal_core::session::{ConversationState, JournalSession, Next};
use journal_core::{AssistantConfig, JournalStore, MoodClassifier, NoDocument};
use std::sync::Arc;
use tempfile::TempDir;

/// Load configuration, honouring a .env file.
fn setup() -> AssistantConfig {
    AssistantConfig::load().expect("invalid configuration")
}

#[tokio::test]
#[ignore] // Run with: cargo test -p journal-core --test ollama_integration -- --ignored
async fn test_classifier_returns_a_tone() {
    let config = setup();
    let classifier = MoodClassifier::new(Arc::new(config.ollama()));

    let result = classifier
        .classify("I finally finished the project and my team threw a small party")
        .await
        .expect("classifier should respond");

    assert!(!result.tone.is_empty());
    assert!(!result.affirmation.is_empty());
}

#[tokio::test]
#[ignore]
async fn test_document_index_ranks_relevant_chunk() {
    let config = setup();
    let dir = TempDir::new().expect("Failed to create temp dir");
    let doc_path = dir.path().join("guide.md");
    std::fs::write(
        &doc_path,
        "Sleep hygiene: keep a regular bedtime and avoid screens late at night.\n\n\
         Breathing: inhale for four counts, hold for four, exhale for four.\n",
    )
    .unwrap();

    let embedder: Arc<dyn Embedder> = Arc::new(config.ollama());
    let index = DocumentIndex::load_or_build(
        &doc_path,
        dir.path().join("index.json"),
        embedder,
        ChunkOptions {
            chunk_size: 80,
            overlap: 0,
        },
    )
    .await
    .expect("index should build");

    let top = index.top_k("How can I sleep better?", 1).await.unwrap();
    assert_eq!(top.len(), 1);
    assert!(top[0].contains("Sleep"));
}

#[tokio::test]
#[ignore]
async fn test_full_turn_then_quit() {
    let config = setup();
    let dir = TempDir::new().expect("Failed to create temp dir");
    let session = JournalSession::new(
        Arc::new(config.ollama()),
        Arc::new(NoDocument),
        JournalStore::open(dir.path().join("journal.json")),
    );

    let turn = session
        .handle(&ConversationState::Idle, "I feel overwhelmed today")
        .await
        .expect("turn should succeed");
    assert!(turn.reply.starts_with("I sense you might be feeling"));

    let Next::Continue(state) = turn.next else {
        panic!("session should continue");
    };
    let end = session.handle(&state, "quit").await.unwrap();
    assert!(end.is_end());
    assert_eq!(session.store().load_all().await.unwrap().len(), 1);
}
