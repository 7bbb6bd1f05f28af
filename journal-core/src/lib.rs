//! Mood journaling assistant engine.
//!
//! This crate provides:
//! - Mood detection with calming affirmations
//! - A JSON journal store with legacy migration
//! - Comfort recall from happier past entries
//! - Follow-up questions answered from a reference document
//! - Mood-over-time charts
//!
//! # Quick Start
//!
//! ```ignore
//! use journal_core::{AssistantConfig, ConversationState, JournalSession, Next, NoDocument};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AssistantConfig::load()?;
//!     let session = JournalSession::from_config(&config, Arc::new(config.ollama()), Arc::new(NoDocument));
//!
//!     let turn = session.handle(&ConversationState::Idle, "I feel overwhelmed today").await?;
//!     println!("{}", turn.reply);
//!
//!     if let Next::Continue(state) = turn.next {
//!         session.handle(&state, "quit").await?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod chart;
pub mod comfort;
pub mod completion;
pub mod config;
pub mod journal;
pub mod mood;
pub mod retrieval;
pub mod session;
pub mod testing;

// Primary public API
pub use chart::ChartError;
pub use completion::{Completion, CompletionError};
pub use config::{AssistantConfig, ConfigError};
pub use journal::{JournalEntry, JournalError, JournalStore};
pub use mood::{Classification, MoodClassifier, MoodParse};
pub use retrieval::{DocumentIndex, Embedder, NoDocument, RetrievalError, Retriever};
pub use session::{ConversationState, JournalSession, Next, PendingMood, SessionError, Turn, TurnStatus};
pub use testing::{MockCompletion, StaticRetriever, TestHarness};
