//! Frontends for the journaling assistant.
//!
//! - `repl`: the interactive line-based loop behind the `journal` binary
//! - `web`: a small local chat page and JSON API behind `journal-web`
//! - `setup`: logging and session wiring shared by both

pub mod repl;
pub mod setup;
pub mod web;

use journal_core::SessionError;

pub use setup::{build_session, init_tracing};

/// What the user sees when a turn fails.
pub fn error_reply(err: &SessionError) -> &'static str {
    match err {
        SessionError::Timeout(_) => "Sorry, that took too long. Please try again.",
        SessionError::Cancelled => "The request was cancelled.",
        SessionError::Completion(_) | SessionError::Retrieval(_) => {
            "Sorry, I couldn't reach the assistant right now. Is the Ollama app running?"
        }
    }
}
