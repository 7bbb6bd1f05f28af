//! Text completion seam.
//!
//! Everything that talks to a language model goes through [`Completion`],
//! so the classifier, recall and session can run against a scripted mock.

use async_trait::async_trait;
use ollama::{ChatRequest, Message, Ollama};
use thiserror::Error;

/// Errors from a completion backend.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion backend unavailable: {0}")]
    Unavailable(String),

    #[error("completion failed: {0}")]
    Failed(String),
}

impl From<ollama::Error> for CompletionError {
    fn from(e: ollama::Error) -> Self {
        match e {
            ollama::Error::Unavailable(_) | ollama::Error::Network(_) => {
                CompletionError::Unavailable(e.to_string())
            }
            other => CompletionError::Failed(other.to_string()),
        }
    }
}

/// Something that turns a prompt into a single text response.
#[async_trait]
pub trait Completion: Send + Sync {
    async fn complete(&self, system: Option<&str>, user: &str) -> Result<String, CompletionError>;
}

#[async_trait]
impl Completion for Ollama {
    async fn complete(&self, system: Option<&str>, user: &str) -> Result<String, CompletionError> {
        let mut request = ChatRequest::new(vec![Message::user(user)]);
        if let Some(system) = system {
            request = request.with_system(system);
        }

        let response = Ollama::complete(self, request).await?;
        tracing::debug!(
            model = %response.model,
            prompt_tokens = response.usage.prompt_tokens,
            completion_tokens = response.usage.completion_tokens,
            "completion finished"
        );
        Ok(response.text().to_string())
    }
}
