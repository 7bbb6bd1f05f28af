//! Testing utilities for the journaling assistant.
//!
//! This module provides tools for integration testing:
//! - `MockCompletion` for deterministic testing without a running model
//! - `StaticRetriever` for fixed reference passages
//! - `TestHarness` for scripted conversations against a real journal file

use crate::completion::{Completion, CompletionError};
use crate::journal::{JournalEntry, JournalStore};
use crate::retrieval::{RetrievalError, Retriever};
use crate::session::{ConversationState, JournalSession, Next, SessionError, Turn};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A prompt received by [`MockCompletion`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedPrompt {
    pub system: Option<String>,
    pub user: String,
}

#[derive(Debug, Clone)]
enum Scripted {
    Text(String),
    Unavailable,
}

/// A completion backend that returns scripted responses in order.
///
/// Once the script runs out every call fails as if the backend were down.
#[derive(Debug, Default)]
pub struct MockCompletion {
    script: Mutex<VecDeque<Scripted>>,
    prompts: Mutex<Vec<RecordedPrompt>>,
    delay: Option<Duration>,
}

impl MockCompletion {
    /// Create a mock with scripted responses.
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Mutex::new(
                responses
                    .into_iter()
                    .map(|r| Scripted::Text(r.into()))
                    .collect(),
            ),
            prompts: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Add a response to the end of the script.
    pub fn queue_response(&self, text: impl Into<String>) {
        lock(&self.script).push_back(Scripted::Text(text.into()));
    }

    /// Add a backend failure to the end of the script.
    pub fn queue_failure(&self) {
        lock(&self.script).push_back(Scripted::Unavailable);
    }

    /// Number of calls received, including failed ones.
    pub fn call_count(&self) -> usize {
        lock(&self.prompts).len()
    }

    /// Every prompt received, oldest first.
    pub fn prompts(&self) -> Vec<RecordedPrompt> {
        lock(&self.prompts).clone()
    }

    pub fn remaining(&self) -> usize {
        lock(&self.script).len()
    }
}

#[async_trait]
impl Completion for MockCompletion {
    async fn complete(&self, system: Option<&str>, user: &str) -> Result<String, CompletionError> {
        lock(&self.prompts).push(RecordedPrompt {
            system: system.map(str::to_string),
            user: user.to_string(),
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = lock(&self.script).pop_front();
        match next {
            Some(Scripted::Text(text)) => Ok(text),
            Some(Scripted::Unavailable) => Err(CompletionError::Unavailable(
                "scripted failure".to_string(),
            )),
            None => Err(CompletionError::Unavailable(
                "no more scripted responses".to_string(),
            )),
        }
    }
}

/// A retriever that always returns the same passages.
#[derive(Debug, Default)]
pub struct StaticRetriever {
    passages: Vec<String>,
    queries: Mutex<Vec<(String, usize)>>,
    fail: bool,
}

impl StaticRetriever {
    pub fn new<I, S>(passages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            passages: passages.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// A retriever whose every lookup fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Every `(query, k)` received, oldest first.
    pub fn queries(&self) -> Vec<(String, usize)> {
        lock(&self.queries).clone()
    }
}

#[async_trait]
impl Retriever for StaticRetriever {
    async fn top_k(&self, query: &str, k: usize) -> Result<Vec<String>, RetrievalError> {
        lock(&self.queries).push((query.to_string(), k));
        if self.fail {
            return Err(RetrievalError::Embedding("scripted failure".to_string()));
        }
        Ok(self.passages.iter().take(k).cloned().collect())
    }
}

/// Test harness for running scripted conversations.
///
/// Threads the conversation state between turns the way a frontend does.
pub struct TestHarness {
    /// The scripted completion backend.
    pub completion: Arc<MockCompletion>,
    pub retriever: Arc<StaticRetriever>,
    pub session: JournalSession,
    /// Current conversation state.
    pub state: ConversationState,
    ended: bool,
}

impl TestHarness {
    /// Create a harness writing its journal to `journal_path` and its chart
    /// next to it.
    pub fn new(journal_path: impl AsRef<Path>) -> Self {
        Self::with_retriever(journal_path, StaticRetriever::default())
    }

    pub fn with_retriever(journal_path: impl AsRef<Path>, retriever: StaticRetriever) -> Self {
        let journal_path = journal_path.as_ref();
        let completion = Arc::new(MockCompletion::default());
        let retriever = Arc::new(retriever);
        let session = JournalSession::new(
            completion.clone(),
            retriever.clone(),
            JournalStore::open(journal_path),
        )
        .with_chart_path(journal_path.with_file_name("mood_plot.svg"));

        Self {
            completion,
            retriever,
            session,
            state: ConversationState::Idle,
            ended: false,
        }
    }

    /// Queue a completion response.
    pub fn expect_reply(&mut self, text: impl Into<String>) -> &mut Self {
        self.completion.queue_response(text);
        self
    }

    /// Queue a classifier response for the given tone.
    pub fn expect_mood(&mut self, tone: &str, affirmation: &str) -> &mut Self {
        self.expect_reply(format!("Tone: {tone}\nAffirmation: {affirmation}"))
    }

    /// Send an utterance and advance the state.
    ///
    /// On error the state is left as it was.
    pub async fn send(&mut self, text: &str) -> Result<Turn, SessionError> {
        let turn = self.session.handle(&self.state, text).await?;
        match &turn.next {
            Next::Continue(state) => self.state = state.clone(),
            Next::End => {
                self.state = ConversationState::Idle;
                self.ended = true;
            }
        }
        Ok(turn)
    }

    /// Whether a turn has ended the session.
    pub fn ended(&self) -> bool {
        self.ended
    }

    /// Tone of the pending mood, if any.
    pub fn pending_tone(&self) -> Option<&str> {
        self.state.pending().map(|p| p.tone.as_str())
    }

    /// Everything in the journal right now.
    pub async fn entries(&self) -> Vec<JournalEntry> {
        self.session
            .store()
            .load_lenient()
            .await
            .map(|report| report.entries)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_mock_completion_script() {
        let mock = MockCompletion::new(vec!["first"]);
        mock.queue_failure();
        mock.queue_response("third");

        assert_eq!(mock.complete(Some("sys"), "a").await.unwrap(), "first");
        assert!(mock.complete(None, "b").await.is_err());
        assert_eq!(mock.complete(None, "c").await.unwrap(), "third");
        assert!(mock.complete(None, "d").await.is_err());

        assert_eq!(mock.call_count(), 4);
        assert_eq!(mock.prompts()[0].system.as_deref(), Some("sys"));
        assert_eq!(mock.remaining(), 0);
    }

    #[tokio::test]
    async fn test_static_retriever() {
        let retriever = StaticRetriever::new(vec!["a", "b", "c"]);
        assert_eq!(retriever.top_k("q", 2).await.unwrap(), vec!["a", "b"]);
        assert_eq!(retriever.queries(), vec![("q".to_string(), 2)]);
        assert!(StaticRetriever::failing().top_k("q", 1).await.is_err());
    }

    #[tokio::test]
    async fn test_harness_threads_state() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let mut harness = TestHarness::new(temp_dir.path().join("journal.json"));
        harness.expect_mood("calm", "Enjoy the quiet.");

        harness.send("A slow Sunday").await.unwrap();
        assert_eq!(harness.pending_tone(), Some("calm"));

        harness.send("exit").await.unwrap();
        assert!(harness.ended());
        assert_eq!(harness.entries().await.len(), 1);
    }
}
