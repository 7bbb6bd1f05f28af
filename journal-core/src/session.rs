//! JournalSession - one conversation with the journaling assistant.
//!
//! The session itself holds no conversation state. Each call to
//! [`JournalSession::handle`] takes the current [`ConversationState`] and
//! returns the next one inside a [`Turn`]; the frontend owns the value and
//! threads it from turn to turn.
//!
//! Utterances are matched after trimming and lower-casing, in this order:
//!
//! 1. A termination phrase ends the session, saving any pending mood.
//! 2. A chart request renders the mood chart and leaves the state alone.
//! 3. In [`ConversationState::Idle`] anything else is a journal entry to
//!    classify.
//! 4. While awaiting a follow-up, a negative response saves the pending
//!    mood and returns to idle; anything else is a question answered from
//!    the reference document.

use crate::chart::{self, ChartError};
use crate::comfort::{self, ComfortRecall};
use crate::completion::{Completion, CompletionError};
use crate::config::AssistantConfig;
use crate::journal::{JournalEntry, JournalError, JournalStore};
use crate::mood::MoodClassifier;
use crate::retrieval::{RetrievalError, Retriever};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Phrases that end the session.
pub const TERMINATION_PHRASES: &[&str] = &[
    "no",
    "stop",
    "end",
    "exit",
    "quit",
    "end the convo",
    "end the conversation",
];

/// Phrases that decline to talk further about a detected mood.
pub const NEGATIVE_RESPONSES: &[&str] = &["no", "nah", "stop"];

/// Substrings that ask for the mood chart.
pub const CHART_TRIGGERS: &[&str] = &["mood chart", "plot mood"];

const DEFAULT_TOP_K: usize = 3;
const DEFAULT_TURN_TIMEOUT: Duration = Duration::from_secs(120);

/// Errors from handling a turn.
///
/// None of these end the session; the caller keeps its previous state.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Completion error: {0}")]
    Completion(#[from] CompletionError),

    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("Turn timed out after {0:?}")]
    Timeout(Duration),

    #[error("Turn cancelled")]
    Cancelled,
}

impl SessionError {
    /// Whether a backend (completion or retrieval) caused the failure.
    pub fn is_collaborator(&self) -> bool {
        matches!(self, SessionError::Completion(_) | SessionError::Retrieval(_))
    }
}

/// A detected mood that has not been saved yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMood {
    /// The journal entry text the mood was detected from.
    pub entry: String,
    pub tone: String,
    pub affirmation: String,
}

impl PendingMood {
    fn to_entry(&self) -> JournalEntry {
        JournalEntry::new(&self.tone)
            .with_entry(&self.entry)
            .with_affirmation(&self.affirmation)
    }
}

/// Where the conversation stands between turns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConversationState {
    /// No mood pending.
    #[default]
    Idle,
    /// A mood was just detected; waiting for yes/no or a follow-up question.
    AwaitingFollowUp { pending: PendingMood },
}

impl ConversationState {
    pub fn is_active(&self) -> bool {
        matches!(self, ConversationState::AwaitingFollowUp { .. })
    }

    pub fn pending(&self) -> Option<&PendingMood> {
        match self {
            ConversationState::Idle => None,
            ConversationState::AwaitingFollowUp { pending } => Some(pending),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConversationState::Idle => "idle",
            ConversationState::AwaitingFollowUp { .. } => "awaiting_follow_up",
        }
    }
}

/// What happens after a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Next {
    Continue(ConversationState),
    End,
}

/// The outcome of one turn.
#[derive(Debug, Clone)]
pub struct Turn {
    /// Text to show the user.
    pub reply: String,
    pub next: Next,
    /// The entry written to the journal during this turn, if any.
    pub saved: Option<JournalEntry>,
    /// The chart rendered during this turn, if any.
    pub chart: Option<PathBuf>,
}

impl Turn {
    fn reply(reply: impl Into<String>, next: ConversationState) -> Self {
        Self {
            reply: reply.into(),
            next: Next::Continue(next),
            saved: None,
            chart: None,
        }
    }

    pub fn is_end(&self) -> bool {
        self.next == Next::End
    }
}

/// Progress of a turn as surfaced to an interface that does not block on it.
#[derive(Debug, Clone)]
pub enum TurnStatus {
    Pending,
    Resolved(Turn),
    Failed(String),
}

impl TurnStatus {
    pub fn label(&self) -> &'static str {
        match self {
            TurnStatus::Pending => "pending",
            TurnStatus::Resolved(_) => "resolved",
            TurnStatus::Failed(_) => "failed",
        }
    }
}

impl From<Result<Turn, SessionError>> for TurnStatus {
    fn from(result: Result<Turn, SessionError>) -> Self {
        match result {
            Ok(turn) => TurnStatus::Resolved(turn),
            Err(e) => TurnStatus::Failed(e.to_string()),
        }
    }
}

fn normalize(utterance: &str) -> String {
    utterance.trim().to_lowercase()
}

pub fn is_termination(utterance: &str) -> bool {
    TERMINATION_PHRASES.contains(&normalize(utterance).as_str())
}

pub fn is_negative_response(utterance: &str) -> bool {
    NEGATIVE_RESPONSES.contains(&normalize(utterance).as_str())
}

pub fn is_chart_request(utterance: &str) -> bool {
    let normalized = normalize(utterance);
    CHART_TRIGGERS.iter().any(|t| normalized.contains(t))
}

/// Whether this utterance writes the pending mood to the journal.
fn saves_pending(state: &ConversationState, utterance: &str) -> bool {
    state.pending().is_some() && (is_termination(utterance) || is_negative_response(utterance))
}

/// Prompt for answering a follow-up question from retrieved passages.
pub fn build_answer_prompt(context: &str, question: &str) -> String {
    format!(
        "You are a compassionate mental health journaling assistant. \
         Use the context below to answer the question supportively.\n\n\
         Context:\n{context}\n\n\
         Question: {question}\n\n\
         Answer:"
    )
}

/// A journaling conversation.
pub struct JournalSession {
    completion: Arc<dyn Completion>,
    retriever: Arc<dyn Retriever>,
    store: JournalStore,
    classifier: MoodClassifier,
    recall: ComfortRecall,
    chart_path: PathBuf,
    top_k: usize,
    turn_timeout: Duration,
}

impl JournalSession {
    /// Create a session with default chart path, retrieval depth and timeout.
    pub fn new(
        completion: Arc<dyn Completion>,
        retriever: Arc<dyn Retriever>,
        store: JournalStore,
    ) -> Self {
        Self {
            classifier: MoodClassifier::new(completion.clone()),
            recall: ComfortRecall::new(completion.clone()),
            completion,
            retriever,
            store,
            chart_path: PathBuf::from("mood_plot.svg"),
            top_k: DEFAULT_TOP_K,
            turn_timeout: DEFAULT_TURN_TIMEOUT,
        }
    }

    /// Create a session using paths and limits from a config.
    pub fn from_config(
        config: &AssistantConfig,
        completion: Arc<dyn Completion>,
        retriever: Arc<dyn Retriever>,
    ) -> Self {
        Self::new(completion, retriever, JournalStore::open(&config.journal_path))
            .with_chart_path(&config.chart_path)
            .with_top_k(config.top_k)
            .with_turn_timeout(config.turn_timeout)
    }

    /// Set where mood charts are written.
    pub fn with_chart_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.chart_path = path.into();
        self
    }

    /// Set how many passages back a follow-up answer.
    pub fn with_top_k(mut self, k: usize) -> Self {
        self.top_k = k;
        self
    }

    pub fn with_turn_timeout(mut self, timeout: Duration) -> Self {
        self.turn_timeout = timeout;
        self
    }

    pub fn store(&self) -> &JournalStore {
        &self.store
    }

    pub fn chart_path(&self) -> &Path {
        &self.chart_path
    }

    pub fn turn_timeout(&self) -> Duration {
        self.turn_timeout
    }

    /// Handle one utterance.
    pub async fn handle(
        &self,
        state: &ConversationState,
        utterance: &str,
    ) -> Result<Turn, SessionError> {
        let text = utterance.trim();
        tracing::debug!(state = state.label(), "handling utterance");

        if is_termination(text) {
            return Ok(self.end(state).await);
        }
        if is_chart_request(text) {
            return Ok(self.chart(state).await);
        }

        match state {
            ConversationState::Idle => self.detect(text).await,
            ConversationState::AwaitingFollowUp { pending } if is_negative_response(text) => {
                Ok(self.conclude(pending).await)
            }
            ConversationState::AwaitingFollowUp { .. } => self.answer(state, text).await,
        }
    }

    /// Handle one utterance, giving up after the turn timeout or when
    /// `cancel` fires.
    ///
    /// A turn that writes the pending mood is local file work and always
    /// runs to completion, so the journal and the returned state agree.
    pub async fn handle_with_cancel(
        &self,
        state: &ConversationState,
        utterance: &str,
        cancel: &CancellationToken,
    ) -> Result<Turn, SessionError> {
        if saves_pending(state, utterance) {
            return self.handle(state, utterance).await;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("turn cancelled");
                Err(SessionError::Cancelled)
            }
            result = tokio::time::timeout(self.turn_timeout, self.handle(state, utterance)) => {
                match result {
                    Ok(turn) => turn,
                    Err(_) => {
                        tracing::warn!(timeout = ?self.turn_timeout, "turn timed out");
                        Err(SessionError::Timeout(self.turn_timeout))
                    }
                }
            }
        }
    }

    async fn detect(&self, text: &str) -> Result<Turn, SessionError> {
        let classification = self.classifier.classify(text).await?;
        let tone = classification.tone;
        let mut affirmation = classification.affirmation;

        if comfort::is_negative(&tone) {
            let history = match self.store.load_lenient().await {
                Ok(report) => report.entries,
                Err(e) => {
                    tracing::warn!(error = %e, "could not read journal history for recall");
                    Vec::new()
                }
            };
            if let Some(recalled) = self.recall.recall(&tone, &history).await? {
                affirmation = comfort::with_recall(&affirmation, &recalled);
            }
        }

        let reply = format!(
            "I sense you might be feeling *{tone}*. Would you like to talk more about it? (yes/no)\n\n{affirmation}"
        );
        let pending = PendingMood {
            entry: text.to_string(),
            tone,
            affirmation,
        };
        Ok(Turn::reply(
            reply,
            ConversationState::AwaitingFollowUp { pending },
        ))
    }

    async fn answer(&self, state: &ConversationState, question: &str) -> Result<Turn, SessionError> {
        let passages = self.retriever.top_k(question, self.top_k).await?;
        tracing::debug!(passages = passages.len(), "answering follow-up question");

        let prompt = build_answer_prompt(&passages.join("\n"), question);
        let answer = self.completion.complete(None, &prompt).await?;
        Ok(Turn::reply(answer.trim(), state.clone()))
    }

    async fn conclude(&self, pending: &PendingMood) -> Turn {
        match self.save(pending).await {
            Ok(entry) => Turn {
                reply: "Thank you for sharing. I've saved your mood to your journal. Take care! 🌱"
                    .to_string(),
                next: Next::Continue(ConversationState::Idle),
                saved: Some(entry),
                chart: None,
            },
            Err(_) => Turn::reply(
                "Thank you for sharing. I couldn't save your mood to your journal this time. Take care! 🌱",
                ConversationState::Idle,
            ),
        }
    }

    async fn end(&self, state: &ConversationState) -> Turn {
        let Some(pending) = state.pending() else {
            return Turn {
                reply: "Session ended. Thank you for sharing.".to_string(),
                next: Next::End,
                saved: None,
                chart: None,
            };
        };

        match self.save(pending).await {
            Ok(entry) => Turn {
                reply: "Session ended. Your mood has been saved to your journal. Thank you for sharing."
                    .to_string(),
                next: Next::End,
                saved: Some(entry),
                chart: None,
            },
            Err(_) => Turn {
                reply: "Session ended. Your mood could not be saved to your journal. Thank you for sharing."
                    .to_string(),
                next: Next::End,
                saved: None,
                chart: None,
            },
        }
    }

    async fn chart(&self, state: &ConversationState) -> Turn {
        match chart::render(self.store.path(), &self.chart_path).await {
            Ok(path) => Turn {
                reply: format!(
                    "Your mood chart has been generated. Please check the image at {}.",
                    path.display()
                ),
                next: Next::Continue(state.clone()),
                saved: None,
                chart: Some(path),
            },
            Err(ChartError::Empty) => {
                Turn::reply("There are no journal entries to chart yet.", state.clone())
            }
            Err(e) => {
                tracing::warn!(error = %e, "mood chart failed");
                Turn::reply(
                    format!("Sorry, I couldn't generate your mood chart: {e}"),
                    state.clone(),
                )
            }
        }
    }

    async fn save(&self, pending: &PendingMood) -> Result<JournalEntry, JournalError> {
        let entry = pending.to_entry();
        match self.store.append(&entry).await {
            Ok(()) => {
                tracing::info!(tone = %entry.tone, path = %self.store.path().display(), "mood saved to journal");
                Ok(entry)
            }
            Err(e) => {
                tracing::warn!(error = %e, tone = %pending.tone, "failed to save mood");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockCompletion, StaticRetriever};
    use tempfile::TempDir;

    fn session(dir: &TempDir, replies: Vec<&str>) -> (JournalSession, Arc<MockCompletion>) {
        let mock = Arc::new(MockCompletion::new(replies));
        let session = JournalSession::new(
            mock.clone(),
            Arc::new(StaticRetriever::new(vec!["Breathe in for four counts."])),
            JournalStore::open(dir.path().join("journal.json")),
        )
        .with_chart_path(dir.path().join("mood_plot.svg"));
        (session, mock)
    }

    fn awaiting(tone: &str) -> ConversationState {
        ConversationState::AwaitingFollowUp {
            pending: PendingMood {
                entry: "today was a lot".to_string(),
                tone: tone.to_string(),
                affirmation: "You are doing fine.".to_string(),
            },
        }
    }

    #[test]
    fn test_phrase_matching_is_exact() {
        assert!(is_termination("  Quit "));
        assert!(is_termination("End the Conversation"));
        assert!(!is_termination("I want to stop"));
        assert!(is_negative_response("NAH"));
        assert!(!is_negative_response("nah thanks"));
        assert!(is_chart_request("show me my Mood Chart please"));
        assert!(!is_chart_request("chart my mood"));
    }

    #[test]
    fn test_state_labels() {
        assert_eq!(ConversationState::default().label(), "idle");
        assert!(!ConversationState::Idle.is_active());
        assert_eq!(awaiting("sad").label(), "awaiting_follow_up");
        assert_eq!(awaiting("sad").pending().map(|p| p.tone.as_str()), Some("sad"));
    }

    #[tokio::test]
    async fn test_idle_entry_detects_mood() {
        let dir = TempDir::new().unwrap();
        let (session, _) = session(&dir, vec!["Tone: happy\nAffirmation: Enjoy it."]);

        let turn = session
            .handle(&ConversationState::Idle, "Great day at the park")
            .await
            .unwrap();
        assert!(turn.reply.contains("*happy*"));
        assert!(turn.reply.ends_with("Enjoy it."));
        let Next::Continue(ConversationState::AwaitingFollowUp { pending }) = turn.next else {
            panic!("expected follow-up state");
        };
        assert_eq!(pending.entry, "Great day at the park");
        assert_eq!(pending.tone, "happy");
    }

    #[tokio::test]
    async fn test_negative_tone_appends_recall() {
        let dir = TempDir::new().unwrap();
        let (session, mock) = session(
            &dir,
            vec![
                "Tone: sad\nAffirmation: It's okay to feel this way.",
                "Maybe revisit the garden.",
            ],
        );
        session
            .store()
            .append(&JournalEntry::new("happy").with_entry("Spent the afternoon in the garden"))
            .await
            .unwrap();

        let turn = session
            .handle(&ConversationState::Idle, "Everything feels heavy")
            .await
            .unwrap();
        assert!(turn.reply.contains("*sad*"));
        assert!(turn
            .reply
            .contains("It's okay to feel this way.\n\n🌱 Based on your past reflections:\nMaybe revisit the garden."));
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_follow_up_question_uses_retrieved_context() {
        let dir = TempDir::new().unwrap();
        let (session, mock) = session(&dir, vec!["Try box breathing."]);
        let state = awaiting("anxious");

        let turn = session.handle(&state, "How can I calm down?").await.unwrap();
        assert_eq!(turn.reply, "Try box breathing.");
        assert_eq!(turn.next, Next::Continue(state));

        let prompt = &mock.prompts()[0];
        assert!(prompt.system.is_none());
        assert!(prompt.user.contains("Context:\nBreathe in for four counts."));
        assert!(prompt.user.contains("Question: How can I calm down?"));
    }

    #[tokio::test]
    async fn test_nah_saves_and_returns_to_idle() {
        let dir = TempDir::new().unwrap();
        let (session, _) = session(&dir, vec![]);

        let turn = session.handle(&awaiting("tired"), "nah").await.unwrap();
        assert_eq!(turn.next, Next::Continue(ConversationState::Idle));
        assert!(turn.reply.contains("I've saved your mood"));
        assert_eq!(turn.saved.as_ref().map(|e| e.tone.as_str()), Some("tired"));

        let entries = session.store().load_all().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].entry.as_deref(), Some("today was a lot"));
        assert_eq!(entries[0].affirmation.as_deref(), Some("You are doing fine."));
    }

    #[tokio::test]
    async fn test_termination_takes_precedence() {
        let dir = TempDir::new().unwrap();
        let (session, _) = session(&dir, vec![]);

        let turn = session.handle(&awaiting("calm"), "no").await.unwrap();
        assert!(turn.is_end());
        assert_eq!(
            turn.reply,
            "Session ended. Your mood has been saved to your journal. Thank you for sharing."
        );
        assert_eq!(session.store().load_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_save_failure_still_transitions() {
        let dir = TempDir::new().unwrap();
        let mock = Arc::new(MockCompletion::new(Vec::<String>::new()));
        // A directory where the journal file should be makes the write fail.
        let journal_path = dir.path().join("journal.json");
        std::fs::create_dir(&journal_path).unwrap();
        let session = JournalSession::new(
            mock,
            Arc::new(StaticRetriever::default()),
            JournalStore::open(&journal_path),
        );

        let turn = session.handle(&awaiting("sad"), "nah").await.unwrap();
        assert_eq!(turn.next, Next::Continue(ConversationState::Idle));
        assert!(turn.saved.is_none());
        assert!(turn.reply.contains("couldn't save"));
    }

    #[tokio::test]
    async fn test_chart_request_keeps_state() {
        let dir = TempDir::new().unwrap();
        let (session, mock) = session(&dir, vec![]);
        let state = awaiting("happy");

        let turn = session.handle(&state, "plot mood").await.unwrap();
        assert_eq!(turn.reply, "There are no journal entries to chart yet.");
        assert!(turn.chart.is_none());
        assert_eq!(turn.next, Next::Continue(state.clone()));

        session
            .store()
            .append(&JournalEntry::new("calm"))
            .await
            .unwrap();
        let turn = session.handle(&state, "plot mood").await.unwrap();
        assert_eq!(turn.chart.as_deref(), Some(session.chart_path()));
        assert!(session.chart_path().exists());
        assert_eq!(turn.next, Next::Continue(state));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_backend_failure_is_collaborator_error() {
        let dir = TempDir::new().unwrap();
        let (session, _) = session(&dir, vec![]);

        let err = session
            .handle(&ConversationState::Idle, "hello")
            .await
            .unwrap_err();
        assert!(err.is_collaborator());
    }

    #[tokio::test]
    async fn test_cancelled_turn() {
        let dir = TempDir::new().unwrap();
        let (session, _) = session(&dir, vec!["Tone: calm\nAffirmation: Nice."]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = session
            .handle_with_cancel(&ConversationState::Idle, "quiet evening", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Cancelled));
    }

    #[tokio::test]
    async fn test_turn_timeout() {
        let dir = TempDir::new().unwrap();
        let mock = Arc::new(
            MockCompletion::new(vec!["Tone: calm\nAffirmation: Nice."])
                .with_delay(Duration::from_secs(5)),
        );
        let session = JournalSession::new(
            mock,
            Arc::new(StaticRetriever::default()),
            JournalStore::open(dir.path().join("journal.json")),
        )
        .with_turn_timeout(Duration::from_millis(20));

        let err = session
            .handle_with_cancel(&ConversationState::Idle, "quiet evening", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Timeout(_)));
        assert!(!err.is_collaborator());
    }

    #[tokio::test]
    async fn test_saving_turn_is_not_interrupted() {
        let dir = TempDir::new().unwrap();
        let (session, _) = session(&dir, vec![]);
        let session = session.with_turn_timeout(Duration::ZERO);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let turn = session
            .handle_with_cancel(&awaiting("tired"), "nah", &cancel)
            .await
            .unwrap();
        assert_eq!(turn.next, Next::Continue(ConversationState::Idle));
        assert!(turn.saved.is_some());

        let turn = session
            .handle_with_cancel(&awaiting("lonely"), "quit", &cancel)
            .await
            .unwrap();
        assert!(turn.is_end());
        assert!(turn.saved.is_some());

        let tones: Vec<_> = session
            .store()
            .load_all()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.tone)
            .collect();
        assert_eq!(tones, vec!["tired", "lonely"]);

        let err = session
            .handle_with_cancel(&awaiting("tired"), "why do I feel this way?", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Cancelled));
    }

    #[test]
    fn test_turn_status_from_result() {
        let status: TurnStatus = Err(SessionError::Cancelled).into();
        assert_eq!(status.label(), "failed");
        assert_eq!(TurnStatus::Pending.label(), "pending");
    }
}
