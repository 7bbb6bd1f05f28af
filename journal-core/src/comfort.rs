//! Comfort recall: reminding the user of entries written on better days.

use crate::completion::{Completion, CompletionError};
use crate::journal::JournalEntry;
use crate::mood::COMPANION_SYSTEM_PROMPT;
use std::sync::Arc;

/// Tones that trigger a recall.
pub const NEGATIVE_TONES: &[&str] = &["sad", "anxious", "stressed", "angry", "lonely", "tired"];

/// Tones whose entries are worth recalling.
pub const COMFORTING_TONES: &[&str] = &["happy", "content", "neutral", "grateful"];

/// Maximum number of past entries quoted back.
pub const MAX_RECALLED_ENTRIES: usize = 5;

/// Placed between the base affirmation and the recalled suggestion.
pub const RECALL_SEPARATOR: &str = "\n\n🌱 Based on your past reflections:\n";

pub fn is_negative(tone: &str) -> bool {
    NEGATIVE_TONES.contains(&tone)
}

/// The most recent comforting entry texts, oldest first.
pub fn comforting_entries(history: &[JournalEntry]) -> Vec<&str> {
    let matches: Vec<&str> = history
        .iter()
        .filter(|e| COMFORTING_TONES.contains(&e.tone.as_str()))
        .filter_map(|e| e.entry.as_deref())
        .collect();
    let skip = matches.len().saturating_sub(MAX_RECALLED_ENTRIES);
    matches.into_iter().skip(skip).collect()
}

pub fn build_recall_prompt(tone: &str, entries: &[&str]) -> String {
    let excerpt = entries
        .iter()
        .map(|e| format!("- {e}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "The user is feeling {tone} right now.\n\
         Here are some of their past journal entries that made them feel better:\n\
         {excerpt}\n\n\
         Based on these and the current mood, suggest something that might help in a gentle and empathetic way."
    )
}

/// Join a recalled suggestion onto an affirmation.
pub fn with_recall(affirmation: &str, recalled: &str) -> String {
    format!("{affirmation}{RECALL_SEPARATOR}{recalled}")
}

/// Asks the completion backend for a suggestion grounded in happier entries.
#[derive(Clone)]
pub struct ComfortRecall {
    completion: Arc<dyn Completion>,
}

impl ComfortRecall {
    pub fn new(completion: Arc<dyn Completion>) -> Self {
        Self { completion }
    }

    /// Returns `None` without contacting the backend when the tone is not
    /// negative or there is nothing comforting to recall.
    pub async fn recall(
        &self,
        tone: &str,
        history: &[JournalEntry],
    ) -> Result<Option<String>, CompletionError> {
        if !is_negative(tone) {
            return Ok(None);
        }
        let entries = comforting_entries(history);
        if entries.is_empty() {
            return Ok(None);
        }

        tracing::debug!(%tone, recalled = entries.len(), "recalling comforting entries");
        let response = self
            .completion
            .complete(Some(COMPANION_SYSTEM_PROMPT), &build_recall_prompt(tone, &entries))
            .await?;
        Ok(Some(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockCompletion;

    fn history(tones: &[&str]) -> Vec<JournalEntry> {
        tones
            .iter()
            .enumerate()
            .map(|(i, tone)| JournalEntry::new(*tone).with_entry(format!("entry {i} ({tone})")))
            .collect()
    }

    #[test]
    fn test_negative_tones() {
        assert!(is_negative("lonely"));
        assert!(!is_negative("happy"));
        assert!(!is_negative("Sad"));
    }

    #[test]
    fn test_keeps_five_most_recent_in_order() {
        let history = history(&[
            "happy", "sad", "content", "neutral", "grateful", "angry", "happy", "happy",
        ]);
        let entries = comforting_entries(&history);
        assert_eq!(
            entries,
            vec![
                "entry 2 (content)",
                "entry 3 (neutral)",
                "entry 4 (grateful)",
                "entry 6 (happy)",
                "entry 7 (happy)",
            ]
        );
    }

    #[test]
    fn test_entries_without_text_are_ignored() {
        let history = vec![JournalEntry::new("happy")];
        assert!(comforting_entries(&history).is_empty());
    }

    #[test]
    fn test_prompt_lists_entries() {
        let prompt = build_recall_prompt("sad", &["walked the dog", "called mom"]);
        assert!(prompt.contains("feeling sad right now"));
        assert!(prompt.contains("- walked the dog\n- called mom"));
    }

    #[tokio::test]
    async fn test_recall_skips_positive_tone() {
        let mock = Arc::new(MockCompletion::new(vec!["unused"]));
        let recall = ComfortRecall::new(mock.clone());

        let result = recall.recall("happy", &history(&["happy"])).await.unwrap();
        assert!(result.is_none());
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_recall_without_matches_returns_none() {
        let mock = Arc::new(MockCompletion::new(vec!["unused"]));
        let recall = ComfortRecall::new(mock.clone());

        let result = recall.recall("sad", &history(&["sad", "angry"])).await.unwrap();
        assert!(result.is_none());
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_recall_returns_raw_response() {
        let mock = Arc::new(MockCompletion::new(vec!["Maybe call your friend again?"]));
        let recall = ComfortRecall::new(mock.clone());

        let result = recall
            .recall("lonely", &history(&["happy", "lonely"]))
            .await
            .unwrap();
        assert_eq!(result.as_deref(), Some("Maybe call your friend again?"));
        assert!(mock.prompts()[0].user.contains("- entry 0 (happy)"));
    }

    #[test]
    fn test_with_recall_separator() {
        assert_eq!(
            with_recall("Be gentle.", "Try tea."),
            "Be gentle.\n\n🌱 Based on your past reflections:\nTry tea."
        );
    }
}
