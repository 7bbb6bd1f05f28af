//! Mood classification.
//!
//! A journal entry goes to the completion backend with a request for a
//! fixed two-line answer:
//!
//! ```text
//! Tone: <one-word tone>
//! Affirmation: <calming message>
//! ```
//!
//! Anything that does not fit that shape falls back to a neutral tone and a
//! second request for general encouragement.

use crate::completion::{Completion, CompletionError};
use std::sync::Arc;

/// Tones suggested to the model as examples.
pub const TONE_HINTS: &[&str] = &[
    "happy", "sad", "excited", "anxious", "angry", "content", "neutral", "lonely", "tired",
    "grateful",
];

/// Tone used when the model's answer can't be parsed.
pub const FALLBACK_TONE: &str = "neutral";

const CLASSIFIER_SYSTEM_PROMPT: &str = "You are a gentle and emotionally intelligent mental health assistant. \
You help users reflect on their feelings and offer calming affirmations.";

pub(crate) const COMPANION_SYSTEM_PROMPT: &str =
    "You are a thoughtful companion providing emotionally supportive suggestions.";

/// Outcome of parsing a classifier response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoodParse {
    Parsed { tone: String, affirmation: String },
    Unparsed,
}

/// Parse a `Tone: ...` / `Affirmation: ...` response.
///
/// The response is split on its first line break; each half must carry a
/// value after its first colon. The tone is lower-cased with surrounding
/// whitespace and punctuation removed.
pub fn parse_mood_response(response: &str) -> MoodParse {
    let Some((tone_line, affirmation_part)) = response.trim().split_once('\n') else {
        return MoodParse::Unparsed;
    };
    let Some((_, tone)) = tone_line.split_once(':') else {
        return MoodParse::Unparsed;
    };
    let Some((_, affirmation)) = affirmation_part.split_once(':') else {
        return MoodParse::Unparsed;
    };

    let tone = tone
        .trim_matches(|c: char| c.is_whitespace() || c.is_ascii_punctuation())
        .to_lowercase();
    if tone.is_empty() {
        return MoodParse::Unparsed;
    }

    MoodParse::Parsed {
        tone,
        affirmation: affirmation.trim().to_string(),
    }
}

/// Build the classification prompt for a journal entry.
pub fn build_classification_prompt(entry: &str) -> String {
    format!(
        "Possible tones include: {hints}.\n\
         Here is a journal entry:\n\"{entry}\"\n\n\
         Respond ONLY in a humane way, like a caring psychiatrist, using exactly two lines:\n\
         Tone: <one-word tone>\n\
         Affirmation: <calming message>",
        hints = TONE_HINTS.join(", "),
    )
}

fn build_fallback_prompt(entry: &str) -> String {
    format!(
        "The user seems to be neutral right now. \
         Please suggest them some encouraging tips based on the journal entry:\n\"{entry}\""
    )
}

/// Result of classifying one journal entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub tone: String,
    pub affirmation: String,
    /// False when the fallback path produced this result.
    pub parsed: bool,
}

/// Detects the tone of a journal entry and produces an affirmation.
#[derive(Clone)]
pub struct MoodClassifier {
    completion: Arc<dyn Completion>,
}

impl MoodClassifier {
    pub fn new(completion: Arc<dyn Completion>) -> Self {
        Self { completion }
    }

    /// Classify a journal entry.
    ///
    /// Only backend failures are errors; an unexpected response shape is
    /// handled with the fallback request.
    pub async fn classify(&self, entry: &str) -> Result<Classification, CompletionError> {
        let response = self
            .completion
            .complete(
                Some(CLASSIFIER_SYSTEM_PROMPT),
                &build_classification_prompt(entry),
            )
            .await?;

        match parse_mood_response(&response) {
            MoodParse::Parsed { tone, affirmation } => {
                tracing::debug!(%tone, "classified journal entry");
                Ok(Classification {
                    tone,
                    affirmation,
                    parsed: true,
                })
            }
            MoodParse::Unparsed => {
                tracing::debug!(response = %response, "classifier response unparsed, using fallback");
                let affirmation = self
                    .completion
                    .complete(Some(COMPANION_SYSTEM_PROMPT), &build_fallback_prompt(entry))
                    .await?;
                Ok(Classification {
                    tone: FALLBACK_TONE.to_string(),
                    affirmation: affirmation.trim().to_string(),
                    parsed: false,
                })
            }
        }
    }
}
