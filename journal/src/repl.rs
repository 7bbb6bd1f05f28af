//! Interactive line-based loop.
//!
//! One utterance per input line. Replies are prefixed with `Bot: ` except
//! the closing message. End of input, a termination phrase or cancellation
//! ends the loop.

use crate::error_reply;
use journal_core::{ConversationState, JournalSession, Next, SessionError};
use std::io::BufRead;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Lines from an input source, ending when the sender is dropped.
pub type Lines = mpsc::Receiver<std::io::Result<String>>;

pub const WELCOME: &str = "\n🧘 Welcome to the Mental Health Journaling Assistant!\n\
Type 'exit' or 'quit' to end the session, or ask for your 'mood chart' at any time.\n\n";

/// Read stdin on its own thread.
///
/// Tokio's stdin reads block a runtime worker that cannot be cancelled, so
/// an interrupted prompt would hold up shutdown until the next newline. A
/// plain thread is left behind when the process exits.
pub fn stdin_lines() -> std::io::Result<Lines> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                if tx.blocking_send(line).is_err() {
                    break;
                }
            }
        })?;
    Ok(rx)
}

/// Run the conversation until it ends.
pub async fn run<W>(
    session: &JournalSession,
    mut lines: Lines,
    output: &mut W,
    cancel: CancellationToken,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    output.write_all(WELCOME.as_bytes()).await?;

    let mut state = ConversationState::Idle;

    loop {
        output.write_all(b"You: ").await?;
        output.flush().await?;

        let line = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            line = lines.recv() => line.transpose()?,
        };
        let Some(line) = line else {
            tracing::debug!("input closed");
            output.write_all(b"\n").await?;
            break;
        };

        let text = line.trim();
        if text.is_empty() {
            continue;
        }

        match session.handle_with_cancel(&state, text, &cancel).await {
            Ok(turn) => match turn.next {
                Next::End => {
                    output.write_all(format!("{}\n", turn.reply).as_bytes()).await?;
                    break;
                }
                Next::Continue(next) => {
                    output
                        .write_all(format!("Bot: {}\n\n", turn.reply).as_bytes())
                        .await?;
                    state = next;
                }
            },
            Err(SessionError::Cancelled) => {
                output.write_all(b"\n").await?;
                break;
            }
            Err(e) => {
                tracing::warn!(error = %e, "turn failed");
                output
                    .write_all(format!("Bot: {}\n\n", error_reply(&e)).as_bytes())
                    .await?;
            }
        }
    }

    output.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use journal_core::testing::{MockCompletion, StaticRetriever};
    use journal_core::JournalStore;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn session(dir: &TempDir, mock: Arc<MockCompletion>) -> JournalSession {
        JournalSession::new(
            mock,
            Arc::new(StaticRetriever::default()),
            JournalStore::open(dir.path().join("journal.json")),
        )
    }

    fn lines_of(input: &str) -> Lines {
        let (tx, rx) = mpsc::channel(64);
        for line in input.lines() {
            tx.try_send(Ok(line.to_string())).unwrap();
        }
        rx
    }

    async fn transcript(session: &JournalSession, input: &str) -> String {
        let mut output = Vec::new();
        run(session, lines_of(input), &mut output, CancellationToken::new())
            .await
            .unwrap();
        String::from_utf8(output).unwrap()
    }

    #[tokio::test]
    async fn test_detect_then_quit() {
        let dir = TempDir::new().unwrap();
        let mock = Arc::new(MockCompletion::new(vec![
            "Tone: anxious\nAffirmation: Slow down and breathe.",
        ]));
        let session = session(&dir, mock);

        let out = transcript(&session, "I feel overwhelmed today\n\nquit\nnever read\n").await;

        assert!(out.starts_with(WELCOME));
        assert!(out.contains("Bot: I sense you might be feeling *anxious*"));
        assert!(out.contains(
            "You: Session ended. Your mood has been saved to your journal. Thank you for sharing.\n"
        ));
        assert_eq!(session.store().load_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_turn_keeps_going() {
        let dir = TempDir::new().unwrap();
        let session = session(&dir, Arc::new(MockCompletion::default()));

        let out = transcript(&session, "hello\nstop\n").await;

        assert!(out.contains("Bot: Sorry, I couldn't reach the assistant right now."));
        assert!(out.contains("Session ended. Thank you for sharing."));
    }

    #[tokio::test]
    async fn test_eof_ends_without_saving() {
        let dir = TempDir::new().unwrap();
        let mock = Arc::new(MockCompletion::new(vec!["Tone: calm\nAffirmation: Lovely."]));
        let session = session(&dir, mock);

        let out = transcript(&session, "quiet morning").await;

        assert!(out.contains("*calm*"));
        assert!(!dir.path().join("journal.json").exists());
    }

    #[tokio::test]
    async fn test_cancelled_before_input() {
        let dir = TempDir::new().unwrap();
        let session = session(&dir, Arc::new(MockCompletion::default()));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut output = Vec::new();
        run(&session, lines_of("hello\n"), &mut output, cancel)
            .await
            .unwrap();

        let out = String::from_utf8(output).unwrap();
        assert!(!out.contains("Bot:"));
    }

    #[tokio::test]
    async fn test_interrupt_while_waiting_for_input() {
        let dir = TempDir::new().unwrap();
        let session = session(&dir, Arc::new(MockCompletion::default()));
        let (_tx, rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();

        let interrupt = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            interrupt.cancel();
        });

        let mut output = Vec::new();
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            run(&session, rx, &mut output, cancel),
        )
        .await
        .expect("loop should stop on interrupt while input stays open")
        .unwrap();

        assert!(String::from_utf8(output).unwrap().ends_with("You: \n"));
    }

    #[tokio::test]
    async fn test_read_error_is_returned() {
        let dir = TempDir::new().unwrap();
        let session = session(&dir, Arc::new(MockCompletion::default()));
        let (tx, rx) = mpsc::channel(1);
        tx.try_send(Err(std::io::Error::other("broken pipe"))).unwrap();

        let mut output = Vec::new();
        let err = run(&session, rx, &mut output, CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "broken pipe");
    }
}
