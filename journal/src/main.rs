//! Mood journaling assistant - interactive CLI.
//!
//! Reads one journal entry or question per line from stdin. Enter `quit`,
//! `exit` or `end` to finish; Ctrl+C ends the session without saving a
//! pending mood.
//!
//! Configuration comes from the environment (or a `.env` file); see
//! `journal_core::config` for the variables.

use anyhow::Context;
use journal::repl;
use journal_core::AssistantConfig;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AssistantConfig::load().context("invalid configuration")?;
    journal::init_tracing("warn");

    println!("Preparing the reference document, this can take a moment...");
    let session = journal::build_session(&config).await;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let stdin = repl::stdin_lines().context("could not read stdin")?;
    let mut stdout = tokio::io::stdout();
    repl::run(&session, stdin, &mut stdout, cancel)
        .await
        .context("terminal I/O failed")?;

    Ok(())
}
