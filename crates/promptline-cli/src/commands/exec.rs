//! `promptline exec user@host command`: one-off command execution.
//!
//! Logs in, waits for the first prompt, runs the command and prints what
//! the shell printed before the next prompt.

use std::io::Write;

use anyhow::{Context, Result};
use tracing::info;

use crate::commands::{clean_output, open_session};
use crate::config::Settings;

/// Execute a remote command and print its output.
///
/// Fails if the prompt does not come back after the command.
pub async fn run(target: &str, command: &str, settings: &Settings) -> Result<()> {
    let (mut session, _banner) = open_session(target, settings).await?;
    info!(command = %command, "exec");

    let output = match session.execute(command).await {
        Ok(output) => output,
        Err(e) => {
            session.close().await;
            return Err(e).context("failed to send command");
        }
    };
    let prompt = session.prompt().to_string();
    let completed = output.ends_with(&prompt);
    session.close().await;

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(clean_output(&output, command, &prompt).as_bytes())?;
    stdout.flush()?;

    if !completed {
        anyhow::bail!("prompt {prompt:?} not seen after '{command}'");
    }
    Ok(())
}
