//! `promptline shell user@host`: line-oriented interactive session.
//!
//! Each stdin line is sent as a command and the output up to the next prompt
//! is printed. Ctrl-C interrupts the command in flight and keeps the session.

use std::io::Write;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use promptline_core::{ReadOutcome, Session};
use promptline_ssh::SshConnector;

use crate::commands::{clean_output, describe, open_session};
use crate::config::Settings;

/// ETX, what a terminal sends for Ctrl-C.
const INTERRUPT: &[u8] = b"\x03";

pub async fn run(target: &str, settings: &Settings) -> Result<()> {
    let (mut session, banner) = open_session(target, settings).await?;
    let result = repl(&mut session, &banner).await;
    session.close().await;
    result
}

async fn repl(session: &mut Session<SshConnector>, banner: &str) -> Result<()> {
    let mut stdout = std::io::stdout();
    write!(stdout, "{banner}")?;
    stdout.flush()?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => {
                writeln!(stdout)?;
                write!(stdout, "{}", session.prompt())?;
                stdout.flush()?;
                continue;
            }
        };
        let Some(command) = line else {
            debug!("stdin closed");
            return Ok(());
        };

        let outcome = run_command(session, &command).await?;
        let output = session.take_result();
        let prompt = session.prompt().to_string();
        write!(stdout, "{}", clean_output(&output, &command, ""))?;
        stdout.flush()?;

        match outcome {
            ReadOutcome::Found(_) | ReadOutcome::Limit(_) => {}
            ReadOutcome::Cancelled => {
                writeln!(stdout)?;
                session.reset_cancel();
                session.write(INTERRUPT).await?;
                let recovered = session.skip_to_prompt().await;
                let tail = session.take_result();
                if let Some(pos) = tail.rfind(&prompt) {
                    write!(stdout, "{}", &tail[pos..])?;
                }
                stdout.flush()?;
                if recovered == ReadOutcome::Eof {
                    anyhow::bail!("connection closed");
                }
            }
            ReadOutcome::TimedOut => {
                eprintln!(
                    "\npromptline: prompt {prompt:?} not seen within {}s",
                    session.timeout().as_secs()
                );
            }
            ReadOutcome::Eof => {
                eprintln!("\npromptline: {}", describe(outcome));
                if !session.is_online() {
                    return Ok(());
                }
            }
        }
    }
}

/// Send one command and read up to the prompt, letting Ctrl-C cancel the
/// read.
async fn run_command(session: &mut Session<SshConnector>, command: &str) -> Result<ReadOutcome> {
    let mut line = command.to_string();
    line.push_str(session.eol());
    session.write(line).await.context("failed to send command")?;

    let token = session.cancel_token();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    let prompt = session.prompt().to_string();
    let outcome = session.read_until(Some(&prompt), None).await;
    watcher.abort();
    Ok(outcome)
}
