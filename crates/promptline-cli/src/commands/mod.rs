//! CLI subcommand implementations.

pub mod exec;
pub mod known_hosts;
pub mod shell;

use anyhow::{Context, Result};
use dialoguer::Password;
use tracing::{debug, info};

use promptline_core::{Logger, ReadOutcome, Session};
use promptline_ssh::{SshConnector, SshOptions};

use crate::config::{parse_target, Settings};

/// Connect, log in and read up to the first prompt.
///
/// Returns the session together with whatever the server printed before
/// the prompt (the login banner).
pub async fn open_session(
    target: &str,
    settings: &Settings,
) -> Result<(Session<SshConnector>, String)> {
    let target = if target.is_empty() { settings.default_host.as_str() } else { target };
    let (user, host) = parse_target(target, &settings.default_user)?;
    let port = settings.port;
    info!(user = %user, host = %host, port, "connecting");

    let password = read_password(&user, &host, &settings.password_env)?;

    let options = SshOptions::new(crate::known_hosts::policy(settings.host_keys)?)
        .with_logger(Logger::tracing());
    let connector = SshConnector::connect(&host, port, options)
        .await
        .with_context(|| format!("failed to connect to {host}:{port}"))?;

    let mut session = Session::with_logger(connector, settings.session.clone(), Logger::tracing())
        .context("failed to start session")?;

    if let Err(e) = session.login(&user, &password).await {
        session.close().await;
        return Err(e).with_context(|| format!("login as {user} on {host} failed"));
    }

    let outcome = session.skip_to_prompt().await;
    let banner = session.take_result();
    if !outcome.is_success() {
        let prompt = session.prompt().to_string();
        session.close().await;
        anyhow::bail!("prompt {prompt:?} not seen after login ({})", describe(outcome));
    }
    debug!(bytes = banner.len(), "reached first prompt");

    Ok((session, banner))
}

fn read_password(user: &str, host: &str, env_var: &str) -> Result<String> {
    if let Ok(password) = std::env::var(env_var) {
        debug!(var = %env_var, "password taken from environment");
        return Ok(password);
    }
    Password::new()
        .with_prompt(format!("{user}@{host}'s password"))
        .interact()
        .context("failed to read password")
}

/// Human-readable reason for a failed read.
pub fn describe(outcome: ReadOutcome) -> &'static str {
    match outcome {
        ReadOutcome::Found(_) => "prompt found",
        ReadOutcome::Limit(_) => "byte limit reached",
        ReadOutcome::TimedOut => "timed out",
        ReadOutcome::Eof => "connection closed",
        ReadOutcome::Cancelled => "interrupted",
    }
}

/// Strip the echoed command line and the trailing prompt from raw output.
pub fn clean_output<'a>(raw: &'a str, command: &str, prompt: &str) -> &'a str {
    let mut output = raw;
    if let Some(rest) = output.strip_prefix(command) {
        output = match rest.find('\n') {
            Some(pos) => &rest[pos + 1..],
            None => rest,
        };
    }
    if !prompt.is_empty() {
        output = output.strip_suffix(prompt).unwrap_or(output);
    }
    output
}
