//! promptline: run commands on remote shells by watching for the prompt.
//!
//! Logs in over SSH, waits for the shell prompt and then drives the shell
//! one command at a time, either as a one-off `exec` or an interactive
//! line-oriented `shell`.

mod commands;
mod config;
mod known_hosts;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::error;

use crate::config::{Config, HostKeyMode, Overrides, Settings};

/// promptline: prompt-driven remote shell client
#[derive(Parser)]
#[command(name = "promptline", version, about = "Run commands on remote shells over SSH, reading output up to the prompt")]
struct Cli {
    /// SSH port
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// Shell prompt that ends each command's output
    #[arg(long, global = true)]
    prompt: Option<String>,

    /// Read timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Line ending sent after commands: lf, crlf, cr or a literal string
    #[arg(long, global = true)]
    eol: Option<String>,

    /// Host key verification mode
    #[arg(long = "host-keys", global = true, value_enum)]
    host_keys: Option<HostKeyMode>,

    /// Config file path
    #[arg(long = "config", global = true)]
    config: Option<PathBuf>,

    /// Environment variable holding the login password
    #[arg(long = "password-env", global = true)]
    password_env: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,

    /// Positional arguments: [user@]host [command...]
    ///
    /// When no subcommand is given, the first positional arg is treated as
    /// [user@]host and any remaining args form the command to execute.
    #[arg(trailing_var_arg = true)]
    args: Vec<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Run one command and print its output
    Exec {
        /// Target in [user@]host format
        target: String,
        /// Command and arguments
        #[arg(required = true, trailing_var_arg = true)]
        command: Vec<String>,
    },

    /// Open a line-oriented interactive session
    Shell {
        /// Target in [user@]host format
        target: String,
    },

    /// Manage recorded server host keys
    KnownHosts {
        #[command(subcommand)]
        action: KnownHostsAction,
    },
}

#[derive(Subcommand)]
enum KnownHostsAction {
    /// List recorded hosts with fingerprints
    List,
    /// Forget a host
    Remove {
        /// Host in host:port format
        host: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing.
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("promptline=debug,promptline_cli=debug,promptline_ssh=debug,promptline_core=debug")
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("promptline=warn,promptline_cli=warn")
            .with_target(false)
            .init();
    }

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let cfg = match Config::load(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("promptline: {e:#}");
            std::process::exit(2);
        }
    };

    let settings = Settings::resolve(
        cfg,
        Overrides {
            port: cli.port,
            prompt: cli.prompt.clone(),
            timeout_secs: cli.timeout,
            eol: cli.eol.clone(),
            host_keys: cli.host_keys,
            password_env: cli.password_env.clone(),
        },
    );

    let result = match cli.command {
        Some(Command::Exec { target, command }) => {
            commands::exec::run(&target, &command.join(" "), &settings).await
        }
        Some(Command::Shell { target }) => commands::shell::run(&target, &settings).await,
        Some(Command::KnownHosts { action }) => match action {
            KnownHostsAction::List => commands::known_hosts::run_list(),
            KnownHostsAction::Remove { host } => commands::known_hosts::run_remove(&host),
        },
        None => {
            // Positional args mode: promptline [user@]host [command...]
            if cli.args.is_empty() && settings.default_host.is_empty() {
                eprintln!("Usage: promptline [user@]host [command...]\n       promptline <subcommand>\n\nRun `promptline --help` for full usage.");
                std::process::exit(1);
            }

            let target = cli.args.first().map(String::as_str).unwrap_or_default();
            if cli.args.len() > 1 {
                let command = cli.args[1..].join(" ");
                commands::exec::run(target, &command, &settings).await
            } else {
                commands::shell::run(target, &settings).await
            }
        }
    };

    if let Err(e) = result {
        error!("{:#}", e);
        eprintln!("promptline: {e:#}");
        std::process::exit(1);
    }
}
