#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]
//! Command-line interface for keeping a working copy in step with its remote
//! via the libgitsync crate.

/// Command-line definition.
mod args;
/// Subcommand implementations.
mod commands;
/// Progress rendering and prompts.
mod ui;

use std::{
    env,
    io::{self, IsTerminal, Write},
    path::PathBuf,
    process,
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::Parser;
use gitsync_term::{Output, Quiet, Terminal};
use libgitsync::{AssumeYes, Checkpoint, Defaults, GitExecutor, SyncConfig, SyncError, preflight};
use tracing_subscriber::{EnvFilter, filter::LevelFilter};

use crate::{
    args::{Cli, Commands},
    commands::Invocation,
    ui::Prompter,
};

/// Environment variable holding a log filter directive.
const LOG_ENV: &str = "GITSYNC_LOG";

/// Environment variable naming a configuration file.
const CONFIG_ENV: &str = "GITSYNC_CONFIG";

/// Expand a leading `~` in a filesystem path using the `HOME` environment variable.
fn expand_tilde(path: &str) -> PathBuf {
    if path.starts_with('~')
        && let Ok(home) = env::var("HOME")
    {
        return PathBuf::from(path.replacen('~', &home, 1));
    }
    PathBuf::from(path)
}

/// Log level selected by repeated `-v` flags.
fn level_from_verbosity(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Install the stderr log subscriber.
fn init_tracing(verbosity: u8) {
    let filter = EnvFilter::builder()
        .with_default_directive(level_from_verbosity(verbosity).into())
        .with_env_var(LOG_ENV)
        .from_env_lossy();
    if let Err(e) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init()
    {
        eprintln!("Failed to initialize logging: {e}");
    }
}

/// CLI entrypoint.
fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Determine color output preference early for error handling
    let color = if cli.color {
        true
    } else if cli.no_color {
        false
    } else {
        // Auto-detect based on terminal
        io::stdout().is_terminal()
    };

    // Create output handler for potential error messages
    let output: Arc<dyn Output> = if cli.quiet {
        Arc::new(Quiet)
    } else {
        Arc::new(Terminal::new(color))
    };

    if let Err(e) = run(cli, &output) {
        // Reset any existing colors only if color was enabled and stdout is a TTY
        if color && io::stdout().is_terminal() {
            print!("\x1b[0m");
            if let Err(flush_err) = io::stdout().flush() {
                eprintln!("Failed to flush stdout while resetting colors: {flush_err}");
            }
        }

        let shown = match e.downcast_ref::<SyncError>() {
            Some(err @ SyncError::UserAborted) => output.warn(&err.to_string()),
            _ => output.fail(&format!("{e:#}")),
        };
        if let Err(display_err) = shown {
            eprintln!("Failed to report error via output handler: {display_err:#}");
        }
        if let Err(finish_err) = output.finish() {
            eprintln!("Failed to flush output handler: {finish_err:#}");
        }
        process::exit(1);
    }
    Ok(())
}

/// Execute the selected CLI command using the provided output implementation.
fn run(cli: Cli, output: &Arc<dyn Output>) -> Result<()> {
    let exec = GitExecutor::default();

    let start_dir = match &cli.repo_dir {
        Some(dir) => expand_tilde(dir),
        None => env::current_dir().context("Failed to read the current directory")?,
    };
    let repo_dir = preflight::toplevel(&exec, &start_dir)?;

    // Configuration file (priority: CLI flag > env var > default)
    let config_path = cli
        .config
        .clone()
        .or_else(|| env::var(CONFIG_ENV).ok())
        .map(|path| expand_tilde(&path));
    let config = SyncConfig::load(&repo_dir, config_path.as_deref())?
        .with_overrides(cli.max_attempts, &cli.fallback)?;
    tracing::debug!(?config, repo = %repo_dir.display(), "configuration loaded");

    // Quiet output cannot prompt, so it falls back to defaults.
    let answers: Option<&dyn Checkpoint> = if cli.yes {
        Some(&AssumeYes)
    } else if cli.no_prompt || cli.quiet {
        Some(&Defaults)
    } else {
        None
    };
    let prompter = Prompter::new(output.as_ref(), answers);

    let invocation = Invocation {
        exec,
        repo_dir,
        config,
    };

    match cli.command {
        Commands::Sync => {
            commands::sync::sync(&invocation, output.as_ref(), &prompter)?;
        }
        Commands::Push { message } => {
            commands::push::push(&invocation, output.as_ref(), &prompter, message.as_deref())?;
        }
    }

    output.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_raises_the_default_level() {
        assert_eq!(level_from_verbosity(0), LevelFilter::WARN);
        assert_eq!(level_from_verbosity(1), LevelFilter::INFO);
        assert_eq!(level_from_verbosity(2), LevelFilter::DEBUG);
        assert_eq!(level_from_verbosity(9), LevelFilter::TRACE);
    }

    #[test]
    fn tilde_expands_to_home() {
        if let Ok(home) = env::var("HOME") {
            assert_eq!(expand_tilde("~/site"), PathBuf::from(format!("{home}/site")));
        }
        assert_eq!(expand_tilde("/srv/site"), PathBuf::from("/srv/site"));
    }
}
