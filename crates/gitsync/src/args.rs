use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
/// Top-level CLI options for gitsync.
pub struct Cli {
    /// Override the repository directory (defaults to the current directory)
    #[arg(long, global = true, value_name = "DIR")]
    pub repo_dir: Option<String>,

    /// Read settings from this file instead of <repo>/.gitsync.toml
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<String>,

    /// Enable colored output
    #[arg(long, global = true, conflicts_with = "no_color")]
    pub color: bool,

    /// Disable colored output
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    /// Suppress all output
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Answer every prompt with its default instead of asking
    #[arg(long, global = true)]
    pub no_prompt: bool,

    /// Answer yes to every prompt
    #[arg(long, short = 'y', global = true, conflicts_with = "no_prompt")]
    pub yes: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(long, short = 'v', global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Attempts per branch before moving on
    #[arg(long, global = true, value_name = "N")]
    pub max_attempts: Option<u32>,

    /// Alternative branch to try when the current one fails (repeatable)
    #[arg(long = "fallback", global = true, value_name = "BRANCH")]
    pub fallback: Vec<String>,

    #[command(subcommand)]
    /// The primary command to execute.
    pub command: Commands,
}

#[derive(Subcommand)]
/// CLI subcommands supported by gitsync.
pub enum Commands {
    /// Fetch and pull remote commits into the current branch
    Sync,

    /// Commit local changes and push the current branch
    Push {
        /// Commit message for uncommitted changes
        message: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn push_takes_an_optional_message_and_global_flags() {
        let cli = Cli::try_parse_from([
            "gitsync",
            "push",
            "publish new projects",
            "-vv",
            "--fallback",
            "main",
            "--fallback",
            "trunk",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.fallback, vec!["main", "trunk"]);
        match cli.command {
            Commands::Push { message } => {
                assert_eq!(message.as_deref(), Some("publish new projects"));
            }
            Commands::Sync => panic!("expected push"),
        }
    }

    #[test]
    fn yes_and_no_prompt_conflict() {
        assert!(Cli::try_parse_from(["gitsync", "sync", "--yes", "--no-prompt"]).is_err());
        assert!(Cli::try_parse_from(["gitsync", "-y", "--no-prompt", "push"]).is_err());
        assert!(Cli::try_parse_from(["gitsync", "sync", "--max-attempts", "two"]).is_err());

        let cli = Cli::try_parse_from(["gitsync", "sync", "--no-prompt"]).unwrap();
        assert!(cli.no_prompt && !cli.yes);
    }

    #[test]
    fn color_flags_conflict() {
        assert!(Cli::try_parse_from(["gitsync", "sync", "--color", "--no-color"]).is_err());
        assert!(Cli::try_parse_from(["gitsync", "--no-color", "sync"]).is_ok());
    }
}
