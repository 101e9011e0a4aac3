use std::{io, path::PathBuf, result::Result as StdResult};

use thiserror::Error;

/// Custom Result type for gitsync operations.
pub type Result<T> = StdResult<T, SyncError>;

/// Errors surfaced by sync and push sessions.
///
/// Every variant renders as a message a user can act on; terminal engine
/// outcomes are converted into these by
/// [`SessionReport::into_result`](crate::SessionReport::into_result).
#[derive(Error, Debug)]
pub enum SyncError {
    /// The external tool could not be started at all.
    #[error("Failed to launch `{command}`: {source}")]
    Launch {
        /// The command line that could not be launched.
        command: String,
        /// The underlying launch failure.
        #[source]
        source: io::Error,
    },

    /// A precondition failed before any mutating command ran.
    #[error("Cannot sync: {0}")]
    Precondition(String),

    /// Another session holds the lock for this working copy.
    #[error("A sync session is already in progress for {repo_dir} (held by {holder})")]
    SessionInProgress {
        /// Working copy that is locked.
        repo_dir: PathBuf,
        /// Description of the lock holder.
        holder: String,
    },

    /// The user declined to continue at an interactive checkpoint.
    #[error("Operation cancelled by user")]
    UserAborted,

    /// A merge conflict needs a human; a recovery guide was written.
    #[error(
        "Merge conflict on branch '{branch}'. Follow the recovery guide at {}",
        guide.display()
    )]
    MergeConflict {
        /// Branch the conflict arose on.
        branch: String,
        /// Path of the generated recovery guide.
        guide: PathBuf,
    },

    /// The remote rejected our credentials.
    #[error("Authentication failed for branch '{branch}': {message}. Check your SSH keys or access token")]
    Auth {
        /// Branch being synchronized when authentication failed.
        branch: String,
        /// Diagnostic text reported by git.
        message: String,
    },

    /// The branch does not exist on the remote and no alternative was found.
    #[error("Branch '{branch}' was not found on the remote")]
    BranchNotFound {
        /// The missing branch.
        branch: String,
    },

    /// Every attempt on every candidate branch failed.
    #[error("Gave up after exhausting retries on: {}", branches.join(", "))]
    Exhausted {
        /// Branches tried, in order.
        branches: Vec<String>,
    },

    /// A git step that is not retried failed.
    #[error("Git error: {0}")]
    Git(String),

    /// The configuration file could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An underlying I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
