/// `gitsync push` implementation.
pub mod push;
/// `gitsync sync` implementation.
pub mod sync;

use std::path::PathBuf;

use libgitsync::{GitExecutor, SyncConfig};

/// Everything a subcommand needs, resolved from the command line.
pub struct Invocation {
    /// Runs git.
    pub exec: GitExecutor,
    /// Root of the working copy.
    pub repo_dir: PathBuf,
    /// Effective settings.
    pub config: SyncConfig,
}
