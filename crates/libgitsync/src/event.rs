use std::{path::PathBuf, time::Duration};

use crate::{classify::FailureKind, error::Result};

/// Progress notifications emitted while a session runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Preflight finished.
    Inspected {
        /// Branch checked out.
        branch: String,
        /// Whether the working tree had uncommitted changes.
        dirty: bool,
    },
    /// Local changes were stashed.
    Stashed,
    /// Local changes were committed before a push.
    Committed {
        /// Commit message used.
        message: String,
    },
    /// A fetch started.
    Fetching {
        /// Remote being fetched.
        remote: String,
    },
    /// The fetch finished.
    Fetched {
        /// Whether it succeeded.
        ok: bool,
    },
    /// Commits available on the remote but not locally.
    Incoming {
        /// One-line commit summaries.
        commits: Vec<String>,
    },
    /// An attempt is starting.
    Attempt {
        /// Target branch.
        branch: String,
        /// 1-based attempt number.
        attempt: u32,
        /// Attempt budget for this branch.
        max_attempts: u32,
    },
    /// An attempt failed and was classified.
    AttemptFailed {
        /// Target branch.
        branch: String,
        /// 1-based attempt number.
        attempt: u32,
        /// Classified failure kind.
        kind: FailureKind,
    },
    /// Divergence detected; trying rebase then merge.
    AutoResolving {
        /// Branch being integrated.
        branch: String,
    },
    /// Waiting before the next attempt.
    BackingOff {
        /// Delay before retrying.
        delay: Duration,
    },
    /// Moving on to an alternative branch.
    TryingFallback {
        /// Candidate branch.
        branch: String,
    },
    /// A recovery guide was written.
    ArtifactWritten {
        /// Path of the guide.
        path: PathBuf,
    },
    /// An attempt to restore stashed changes finished.
    StashRestored {
        /// Whether `stash pop` succeeded.
        ok: bool,
    },
}

/// Receives progress events.
pub trait Observer {
    /// Handle one event. The default ignores it.
    fn event(&self, _event: &SessionEvent) {}
}

/// Observer that ignores everything.
pub struct Silent;

impl Observer for Silent {}

/// Interactive checkpoints where a session may be cancelled.
///
/// A negative answer ends the session before any further mutating command
/// runs.
pub trait Checkpoint: Observer {
    /// Ask the user to confirm; `default` is the answer assumed when nobody is
    /// asked.
    fn confirm(&self, prompt: &str, default: bool) -> Result<bool>;
}

/// Answers yes to every checkpoint.
pub struct AssumeYes;

impl Observer for AssumeYes {}

impl Checkpoint for AssumeYes {
    fn confirm(&self, _prompt: &str, _default: bool) -> Result<bool> {
        Ok(true)
    }
}

/// Answers every checkpoint with its default.
pub struct Defaults;

impl Observer for Defaults {}

impl Checkpoint for Defaults {
    fn confirm(&self, _prompt: &str, default: bool) -> Result<bool> {
        Ok(default)
    }
}
