#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]
//! Core library for keeping a working copy in step with its remote.
//!
//! The engine shells out to `git`, classifies failures from their diagnostic
//! text, retries within a bounded budget, integrates divergent history
//! automatically, walks a list of alternative branches when the current one
//! cannot be used, and writes a recovery guide when a conflict needs a human.
//! The CLI binary in `crates/gitsync` builds on top of this library.

/// Failure classification from diagnostic text.
mod classify;
/// File-based session settings.
mod config;
/// Per-session state and attempt records.
mod context;
/// Error type shared by the whole crate.
mod error;
/// Progress events and interactive checkpoints.
mod event;
/// Running git against an explicit working directory.
mod exec;
/// Retrying against alternative branches.
mod fallback;
/// Advisory lock held for a session's lifetime.
mod lock;
/// Read-only repository inspection.
pub mod preflight;
/// Recovery guides for conflicts.
mod recovery;
/// The bounded retry loop.
mod retry;
/// Sync and push session drivers.
mod session;
/// Test doubles for the engine.
#[cfg(test)]
mod testing;

pub use classify::{FailureClassification, FailureKind, Severity, classify};
pub use config::{CONFIG_FILE_NAME, SyncConfig};
pub use context::{AttemptRecord, SessionContext};
pub use error::{Result, SyncError};
pub use event::{AssumeYes, Checkpoint, Defaults, Observer, SessionEvent, Silent};
pub use exec::{Capture, CommandResult, Executor, GitExecutor};
pub use fallback::{BranchFallbackStrategy, FallbackReport};
pub use lock::{LOCK_FILE_NAME, SessionLock};
pub use recovery::{RecoveryArtifact, RecoveryArtifactGenerator, Section};
pub use retry::{
    AttemptReport, Backoff, DEFAULT_BACKOFF, FixedBackoff, Operation, Outcome, RetryOrchestrator,
    ThreadSleeper, Waiter,
};
pub use session::{PushSession, SessionOutcome, SessionReport, SyncSession};
