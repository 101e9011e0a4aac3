//! Bounded retry loop for a single pull or push against one branch.
//!
//! Each failed attempt is classified and the kind decides what happens next:
//! divergence is integrated automatically, conflicts and credential problems
//! end the loop at once, a missing branch is handed back so the caller can try
//! another one, and anything unrecognised is retried after a backoff delay.

use std::{fmt, thread, time::Duration};

use tracing::{info, warn};

use crate::{
    classify::FailureKind,
    context::{AttemptRecord, SessionContext},
    error::Result,
    event::{Observer, SessionEvent, Silent},
    exec::{CommandResult, Executor},
    recovery::{RecoveryArtifact, RecoveryArtifactGenerator},
};

/// Default delay between attempts.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(2);

/// The operation being driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Bring remote commits into the local branch.
    Pull,
    /// Publish local commits to the remote.
    Push,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pull => "pull",
            Self::Push => "push",
        })
    }
}

/// How an orchestrated operation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The operation succeeded.
    Success,
    /// Divergence was integrated automatically.
    AutoResolved,
    /// Conflicting edits need a human; a recovery guide was written.
    MergeConflict,
    /// Credentials were rejected.
    AuthError,
    /// The branch does not exist.
    BranchNotFound,
    /// The attempt budget ran out.
    Exhausted,
}

impl Outcome {
    /// Whether the operation achieved its goal.
    pub fn succeeded(self) -> bool {
        matches!(self, Self::Success | Self::AutoResolved)
    }

    /// Whether trying a different branch cannot change the result.
    pub fn stops_fallback(self) -> bool {
        matches!(self, Self::MergeConflict | Self::AuthError)
    }
}

/// Delay to wait after a failed attempt, as a function of the attempt number.
pub trait Backoff {
    /// Delay after the 1-based `attempt` failed.
    fn delay(&self, attempt: u32) -> Duration;
}

/// The same delay after every attempt.
#[derive(Debug, Clone, Copy)]
pub struct FixedBackoff(pub Duration);

impl Backoff for FixedBackoff {
    fn delay(&self, _attempt: u32) -> Duration {
        self.0
    }
}

impl<F> Backoff for F
where
    F: Fn(u32) -> Duration,
{
    fn delay(&self, attempt: u32) -> Duration {
        self(attempt)
    }
}

/// Blocks the session for a backoff delay.
pub trait Waiter {
    /// Block for `delay`.
    fn wait(&self, delay: Duration);
}

/// Waiter that sleeps the current thread.
pub struct ThreadSleeper;

impl Waiter for ThreadSleeper {
    fn wait(&self, delay: Duration) {
        thread::sleep(delay);
    }
}

/// Everything that happened while driving one branch.
#[derive(Debug, Clone)]
pub struct AttemptReport {
    /// Operation driven.
    pub operation: Operation,
    /// Branch targeted.
    pub branch: String,
    /// Final outcome.
    pub outcome: Outcome,
    /// One record per attempt of the primary command.
    pub attempts: Vec<AttemptRecord>,
    /// Notable events, e.g. an automatic divergence resolution.
    pub notes: Vec<String>,
    /// Recovery guide written for a conflict.
    pub artifact: Option<RecoveryArtifact>,
    /// Diagnostic text of the failure that ended the loop.
    pub diagnostic: Option<String>,
}

impl AttemptReport {
    /// Whether the operation achieved its goal.
    pub fn succeeded(&self) -> bool {
        self.outcome.succeeded()
    }
}

/// Result of the divergence auto-resolve sub-procedure.
enum Resolution {
    /// Remote commits were integrated.
    Integrated,
    /// Integration stopped on a conflict.
    Conflict,
    /// The remote rejected our credentials.
    Auth(String),
}

/// Drives the bounded retry loop for one operation on one branch.
pub struct RetryOrchestrator<'a> {
    /// Runs git.
    exec: &'a dyn Executor,
    /// Session the loop belongs to.
    ctx: &'a SessionContext,
    /// Remote name, e.g. `origin`.
    remote: String,
    /// Delay policy between attempts.
    backoff: Box<dyn Backoff + 'a>,
    /// Performs the delays.
    waiter: &'a dyn Waiter,
    /// Progress sink.
    observer: &'a dyn Observer,
    /// Branch whose push must create the upstream (`push -u`).
    new_upstream: Option<String>,
}

impl<'a> RetryOrchestrator<'a> {
    /// Create an orchestrator with the default backoff and a sleeping waiter.
    pub fn new(exec: &'a dyn Executor, ctx: &'a SessionContext, remote: impl Into<String>) -> Self {
        Self {
            exec,
            ctx,
            remote: remote.into(),
            backoff: Box::new(FixedBackoff(DEFAULT_BACKOFF)),
            waiter: &ThreadSleeper,
            observer: &Silent,
            new_upstream: None,
        }
    }

    /// Use `backoff` to compute delays between attempts.
    pub fn backoff(mut self, backoff: impl Backoff + 'a) -> Self {
        self.backoff = Box::new(backoff);
        self
    }

    /// Use `waiter` to perform delays.
    pub fn waiter(mut self, waiter: &'a dyn Waiter) -> Self {
        self.waiter = waiter;
        self
    }

    /// Report progress to `observer`.
    pub fn observer(mut self, observer: &'a dyn Observer) -> Self {
        self.observer = observer;
        self
    }

    /// Create the upstream when pushing `branch` (`push -u`).
    pub fn new_upstream(mut self, branch: Option<String>) -> Self {
        self.new_upstream = branch;
        self
    }

    /// Forward `event` to the observer.
    pub(crate) fn notify(&self, event: &SessionEvent) {
        self.observer.event(event);
    }

    /// Run `operation` against `branch` for at most `max_attempts` attempts.
    pub fn execute(
        &self,
        operation: Operation,
        branch: &str,
        max_attempts: u32,
    ) -> Result<AttemptReport> {
        let mut report = AttemptReport {
            operation,
            branch: branch.to_string(),
            outcome: Outcome::Exhausted,
            attempts: Vec::new(),
            notes: Vec::new(),
            artifact: None,
            diagnostic: None,
        };

        let mut attempt = 1;
        while attempt <= max_attempts {
            info!(%operation, branch, attempt, max_attempts, "starting attempt");
            self.observer.event(&SessionEvent::Attempt {
                branch: branch.to_string(),
                attempt,
                max_attempts,
            });

            let result = self.run_primary(operation, branch)?;
            let classification = result.classification();
            report.attempts.push(AttemptRecord {
                attempt,
                branch: branch.to_string(),
                result: result.clone(),
                classification,
            });

            let Some(classification) = classification else {
                info!(%operation, branch, attempt, "attempt succeeded");
                report.outcome = Outcome::Success;
                return Ok(report);
            };

            warn!(
                %operation,
                branch,
                attempt,
                kind = %classification.kind,
                stderr = result.stderr().trim(),
                "attempt failed"
            );
            self.observer.event(&SessionEvent::AttemptFailed {
                branch: branch.to_string(),
                attempt,
                kind: classification.kind,
            });
            report.diagnostic = Some(result.stderr().trim().to_string());

            match classification.kind {
                FailureKind::Diverged => match self.auto_resolve(branch, &mut report)? {
                    Resolution::Integrated if operation == Operation::Pull => {
                        report.outcome = Outcome::AutoResolved;
                        return Ok(report);
                    }
                    Resolution::Integrated => {
                        report.notes.push(format!(
                            "divergence from {}/{branch} was auto-resolved before pushing again",
                            self.remote
                        ));
                    }
                    Resolution::Conflict => return self.conflict(operation, branch, report),
                    Resolution::Auth(diagnostic) => {
                        report.outcome = Outcome::AuthError;
                        report.diagnostic = Some(diagnostic);
                        return Ok(report);
                    }
                },
                FailureKind::MergeConflict => return self.conflict(operation, branch, report),
                FailureKind::AuthError => {
                    report.outcome = Outcome::AuthError;
                    return Ok(report);
                }
                FailureKind::BranchNotFound => {
                    report.outcome = Outcome::BranchNotFound;
                    return Ok(report);
                }
                FailureKind::Unknown => {
                    if attempt < max_attempts {
                        let delay = self.backoff.delay(attempt);
                        warn!(?delay, "backing off before retrying");
                        self.observer.event(&SessionEvent::BackingOff { delay });
                        self.waiter.wait(delay);
                    }
                }
            }
            attempt += 1;
        }

        info!(%operation, branch, max_attempts, "attempts exhausted");
        report.outcome = Outcome::Exhausted;
        Ok(report)
    }

    /// Run the primary command of `operation` against `branch`.
    fn run_primary(&self, operation: Operation, branch: &str) -> Result<CommandResult> {
        let dir = self.ctx.working_dir();
        let remote = self.remote.as_str();
        match operation {
            Operation::Pull => self.exec.capture(dir, &["pull", "--ff-only", remote, branch]),
            Operation::Push if self.new_upstream.as_deref() == Some(branch) => {
                self.exec.capture(dir, &["push", "-u", remote, branch])
            }
            Operation::Push => self.exec.capture(dir, &["push", remote, branch]),
        }
    }

    /// Integrate remote commits: fetch, rebase-pull, and on failure abort the
    /// rebase and fall back to a merge-pull.
    fn auto_resolve(&self, branch: &str, report: &mut AttemptReport) -> Result<Resolution> {
        let dir = self.ctx.working_dir();
        let remote = self.remote.as_str();
        info!(branch, "divergence detected, integrating remote commits");
        self.observer.event(&SessionEvent::AutoResolving {
            branch: branch.to_string(),
        });

        let fetch = self.exec.capture(dir, &["fetch", remote])?;
        if let Some(class) = fetch.classification() {
            if class.kind == FailureKind::AuthError {
                return Ok(Resolution::Auth(fetch.stderr().trim().to_string()));
            }
            warn!(stderr = fetch.stderr().trim(), "fetch before auto-resolve failed");
        }

        let rebase = self.exec.capture(dir, &["pull", "--rebase", remote, branch])?;
        let Some(class) = rebase.classification() else {
            report
                .notes
                .push(format!("rebased local commits onto {remote}/{branch}"));
            return Ok(Resolution::Integrated);
        };
        if class.kind == FailureKind::AuthError {
            return Ok(Resolution::Auth(rebase.stderr().trim().to_string()));
        }

        warn!(kind = %class.kind, "rebase failed, falling back to merge");
        let abort = self.exec.capture(dir, &["rebase", "--abort"])?;
        if !abort.success() {
            // Nothing to abort when the rebase never started.
            info!(stderr = abort.stderr().trim(), "rebase --abort reported failure");
        }

        let merge = self.exec.capture(dir, &["pull", "--no-rebase", remote, branch])?;
        match merge.classification() {
            None => {
                report.notes.push(format!(
                    "rebase onto {remote}/{branch} failed; merged remote commits instead"
                ));
                Ok(Resolution::Integrated)
            }
            Some(class) if class.kind == FailureKind::AuthError => {
                Ok(Resolution::Auth(merge.stderr().trim().to_string()))
            }
            Some(class) => {
                warn!(kind = %class.kind, "merge fallback failed");
                report.diagnostic = Some(merge.stderr().trim().to_string());
                Ok(Resolution::Conflict)
            }
        }
    }

    /// Write the recovery guide and end the loop with a conflict.
    fn conflict(
        &self,
        operation: Operation,
        branch: &str,
        mut report: AttemptReport,
    ) -> Result<AttemptReport> {
        let artifact = RecoveryArtifactGenerator::new(self.exec, self.ctx, &self.remote)
            .generate(operation, branch)?;
        self.observer.event(&SessionEvent::ArtifactWritten {
            path: artifact.path.clone(),
        });
        report.outcome = Outcome::MergeConflict;
        report.artifact = Some(artifact);
        Ok(report)
    }
}
