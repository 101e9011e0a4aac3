use std::{
    fmt,
    path::{Path, PathBuf},
};

use tracing::{info, warn};

use crate::{
    classify::FailureKind,
    config::SyncConfig,
    context::{AttemptRecord, SessionContext},
    error::{Result, SyncError},
    event::{Checkpoint, SessionEvent},
    exec::Executor,
    fallback::BranchFallbackStrategy,
    lock::SessionLock,
    preflight,
    retry::{AttemptReport, Operation, Outcome, RetryOrchestrator, ThreadSleeper, Waiter},
};

/// Number of commits listed in the closing history.
const RECENT_HISTORY: usize = 5;

/// How a whole session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Nothing needed to be pulled or pushed.
    UpToDate,
    /// The operation ran and ended with this outcome.
    Finished(Outcome),
}

impl SessionOutcome {
    /// Whether the session achieved its goal.
    pub fn succeeded(self) -> bool {
        match self {
            Self::UpToDate => true,
            Self::Finished(outcome) => outcome.succeeded(),
        }
    }
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::UpToDate => "already up to date",
            Self::Finished(Outcome::Success) => "succeeded",
            Self::Finished(Outcome::AutoResolved) => "succeeded after resolving divergence",
            Self::Finished(Outcome::MergeConflict) => "stopped on a merge conflict",
            Self::Finished(Outcome::AuthError) => "stopped on an authentication failure",
            Self::Finished(Outcome::BranchNotFound) => "found no usable branch",
            Self::Finished(Outcome::Exhausted) => "ran out of attempts",
        })
    }
}

/// Everything a caller needs to report on a finished session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    /// Operation the session drove.
    pub operation: Operation,
    /// Final outcome.
    pub outcome: SessionOutcome,
    /// Branch checked out when the session started.
    pub start_branch: String,
    /// Branch the final outcome refers to.
    pub branch: String,
    /// Branches attempted, in order.
    pub tried: Vec<String>,
    /// Every attempt made, across all branches.
    pub attempts: Vec<AttemptRecord>,
    /// Notable events worth telling the user about.
    pub notes: Vec<String>,
    /// Commits that were waiting on the remote before a pull.
    pub incoming: Vec<String>,
    /// Latest commits once the session finished.
    pub recent: Vec<String>,
    /// Recovery guide written for a conflict.
    pub artifact: Option<PathBuf>,
    /// Diagnostic of the failure that ended the session.
    pub diagnostic: Option<String>,
    /// Whether local changes were stashed.
    pub stashed: bool,
    /// Message of the commit made before pushing.
    pub committed: Option<String>,
}

impl SessionReport {
    /// Empty report for `operation` on `branch`.
    fn new(operation: Operation, branch: &str) -> Self {
        Self {
            operation,
            outcome: SessionOutcome::UpToDate,
            start_branch: branch.to_string(),
            branch: branch.to_string(),
            tried: Vec::new(),
            attempts: Vec::new(),
            notes: Vec::new(),
            incoming: Vec::new(),
            recent: Vec::new(),
            artifact: None,
            diagnostic: None,
            stashed: false,
            committed: None,
        }
    }

    /// Whether the session achieved its goal.
    pub fn succeeded(&self) -> bool {
        self.outcome.succeeded()
    }

    /// Fold one branch's attempt report into the session report.
    fn absorb(&mut self, report: AttemptReport) {
        self.outcome = SessionOutcome::Finished(report.outcome);
        self.tried.push(report.branch.clone());
        self.branch = report.branch;
        self.attempts.extend(report.attempts);
        self.notes.extend(report.notes);
        if let Some(artifact) = report.artifact {
            self.artifact = Some(artifact.path);
        }
        self.diagnostic = report.diagnostic;
    }

    /// Convert a failed outcome into the matching error.
    pub fn into_result(self) -> Result<Self> {
        let outcome = match self.outcome {
            SessionOutcome::UpToDate => return Ok(self),
            SessionOutcome::Finished(outcome) if outcome.succeeded() => return Ok(self),
            SessionOutcome::Finished(outcome) => outcome,
        };
        Err(match outcome {
            Outcome::MergeConflict => SyncError::MergeConflict {
                branch: self.branch,
                guide: self.artifact.unwrap_or_default(),
            },
            Outcome::AuthError => SyncError::Auth {
                branch: self.branch,
                message: self.diagnostic.unwrap_or_default(),
            },
            Outcome::BranchNotFound => SyncError::BranchNotFound {
                branch: self.branch,
            },
            Outcome::Success | Outcome::AutoResolved | Outcome::Exhausted => SyncError::Exhausted {
                branches: self.tried,
            },
        })
    }
}

/// Shared plumbing of the pull and push drivers.
struct Driver<'a> {
    /// Runs git.
    exec: &'a dyn Executor,
    /// Session settings.
    config: &'a SyncConfig,
    /// Interactive checkpoints and progress sink.
    checkpoint: &'a dyn Checkpoint,
    /// Performs backoff delays.
    waiter: &'a dyn Waiter,
}

impl Driver<'_> {
    /// Lock the repository and run preflight.
    fn prepare(&self, repo_dir: &Path) -> Result<(SessionContext, SessionLock)> {
        let ctx = SessionContext::new(repo_dir);
        let git_dir = preflight::git_dir(self.exec, &ctx)?;
        let lock = SessionLock::acquire(&git_dir, repo_dir)?;
        preflight::require_remote(self.exec, &ctx, &self.config.remote)?;
        let ctx = preflight::inspect(self.exec, &ctx)?;
        self.checkpoint.event(&SessionEvent::Inspected {
            branch: ctx.current_branch().to_string(),
            dirty: ctx.has_local_changes(),
        });
        Ok((ctx, lock))
    }

    /// Ask `prompt`, turning a refusal into [`SyncError::UserAborted`].
    fn confirm(&self, prompt: &str, default: bool) -> Result<()> {
        if self.checkpoint.confirm(prompt, default)? {
            Ok(())
        } else {
            info!(prompt, "cancelled at checkpoint");
            Err(SyncError::UserAborted)
        }
    }

    /// Run a git step that must succeed, describing a failure with `what`.
    fn step(&self, ctx: &SessionContext, args: &[&str], what: &str) -> Result<()> {
        let result = self.exec.capture(ctx.working_dir(), args)?;
        if result.success() {
            return Ok(());
        }
        Err(SyncError::Git(format!("{what}: {}", result.stderr().trim())))
    }

    /// Fetch from the configured remote.
    fn fetch(&self, ctx: &SessionContext) -> Result<()> {
        let remote = self.config.remote.as_str();
        self.checkpoint.event(&SessionEvent::Fetching {
            remote: remote.to_string(),
        });
        let mut args = vec!["fetch", remote];
        if self.config.prune {
            args.push("--prune");
        }
        let result = self.exec.capture(ctx.working_dir(), &args)?;
        self.checkpoint.event(&SessionEvent::Fetched {
            ok: result.success(),
        });

        match result.classification() {
            None => Ok(()),
            Some(class) if class.kind == FailureKind::AuthError => Err(SyncError::Auth {
                branch: ctx.current_branch().to_string(),
                message: result.stderr().trim().to_string(),
            }),
            Some(_) => Err(SyncError::Git(format!(
                "fetch from {remote} failed: {}",
                result.stderr().trim()
            ))),
        }
    }

    /// Orchestrator for `ctx` configured from the session settings.
    fn orchestrator<'c>(&'c self, ctx: &'c SessionContext) -> RetryOrchestrator<'c> {
        RetryOrchestrator::new(self.exec, ctx, self.config.remote.as_str())
            .backoff(self.config.backoff())
            .waiter(self.waiter)
            .observer(self.checkpoint)
    }

    /// Run `operation` on the current branch, then on the alternatives if the
    /// branch is missing or its attempts ran out.
    fn run_with_fallback(
        &self,
        orchestrator: &RetryOrchestrator<'_>,
        operation: Operation,
        candidates: &[String],
        report: &mut SessionReport,
    ) -> Result<()> {
        let branch = report.start_branch.clone();
        let max_attempts = self.config.max_attempts;

        let primary = orchestrator.execute(operation, &branch, max_attempts)?;
        let outcome = primary.outcome;
        report.absorb(primary);
        if !matches!(outcome, Outcome::Exhausted | Outcome::BranchNotFound) {
            return Ok(());
        }

        let alternatives: Vec<&str> = candidates
            .iter()
            .map(String::as_str)
            .filter(|candidate| !candidate.is_empty() && *candidate != branch)
            .collect();
        if alternatives.is_empty() {
            return Ok(());
        }
        let prompt = format!(
            "Could not {operation} {branch}. Try {} instead?",
            alternatives.join(", ")
        );
        if !self.checkpoint.confirm(&prompt, true)? {
            info!(%operation, ?alternatives, "fallback declined");
            return Ok(());
        }
        info!(%operation, ?alternatives, "primary branch failed, trying alternatives");
        let fallback = BranchFallbackStrategy::new(orchestrator).try_alternatives(
            operation,
            &alternatives,
            max_attempts,
        )?;

        let all_missing = outcome == Outcome::BranchNotFound
            && fallback
                .tried
                .iter()
                .all(|r| r.outcome == Outcome::BranchNotFound);
        let chosen = fallback.chosen.clone();
        let stopped = fallback.stopped_on.is_some();
        for tried in fallback.tried {
            report.absorb(tried);
        }

        if let Some(chosen) = chosen {
            report
                .notes
                .push(format!("{branch} could not be used; used {chosen} instead"));
        } else if !stopped {
            report.branch = branch;
            report.outcome = SessionOutcome::Finished(if all_missing {
                Outcome::BranchNotFound
            } else {
                Outcome::Exhausted
            });
        }
        Ok(())
    }

    /// Object id of the newest stash entry, if there is one.
    fn stash_head(&self, ctx: &SessionContext) -> Result<Option<String>> {
        let result = self.exec.capture(
            ctx.working_dir(),
            &["rev-parse", "-q", "--verify", "refs/stash"],
        )?;
        if result.success() && !result.trimmed().is_empty() {
            Ok(Some(result.trimmed().to_string()))
        } else {
            Ok(None)
        }
    }

    /// Latest commits for the closing summary.
    fn recent(&self, ctx: &SessionContext, report: &mut SessionReport) -> Result<()> {
        report.recent = preflight::recent_commits(self.exec, ctx, RECENT_HISTORY)?;
        Ok(())
    }
}

/// Pulls remote commits into the current branch.
pub struct SyncSession<'a> {
    /// Shared plumbing.
    driver: Driver<'a>,
}

impl<'a> SyncSession<'a> {
    /// Create a session that asks `checkpoint` before doing anything drastic.
    pub fn new(
        exec: &'a dyn Executor,
        config: &'a SyncConfig,
        checkpoint: &'a dyn Checkpoint,
    ) -> Self {
        Self {
            driver: Driver {
                exec,
                config,
                checkpoint,
                waiter: &ThreadSleeper,
            },
        }
    }

    /// Use `waiter` for backoff delays.
    pub fn waiter(mut self, waiter: &'a dyn Waiter) -> Self {
        self.driver.waiter = waiter;
        self
    }

    /// Synchronize the working copy at `repo_dir` with its remote.
    pub fn run(&self, repo_dir: &Path) -> Result<SessionReport> {
        let d = &self.driver;
        let (ctx, _lock) = d.prepare(repo_dir)?;
        let mut report = SessionReport::new(Operation::Pull, ctx.current_branch());

        let mut stash = None;
        if ctx.has_local_changes() {
            if d.config.stash {
                d.confirm("You have uncommitted changes. Stash them and continue?", false)?;
                stash = self.stash(&ctx)?;
                report.stashed = stash.is_some();
            } else {
                d.confirm(
                    "You have uncommitted changes. Continue without stashing them?",
                    false,
                )?;
            }
        }

        let result = self.pull(&ctx, &mut report);

        let keep_stash = matches!(
            (&result, report.outcome),
            (Ok(()), SessionOutcome::Finished(Outcome::MergeConflict))
        );
        if let Some(entry) = &stash {
            if keep_stash {
                report.notes.push(
                    "your local changes are still stashed; \
                     run `git stash pop` once the conflict is resolved"
                        .to_string(),
                );
            } else {
                self.restore_stash(&ctx, entry, &mut report)?;
            }
        }
        result?;

        d.recent(&ctx, &mut report)?;
        info!(outcome = %report.outcome, branch = %report.branch, "sync finished");
        Ok(report)
    }

    /// Stash local changes, untracked files included.
    ///
    /// Returns the object id of the new stash entry, or `None` when git had
    /// nothing to stash.
    fn stash(&self, ctx: &SessionContext) -> Result<Option<String>> {
        let d = &self.driver;
        let before = d.stash_head(ctx)?;
        let label = format!("gitsync: auto-stash before sync {}", ctx.timestamp());
        d.step(
            ctx,
            &["stash", "push", "--include-untracked", "-m", &label],
            "could not stash local changes",
        )?;
        let after = d.stash_head(ctx)?;
        if after.is_none() || after == before {
            info!("no stash entry was created");
            return Ok(None);
        }
        d.checkpoint.event(&SessionEvent::Stashed);
        Ok(after)
    }

    /// Fetch, check for incoming commits and pull.
    fn pull(&self, ctx: &SessionContext, report: &mut SessionReport) -> Result<()> {
        let d = &self.driver;
        let remote = d.config.remote.as_str();
        let branch = ctx.current_branch();
        let upstream = format!("{remote}/{branch}");

        d.fetch(ctx)?;

        let head = d.exec.capture(ctx.working_dir(), &["rev-parse", "HEAD"])?;
        let theirs = d.exec.capture(ctx.working_dir(), &["rev-parse", &upstream])?;
        if theirs.success() {
            if head.success() && head.trimmed() == theirs.trimmed() {
                info!(%upstream, "already up to date");
                return Ok(());
            }
            let incoming =
                preflight::commits_between(d.exec, ctx, "HEAD", &upstream)?.unwrap_or_default();
            if incoming.is_empty() {
                info!(%upstream, "no incoming commits");
                return Ok(());
            }
            d.checkpoint.event(&SessionEvent::Incoming {
                commits: incoming.clone(),
            });
            d.confirm(
                &format!("Pull {} commit(s) from {upstream}?", incoming.len()),
                true,
            )?;
            report.incoming = incoming;
        } else {
            warn!(%upstream, "remote branch not found after fetch");
        }

        let orchestrator = d.orchestrator(ctx);
        d.run_with_fallback(&orchestrator, Operation::Pull, &d.config.pull_fallback, report)
    }

    /// Pop the stash entry `entry` made at the start of the session.
    ///
    /// Entries made by the user stay where they are.
    fn restore_stash(
        &self,
        ctx: &SessionContext,
        entry: &str,
        report: &mut SessionReport,
    ) -> Result<()> {
        let d = &self.driver;
        let list = d.exec.capture(ctx.working_dir(), &["stash", "list", "--format=%H"])?;
        let position = list
            .success()
            .then(|| list.stdout().lines().position(|line| line.trim() == entry))
            .flatten();
        let Some(index) = position else {
            warn!(entry, "stash entry made by this session is gone");
            d.checkpoint.event(&SessionEvent::StashRestored { ok: false });
            report.notes.push(format!(
                "could not find this session's stash entry {entry}; check `git stash list`"
            ));
            return Ok(());
        };

        let reference = format!("stash@{{{index}}}");
        let result = d.exec.capture(ctx.working_dir(), &["stash", "pop", &reference])?;
        d.checkpoint.event(&SessionEvent::StashRestored {
            ok: result.success(),
        });
        if result.success() {
            report.notes.push("restored your stashed changes".to_string());
        } else {
            warn!(stderr = result.stderr().trim(), "stash pop failed");
            report.notes.push(format!(
                "could not restore your stashed changes automatically; \
                 they are kept as {reference} in `git stash list`"
            ));
        }
        Ok(())
    }
}

/// Publishes local commits on the current branch.
pub struct PushSession<'a> {
    /// Shared plumbing.
    driver: Driver<'a>,
}

impl<'a> PushSession<'a> {
    /// Create a session that asks `checkpoint` before doing anything drastic.
    pub fn new(
        exec: &'a dyn Executor,
        config: &'a SyncConfig,
        checkpoint: &'a dyn Checkpoint,
    ) -> Self {
        Self {
            driver: Driver {
                exec,
                config,
                checkpoint,
                waiter: &ThreadSleeper,
            },
        }
    }

    /// Use `waiter` for backoff delays.
    pub fn waiter(mut self, waiter: &'a dyn Waiter) -> Self {
        self.driver.waiter = waiter;
        self
    }

    /// Push the working copy at `repo_dir`, committing local changes first
    /// with `message` (or a timestamped default).
    pub fn run(&self, repo_dir: &Path, message: Option<&str>) -> Result<SessionReport> {
        let d = &self.driver;
        let (ctx, _lock) = d.prepare(repo_dir)?;
        let mut report = SessionReport::new(Operation::Push, ctx.current_branch());
        let remote = d.config.remote.as_str();
        let branch = ctx.current_branch();

        if ctx.has_local_changes() {
            d.confirm(
                "You have uncommitted changes. Commit them all before pushing?",
                false,
            )?;
            let message = match message {
                Some(message) if !message.trim().is_empty() => message.to_string(),
                _ => format!("gitsync: update {}", ctx.timestamp()),
            };
            d.step(&ctx, &["add", "-A"], "could not stage local changes")?;
            d.step(&ctx, &["commit", "-m", &message], "could not commit local changes")?;
            d.checkpoint.event(&SessionEvent::Committed {
                message: message.clone(),
            });
            report.committed = Some(message);
        }

        d.fetch(&ctx)?;

        let published = preflight::remote_has_branch(d.exec, &ctx, remote, branch)?;
        if published {
            let range = format!("{remote}/{branch}..HEAD");
            let ahead = d
                .exec
                .capture(ctx.working_dir(), &["rev-list", "--count", &range])?;
            if ahead.success() && ahead.trimmed() == "0" {
                info!(branch, "nothing to push");
                d.recent(&ctx, &mut report)?;
                return Ok(report);
            }
        } else {
            report
                .notes
                .push(format!("{branch} is new on {remote}; its upstream will be set"));
        }

        let orchestrator = d
            .orchestrator(&ctx)
            .new_upstream((!published).then(|| branch.to_string()));
        d.run_with_fallback(&orchestrator, Operation::Push, &d.config.push_fallback, &mut report)?;

        d.recent(&ctx, &mut report)?;
        info!(outcome = %report.outcome, branch = %report.branch, "push finished");
        Ok(report)
    }
}
