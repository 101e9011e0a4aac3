use tracing::info;

use crate::{
    error::Result,
    event::SessionEvent,
    retry::{AttemptReport, Operation, Outcome, RetryOrchestrator},
};

/// Result of walking the list of alternative branches.
#[derive(Debug, Clone)]
pub struct FallbackReport {
    /// Branch that succeeded, if any.
    pub chosen: Option<String>,
    /// Report for every branch tried, in order.
    pub tried: Vec<AttemptReport>,
    /// Outcome that stopped the walk early (conflict or credentials).
    pub stopped_on: Option<Outcome>,
}

impl FallbackReport {
    /// Whether some alternative succeeded.
    pub fn succeeded(&self) -> bool {
        self.chosen.is_some()
    }

    /// Names of the branches tried, in order.
    pub fn branches(&self) -> Vec<&str> {
        self.tried.iter().map(|r| r.branch.as_str()).collect()
    }

    /// Report for the last branch tried.
    pub fn last(&self) -> Option<&AttemptReport> {
        self.tried.last()
    }
}

/// Retries an operation against alternative branches in order.
pub struct BranchFallbackStrategy<'o, 'a> {
    /// Runs each candidate.
    orchestrator: &'o RetryOrchestrator<'a>,
}

impl<'o, 'a> BranchFallbackStrategy<'o, 'a> {
    /// Walk candidates with `orchestrator`.
    pub fn new(orchestrator: &'o RetryOrchestrator<'a>) -> Self {
        Self { orchestrator }
    }

    /// Try `operation` on each candidate until one succeeds.
    ///
    /// Duplicate names are tried once, in first-seen order. A merge conflict
    /// or rejected credentials stop the walk, since another branch cannot
    /// help. An empty candidate list yields an unsuccessful report without
    /// running anything.
    pub fn try_alternatives<S: AsRef<str>>(
        &self,
        operation: Operation,
        candidates: &[S],
        max_attempts: u32,
    ) -> Result<FallbackReport> {
        let mut report = FallbackReport {
            chosen: None,
            tried: Vec::new(),
            stopped_on: None,
        };

        let mut seen: Vec<&str> = Vec::new();
        for candidate in candidates.iter().map(AsRef::as_ref) {
            if candidate.is_empty() || seen.contains(&candidate) {
                continue;
            }
            seen.push(candidate);

            info!(%operation, branch = candidate, "trying fallback branch");
            self.orchestrator.notify(&SessionEvent::TryingFallback {
                branch: candidate.to_string(),
            });

            let attempt = self.orchestrator.execute(operation, candidate, max_attempts)?;
            let outcome = attempt.outcome;
            report.tried.push(attempt);

            if outcome.succeeded() {
                report.chosen = Some(candidate.to_string());
                break;
            }
            if outcome.stops_fallback() {
                report.stopped_on = Some(outcome);
                break;
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::{
        context::SessionContext,
        exec::CommandResult,
        testing::{Answers, RecordingWaiter, ScriptedGit},
    };

    const MISSING: &str = "fatal: couldn't find remote ref";

    fn context() -> (TempDir, SessionContext) {
        let temp = TempDir::new().unwrap();
        let ctx = SessionContext::new(temp.path()).with_preflight("feature".to_string(), false);
        (temp, ctx)
    }

    #[test]
    fn stops_at_the_first_branch_that_works() {
        let (_temp, ctx) = context();
        let git = ScriptedGit::new();
        git.on(&["pull", "--ff-only", "origin", "master"], [CommandResult::failed(1, MISSING)])
            .on(&["pull", "--ff-only", "origin", "develop"], [CommandResult::ok("")])
            .on(&["pull"], [CommandResult::failed(1, MISSING)]);
        let waiter = RecordingWaiter::default();
        let answers = Answers::always(true);
        let orchestrator = RetryOrchestrator::new(&git, &ctx, "origin")
            .waiter(&waiter)
            .observer(&answers);

        let report = BranchFallbackStrategy::new(&orchestrator)
            .try_alternatives(Operation::Pull, &["master", "develop", "staging", "dev"], 3)
            .unwrap();

        assert!(report.succeeded());
        assert_eq!(report.chosen.as_deref(), Some("develop"));
        assert_eq!(report.branches(), vec!["master", "develop"]);
        assert_eq!(git.count("pull --ff-only origin staging"), 0);
        assert!(answers.events.borrow().contains(&SessionEvent::TryingFallback {
            branch: "develop".to_string()
        }));
    }

    #[test]
    fn credentials_failure_stops_the_walk() {
        let (_temp, ctx) = context();
        let git = ScriptedGit::new();
        git.on(&["push"], [CommandResult::failed(128, "remote: Authentication failed for repo")]);
        let orchestrator = RetryOrchestrator::new(&git, &ctx, "origin");

        let report = BranchFallbackStrategy::new(&orchestrator)
            .try_alternatives(Operation::Push, &["main", "master"], 3)
            .unwrap();

        assert!(!report.succeeded());
        assert_eq!(report.stopped_on, Some(Outcome::AuthError));
        assert_eq!(report.branches(), vec!["main"]);
    }

    #[test]
    fn duplicates_and_empty_lists() {
        let (_temp, ctx) = context();
        let git = ScriptedGit::new();
        git.on(&["pull"], [CommandResult::failed(1, MISSING)]);
        let orchestrator = RetryOrchestrator::new(&git, &ctx, "origin");
        let strategy = BranchFallbackStrategy::new(&orchestrator);

        let report = strategy
            .try_alternatives(Operation::Pull, &["dev", "dev", "", "qa"], 2)
            .unwrap();
        assert_eq!(report.branches(), vec!["dev", "qa"]);
        assert_eq!(report.last().map(|r| r.outcome), Some(Outcome::BranchNotFound));
        assert!(report.stopped_on.is_none());

        let empty: &[&str] = &[];
        let report = strategy.try_alternatives(Operation::Pull, empty, 2).unwrap();
        assert!(!report.succeeded());
        assert!(report.tried.is_empty());
        assert_eq!(git.count("pull"), 2);
    }
}
