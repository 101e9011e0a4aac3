//! Read-only inspection of the working copy before anything mutates it.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{
    context::SessionContext,
    error::{Result, SyncError},
    exec::Executor,
};

/// Porcelain status codes git uses for unmerged paths.
const UNMERGED_CODES: &[&str] = &["UU", "DD", "AA", "AU", "UA", "DU", "UD"];

/// Refresh the branch and working-tree state of `ctx`.
///
/// Runs `status --porcelain` and `branch --show-current`. A branch that cannot
/// be determined (detached HEAD, failed query) is a precondition failure.
pub fn inspect(exec: &dyn Executor, ctx: &SessionContext) -> Result<SessionContext> {
    let dir = ctx.working_dir();

    let status = exec.capture(dir, &["status", "--porcelain"])?;
    if !status.success() {
        return Err(SyncError::Precondition(format!(
            "could not read the status of {}: {}",
            dir.display(),
            status.stderr().trim()
        )));
    }
    let has_local_changes = !status.trimmed().is_empty();

    let branch = exec.capture(dir, &["branch", "--show-current"])?;
    let current_branch = branch.trimmed().to_string();
    if !branch.success() || current_branch.is_empty() {
        return Err(SyncError::Precondition(
            "could not determine the current branch (is HEAD detached?)".to_string(),
        ));
    }

    debug!(branch = %current_branch, dirty = has_local_changes, "preflight complete");
    Ok(ctx.with_preflight(current_branch, has_local_changes))
}

/// Resolve the absolute git directory, failing if `ctx` is not a repository.
pub fn git_dir(exec: &dyn Executor, ctx: &SessionContext) -> Result<PathBuf> {
    let result = exec.capture(ctx.working_dir(), &["rev-parse", "--absolute-git-dir"])?;
    if !result.success() || result.trimmed().is_empty() {
        return Err(SyncError::Precondition(format!(
            "{} is not a git repository",
            ctx.working_dir().display()
        )));
    }
    Ok(PathBuf::from(result.trimmed()))
}

/// Root of the working copy containing `dir`.
pub fn toplevel(exec: &dyn Executor, dir: &Path) -> Result<PathBuf> {
    let result = exec.capture(dir, &["rev-parse", "--show-toplevel"])?;
    if !result.success() || result.trimmed().is_empty() {
        return Err(SyncError::Precondition(format!(
            "{} is not inside a git working copy",
            dir.display()
        )));
    }
    Ok(PathBuf::from(result.trimmed()))
}

/// Fail unless a remote named `remote` is configured.
pub fn require_remote(exec: &dyn Executor, ctx: &SessionContext, remote: &str) -> Result<()> {
    let result = exec.capture(ctx.working_dir(), &["remote"])?;
    if result.success() && result.stdout().lines().any(|l| l.trim() == remote) {
        return Ok(());
    }
    Err(SyncError::Precondition(format!(
        "no remote named '{remote}' is configured; add one with `git remote add {remote} <url>`"
    )))
}

/// Paths git reports as unmerged in `status --porcelain` output.
pub fn unmerged_paths(porcelain: &str) -> Vec<String> {
    porcelain
        .lines()
        .filter(|line| line.get(..2).is_some_and(|code| UNMERGED_CODES.contains(&code)))
        .filter_map(|line| line.get(3..))
        .map(|path| path.trim().to_string())
        .filter(|path| !path.is_empty())
        .collect()
}

/// One-line summaries of commits reachable from `head` but not `base`.
///
/// Returns `None` when git cannot answer, e.g. because a ref is missing.
pub fn commits_between(
    exec: &dyn Executor,
    ctx: &SessionContext,
    base: &str,
    head: &str,
) -> Result<Option<Vec<String>>> {
    let range = format!("{base}..{head}");
    let result = exec.capture(ctx.working_dir(), &["log", &range, "--oneline"])?;
    if !result.success() {
        return Ok(None);
    }
    Ok(Some(non_empty_lines(result.stdout())))
}

/// The most recent `count` commits as one-line summaries.
pub fn recent_commits(
    exec: &dyn Executor,
    ctx: &SessionContext,
    count: usize,
) -> Result<Vec<String>> {
    let limit = format!("-{count}");
    let result = exec.capture(ctx.working_dir(), &["log", "--oneline", &limit])?;
    if !result.success() {
        return Ok(Vec::new());
    }
    Ok(non_empty_lines(result.stdout()))
}

/// Whether `branch` exists on `remote`, asking the remote directly.
pub fn remote_has_branch(
    exec: &dyn Executor,
    ctx: &SessionContext,
    remote: &str,
    branch: &str,
) -> Result<bool> {
    let result = exec.capture(ctx.working_dir(), &["ls-remote", "--heads", remote, branch])?;
    Ok(result.success() && !result.trimmed().is_empty())
}

/// Trimmed, non-empty lines of `text`.
pub(crate) fn non_empty_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use anyhow::Result;
    use tempfile::TempDir;

    use super::*;
    use crate::{
        exec::{CommandResult, GitExecutor},
        testing::ScriptedGit,
    };

    fn git(dir: &Path, args: &[&str]) -> Result<()> {
        let result = GitExecutor::default().capture(dir, args)?;
        anyhow::ensure!(result.success(), "git {}: {}", args.join(" "), result.stderr());
        Ok(())
    }

    fn setup_test_repo() -> Result<(TempDir, SessionContext)> {
        let temp_dir = TempDir::new()?;
        let repo = temp_dir.path();
        git(repo, &["init", "-b", "main"])?;
        git(repo, &["config", "user.email", "test@example.com"])?;
        git(repo, &["config", "user.name", "Test User"])?;
        fs::write(repo.join("README.md"), "# Test Repo")?;
        git(repo, &["add", "README.md"])?;
        git(repo, &["commit", "-m", "Initial commit"])?;
        let ctx = SessionContext::new(repo);
        Ok((temp_dir, ctx))
    }

    #[test]
    fn clean_repository() -> Result<()> {
        let (_temp_dir, ctx) = setup_test_repo()?;
        let inspected = inspect(&GitExecutor::default(), &ctx)?;

        assert_eq!(inspected.current_branch(), "main");
        assert!(!inspected.has_local_changes());
        Ok(())
    }

    #[test]
    fn untracked_file_is_a_local_change() -> Result<()> {
        let (_temp_dir, ctx) = setup_test_repo()?;
        fs::write(ctx.working_dir().join("notes.txt"), "draft")?;

        let inspected = inspect(&GitExecutor::default(), &ctx)?;
        assert!(inspected.has_local_changes());
        Ok(())
    }

    #[test]
    fn detached_head_cannot_proceed() -> Result<()> {
        let (_temp_dir, ctx) = setup_test_repo()?;
        git(ctx.working_dir(), &["checkout", "--detach"])?;

        let err = inspect(&GitExecutor::default(), &ctx).unwrap_err();
        assert!(matches!(err, SyncError::Precondition(_)));
        Ok(())
    }

    #[test]
    fn repository_and_remote_checks() -> Result<()> {
        let (_temp_dir, ctx) = setup_test_repo()?;
        let exec = GitExecutor::default();

        assert!(git_dir(&exec, &ctx)?.ends_with(".git"));
        assert!(matches!(
            require_remote(&exec, &ctx, "origin"),
            Err(SyncError::Precondition(_))
        ));

        let nested = ctx.working_dir().join("docs");
        fs::create_dir(&nested)?;
        assert_eq!(
            fs::canonicalize(toplevel(&exec, &nested)?)?,
            fs::canonicalize(ctx.working_dir())?
        );

        let outside = TempDir::new()?;
        let err = git_dir(&exec, &SessionContext::new(outside.path())).unwrap_err();
        assert!(err.to_string().contains("is not a git repository"));
        assert!(toplevel(&exec, outside.path()).is_err());
        Ok(())
    }

    #[test]
    fn inspect_only_runs_read_only_queries() -> Result<()> {
        let git = ScriptedGit::new();
        git.on(&["status"], [CommandResult::ok(" M src/lib.rs\n")])
            .on(&["branch"], [CommandResult::ok("develop\n")]);

        let ctx = SessionContext::new("/srv/repo");
        let inspected = inspect(&git, &ctx)?;

        assert_eq!(inspected.current_branch(), "develop");
        assert!(inspected.has_local_changes());
        assert_eq!(
            git.calls(),
            vec!["status --porcelain", "branch --show-current"]
        );
        assert!(git.dirs().iter().all(|d| d == Path::new("/srv/repo")));
        Ok(())
    }

    #[test]
    fn unmerged_entries_are_parsed_from_porcelain() {
        let status = "UU src/app.rs\nM  README.md\nDD old/gone.txt\n?? scratch.txt\nAA both.txt\n";
        assert_eq!(
            unmerged_paths(status),
            vec!["src/app.rs", "old/gone.txt", "both.txt"]
        );
    }
}
