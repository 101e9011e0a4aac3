use std::{
    cell::OnceCell,
    ffi::OsString,
    path::Path,
    process::{Command, Stdio},
};

use tracing::debug;

use crate::{
    classify::{FailureClassification, classify},
    error::{Result, SyncError},
};

/// Outcome of a single external command invocation.
///
/// Produced once per invocation and never mutated afterwards. The failure
/// classification is derived lazily from stderr and cached, so it is computed
/// at most once.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Process exit status; `-1` when the process was killed by a signal.
    status: i32,
    /// Captured standard output.
    stdout: String,
    /// Captured standard error.
    stderr: String,
    /// Cached classification of `stderr`.
    classification: OnceCell<FailureClassification>,
}

impl CommandResult {
    /// Build a result from its raw parts.
    pub fn new(status: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            status,
            stdout: stdout.into(),
            stderr: stderr.into(),
            classification: OnceCell::new(),
        }
    }

    /// Convenience constructor for a successful invocation.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self::new(0, stdout, "")
    }

    /// Convenience constructor for a failed invocation.
    pub fn failed(status: i32, stderr: impl Into<String>) -> Self {
        Self::new(status, "", stderr)
    }

    /// Exit status of the process.
    pub fn status(&self) -> i32 {
        self.status
    }

    /// Whether the command exited with status 0.
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Captured standard output.
    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    /// Captured standard error.
    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    /// Trimmed standard output, the form most git queries are consumed in.
    pub fn trimmed(&self) -> &str {
        self.stdout.trim()
    }

    /// Failure classification, or `None` for a successful command.
    pub fn classification(&self) -> Option<FailureClassification> {
        if self.success() {
            return None;
        }
        Some(*self.classification.get_or_init(|| classify(&self.stderr)))
    }
}

/// How the child's output streams are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capture {
    /// Capture stdout and stderr into the [`CommandResult`].
    Output,
    /// Let the child write straight to our terminal; the result carries only
    /// the exit status.
    Inherit,
}

/// Runs version-control commands against an explicit working directory.
///
/// Implementations must never consult the process's ambient current
/// directory. A non-zero exit is reported through the returned
/// [`CommandResult`]; only a failure to launch the tool is an `Err`.
pub trait Executor {
    /// Run the tool with `args` inside `dir`.
    fn run(&self, dir: &Path, args: &[&str], capture: Capture) -> Result<CommandResult>;

    /// Run with captured output.
    fn capture(&self, dir: &Path, args: &[&str]) -> Result<CommandResult> {
        self.run(dir, args, Capture::Output)
    }
}

/// [`Executor`] backed by the `git` binary.
#[derive(Debug, Clone)]
pub struct GitExecutor {
    /// Program to launch.
    program: OsString,
}

impl Default for GitExecutor {
    fn default() -> Self {
        Self::new("git")
    }
}

impl GitExecutor {
    /// Create an executor launching `program` (normally `git`).
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Render the command line for messages and logs.
    fn command_line(&self, args: &[&str]) -> String {
        format!("{} {}", self.program.to_string_lossy(), args.join(" "))
    }
}

impl Executor for GitExecutor {
    fn run(&self, dir: &Path, args: &[&str], capture: Capture) -> Result<CommandResult> {
        let mut command = Command::new(&self.program);
        command.current_dir(dir).args(args);

        let launch_error = |source| SyncError::Launch {
            command: self.command_line(args),
            source,
        };

        let result = match capture {
            Capture::Output => {
                // Diagnostics are matched as English text.
                let output = command
                    .env("LC_ALL", "C")
                    .stdin(Stdio::null())
                    .output()
                    .map_err(launch_error)?;
                CommandResult::new(
                    output.status.code().unwrap_or(-1),
                    String::from_utf8_lossy(&output.stdout),
                    String::from_utf8_lossy(&output.stderr),
                )
            }
            Capture::Inherit => {
                let status = command
                    .stdin(Stdio::inherit())
                    .stdout(Stdio::inherit())
                    .stderr(Stdio::inherit())
                    .status()
                    .map_err(launch_error)?;
                CommandResult::new(status.code().unwrap_or(-1), "", "")
            }
        };

        debug!(
            dir = %dir.display(),
            command = %self.command_line(args),
            status = result.status(),
            "git invocation finished"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;
    use crate::classify::FailureKind;

    #[test]
    fn runs_in_the_given_directory() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let git = GitExecutor::default();
        git.capture(temp.path(), &["init", "-b", "main"])?;

        let result = git.capture(temp.path(), &["rev-parse", "--show-toplevel"])?;
        assert!(result.success());
        assert_eq!(
            fs::canonicalize(result.trimmed())?,
            fs::canonicalize(temp.path())?
        );
        Ok(())
    }

    #[test]
    fn inherited_output_carries_only_the_status() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let git = GitExecutor::default();

        let ok = git.run(temp.path(), &["--version"], Capture::Inherit)?;
        assert!(ok.success());
        assert_eq!(ok.stdout(), "");

        let failed = git.run(temp.path(), &["rev-parse", "--git-dir"], Capture::Inherit)?;
        assert!(!failed.success());
        assert_eq!(failed.stderr(), "");
        Ok(())
    }

    #[test]
    fn non_zero_exit_is_a_result_not_an_error() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let git = GitExecutor::default();

        let result = git.capture(temp.path(), &["rev-parse", "--git-dir"])?;
        assert!(!result.success());
        assert!(!result.stderr().is_empty());
        assert!(result.classification().is_some());
        Ok(())
    }

    #[test]
    fn missing_program_is_a_launch_error() {
        let temp = TempDir::new().unwrap();
        let git = GitExecutor::new("gitsync-no-such-binary");

        let err = git.capture(temp.path(), &["status"]).unwrap_err();
        assert!(matches!(err, SyncError::Launch { .. }));
        assert!(err.to_string().contains("gitsync-no-such-binary status"));
    }

    #[test]
    fn classification_is_absent_on_success_and_cached_on_failure() {
        assert!(CommandResult::ok("done").classification().is_none());

        let failed = CommandResult::failed(1, "CONFLICT (content): Merge conflict in a.txt");
        let first = failed.classification().unwrap();
        assert_eq!(first.kind, FailureKind::MergeConflict);
        assert_eq!(failed.classification(), Some(first));
    }
}
