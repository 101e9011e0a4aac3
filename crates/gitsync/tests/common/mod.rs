use std::{
    fs,
    path::{Path, PathBuf},
    process::{Command, Output},
};

use anyhow::{Context, Result, ensure};
use tempfile::TempDir;

/// Return the path to the compiled `gitsync` binary.
pub fn gitsync_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_gitsync"))
}

/// Keep the user's git configuration out of the tests.
fn isolate(cmd: &mut Command) -> &mut Command {
    cmd.env("GIT_CONFIG_GLOBAL", "/dev/null")
        .env("GIT_CONFIG_NOSYSTEM", "1")
        .env("GIT_MERGE_AUTOEDIT", "no")
        .env_remove("GITSYNC_CONFIG")
        .env_remove("GITSYNC_LOG")
}

/// Run a git command inside `dir`, ensuring it succeeds.
pub fn git(dir: &Path, args: &[&str]) -> Result<Output> {
    let output = isolate(Command::new("git").current_dir(dir).args(args))
        .output()
        .with_context(|| format!("failed to run git {}", args.join(" ")))?;

    ensure!(
        output.status.success(),
        "git command failed: git {}\nstdout: {}\nstderr: {}",
        args.join(" "),
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );

    Ok(output)
}

/// Trimmed stdout of a successful git command.
pub fn git_stdout(dir: &Path, args: &[&str]) -> Result<String> {
    let output = git(dir, args)?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Write `contents` to `name` in `repo` and commit it.
pub fn commit_file(repo: &Path, name: &str, contents: &str, message: &str) -> Result<()> {
    fs::write(repo.join(name), contents)?;
    git(repo, &["add", name])?;
    git(repo, &["commit", "-m", message])?;
    Ok(())
}

/// A bare "remote" with two independent clones of it.
pub struct Fixture {
    /// Owns every directory below.
    _temp_dir: TempDir,
    /// The bare repository acting as `origin`.
    pub remote: PathBuf,
    /// Working copy under test.
    pub alice: PathBuf,
    /// Second working copy used to publish competing commits.
    pub bob: PathBuf,
    /// Settings file passed with `--config`.
    pub config: PathBuf,
}

impl Fixture {
    /// Create the remote, seed it with a README commit on `main`, and clone it
    /// twice.
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        let remote = root.join("remote.git");
        let remote_arg = remote.to_string_lossy().to_string();

        git(root, &["init", "--bare", "-b", "main", &remote_arg])?;

        let seed = root.join("seed");
        fs::create_dir_all(&seed)?;
        git(&seed, &["init", "-b", "main"])?;
        configure_identity(&seed)?;
        commit_file(&seed, "README.md", "# Portfolio\n", "Initial commit")?;
        git(&seed, &["remote", "add", "origin", &remote_arg])?;
        git(&seed, &["push", "-u", "origin", "main"])?;

        let alice = root.join("alice");
        let bob = root.join("bob");
        for clone in [&alice, &bob] {
            git(root, &["clone", &remote_arg, &clone.to_string_lossy()])?;
            configure_identity(clone)?;
        }

        let config = root.join("gitsync.toml");
        fs::write(&config, "backoff_ms = 0\nmax_attempts = 2\n")?;

        Ok(Self {
            _temp_dir: temp_dir,
            remote,
            alice,
            bob,
            config,
        })
    }

    /// Run `gitsync` inside `repo` with the fixture's settings.
    pub fn gitsync(&self, repo: &Path, args: &[&str]) -> Result<Output> {
        let mut cmd = Command::new(gitsync_binary());
        isolate(&mut cmd)
            .current_dir(repo)
            .arg("--no-color")
            .arg("--config")
            .arg(&self.config)
            .args(args);
        cmd.output()
            .with_context(|| format!("failed to run gitsync {}", args.join(" ")))
    }
}

/// Set a committer identity for `repo`.
fn configure_identity(repo: &Path) -> Result<()> {
    git(repo, &["config", "user.email", "test@example.com"])?;
    git(repo, &["config", "user.name", "Test User"])?;
    Ok(())
}

/// Print captured output when a command did not behave as expected.
pub fn dump(output: &Output) {
    eprintln!("status: {}", output.status);
    eprintln!("stdout: {}", String::from_utf8_lossy(&output.stdout));
    eprintln!("stderr: {}", String::from_utf8_lossy(&output.stderr));
}
