use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::{
    error::{Result, SyncError},
    retry::FixedBackoff,
};

/// File name looked up in the repository root when no path is given.
pub const CONFIG_FILE_NAME: &str = ".gitsync.toml";

/// Settings for sync and push sessions.
///
/// Every key is optional in the file; missing keys take the defaults below.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Remote to fetch from and push to.
    pub remote: String,
    /// Attempts per branch before giving up on it.
    pub max_attempts: u32,
    /// Delay between attempts, in milliseconds.
    pub backoff_ms: u64,
    /// Prune deleted remote branches when fetching.
    pub prune: bool,
    /// Stash uncommitted changes around a pull.
    pub stash: bool,
    /// Alternative branches for a pull, in the order they are tried.
    pub pull_fallback: Vec<String>,
    /// Alternative branches for a push, in the order they are tried.
    pub push_fallback: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote: "origin".to_string(),
            max_attempts: 3,
            backoff_ms: 2000,
            prune: true,
            stash: true,
            pull_fallback: ["master", "develop", "staging", "dev"]
                .map(String::from)
                .to_vec(),
            push_fallback: ["main", "master"].map(String::from).to_vec(),
        }
    }
}

impl SyncConfig {
    /// Load configuration for the repository at `repo_dir`.
    ///
    /// An `explicit` path must exist. Without one, `.gitsync.toml` in
    /// `repo_dir` is read if present and defaults are used otherwise.
    pub fn load(repo_dir: &Path, explicit: Option<&Path>) -> Result<Self> {
        let (path, required) = match explicit {
            Some(path) => (path.to_path_buf(), true),
            None => (repo_dir.join(CONFIG_FILE_NAME), false),
        };

        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound && !required => {
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(SyncError::Config(format!(
                    "failed to read {}: {e}",
                    path.display()
                )));
            }
        };
        Self::parse(&contents, &path)
    }

    /// Parse and validate TOML `contents` read from `origin`.
    pub fn parse(contents: &str, origin: &Path) -> Result<Self> {
        let config: Self = toml::from_str(contents).map_err(|e| {
            SyncError::Config(format!("failed to parse {}: {e}", origin.display()))
        })?;
        config.validate()
    }

    /// Reject settings no session could run with.
    pub fn validate(self) -> Result<Self> {
        if self.max_attempts == 0 {
            return Err(SyncError::Config(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.remote.trim().is_empty() {
            return Err(SyncError::Config("remote must not be empty".to_string()));
        }
        Ok(self)
    }

    /// Apply command-line overrides.
    pub fn with_overrides(
        mut self,
        max_attempts: Option<u32>,
        fallback: &[String],
    ) -> Result<Self> {
        if let Some(max_attempts) = max_attempts {
            self.max_attempts = max_attempts;
        }
        if !fallback.is_empty() {
            self.pull_fallback = fallback.to_vec();
            self.push_fallback = fallback.to_vec();
        }
        self.validate()
    }

    /// Backoff policy described by `backoff_ms`.
    pub fn backoff(&self) -> FixedBackoff {
        FixedBackoff(Duration::from_millis(self.backoff_ms))
    }

    /// Default location of the configuration file for `repo_dir`.
    pub fn default_path(repo_dir: &Path) -> PathBuf {
        repo_dir.join(CONFIG_FILE_NAME)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn missing_default_file_means_defaults() {
        let temp = TempDir::new().unwrap();
        let config = SyncConfig::load(temp.path(), None).unwrap();
        assert_eq!(config, SyncConfig::default());
        assert_eq!(config.pull_fallback, vec!["master", "develop", "staging", "dev"]);
        assert_eq!(config.backoff().0, Duration::from_secs(2));
    }

    #[test]
    fn partial_file_overrides_only_its_keys() {
        let temp = TempDir::new().unwrap();
        fs::write(
            SyncConfig::default_path(temp.path()),
            "remote = \"upstream\"\nmax_attempts = 5\npush_fallback = [\"trunk\"]\n",
        )
        .unwrap();

        let config = SyncConfig::load(temp.path(), None).unwrap();
        assert_eq!(config.remote, "upstream");
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.push_fallback, vec!["trunk"]);
        assert!(config.prune);
        assert_eq!(config.backoff_ms, 2000);
    }

    #[test]
    fn explicit_path_must_exist() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope.toml");
        let err = SyncConfig::load(temp.path(), Some(&missing)).unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
        assert!(err.to_string().contains("nope.toml"));
    }

    #[test]
    fn unknown_keys_and_zero_attempts_are_rejected() {
        let origin = Path::new("test.toml");
        let err = SyncConfig::parse("retries = 4\n", origin).unwrap_err();
        assert!(err.to_string().contains("retries"));

        let err = SyncConfig::parse("max_attempts = 0\n", origin).unwrap_err();
        assert!(err.to_string().contains("at least 1"));
    }

    #[test]
    fn command_line_overrides() {
        let fallback = vec!["release".to_string()];
        let config = SyncConfig::default()
            .with_overrides(Some(7), &fallback)
            .unwrap();
        assert_eq!(config.max_attempts, 7);
        assert_eq!(config.pull_fallback, fallback);
        assert_eq!(config.push_fallback, fallback);

        assert!(SyncConfig::default().with_overrides(Some(0), &[]).is_err());
    }
}
