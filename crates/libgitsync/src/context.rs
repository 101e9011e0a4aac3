use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Local};

use crate::{classify::FailureClassification, exec::CommandResult};

/// Immutable description of one sync or push session.
///
/// Created once when the session starts and passed by reference into every
/// component. Only [`inspect`](crate::preflight::inspect) produces an updated
/// copy, filling in the branch and working-tree state.
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Working copy the session operates on.
    working_dir: PathBuf,
    /// Human-readable repository label.
    repo_label: String,
    /// When the session started.
    started_at: DateTime<Local>,
    /// Branch checked out at preflight; empty until inspected.
    current_branch: String,
    /// Whether the working tree had uncommitted changes at preflight.
    has_local_changes: bool,
}

impl SessionContext {
    /// Start a session for `working_dir` at the current time.
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self::at(working_dir, Local::now())
    }

    /// Start a session with an explicit start time.
    pub fn at(working_dir: impl Into<PathBuf>, started_at: DateTime<Local>) -> Self {
        let working_dir = working_dir.into();
        let repo_label = repo_label(&working_dir);
        Self {
            working_dir,
            repo_label,
            started_at,
            current_branch: String::new(),
            has_local_changes: false,
        }
    }

    /// Copy of this context carrying fresh preflight results.
    pub(crate) fn with_preflight(&self, current_branch: String, has_local_changes: bool) -> Self {
        Self {
            current_branch,
            has_local_changes,
            ..self.clone()
        }
    }

    /// Working copy the session operates on.
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Repository label derived from the working directory name.
    pub fn repo_label(&self) -> &str {
        &self.repo_label
    }

    /// Session start time.
    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    /// Branch checked out at preflight.
    pub fn current_branch(&self) -> &str {
        &self.current_branch
    }

    /// Whether preflight found uncommitted changes.
    pub fn has_local_changes(&self) -> bool {
        self.has_local_changes
    }

    /// Compact timestamp used in file names, e.g. `20240131-174502`.
    pub fn timestamp_tag(&self) -> String {
        self.started_at.format("%Y%m%d-%H%M%S").to_string()
    }

    /// Human-readable start time.
    pub fn timestamp(&self) -> String {
        self.started_at.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

/// Derive a label from the last normal component of `dir`.
fn repo_label(dir: &Path) -> String {
    dir.components()
        .rev()
        .find_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .unwrap_or_else(|| "repository".to_string())
}

/// One iteration of the retry loop, kept for reporting.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    /// 1-based attempt number within its branch.
    pub attempt: u32,
    /// Branch the attempt targeted.
    pub branch: String,
    /// Result of the primary command.
    pub result: CommandResult,
    /// Classification of a failed attempt.
    pub classification: Option<FailureClassification>,
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn label_and_timestamps() {
        let started = Local.with_ymd_and_hms(2024, 1, 31, 17, 45, 2).unwrap();
        let ctx = SessionContext::at("/work/portfolio/", started);

        assert_eq!(ctx.repo_label(), "portfolio");
        assert_eq!(ctx.timestamp_tag(), "20240131-174502");
        assert_eq!(ctx.timestamp(), "2024-01-31 17:45:02");
        assert_eq!(ctx.current_branch(), "");
    }

    #[test]
    fn preflight_copy_leaves_original_untouched() {
        let ctx = SessionContext::new("/tmp/repo");
        let inspected = ctx.with_preflight("main".to_string(), true);

        assert_eq!(inspected.current_branch(), "main");
        assert!(inspected.has_local_changes());
        assert_eq!(ctx.current_branch(), "");
        assert_eq!(inspected.started_at(), ctx.started_at());
    }

    #[test]
    fn root_path_gets_a_fallback_label() {
        assert_eq!(SessionContext::new("/").repo_label(), "repository");
    }
}
