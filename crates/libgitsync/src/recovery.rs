//! Human-readable recovery guide written when automation hits a conflict.
//!
//! The guide is assembled from read-only git queries and written to a fresh
//! file in the working directory. Generating it never changes repository
//! state, and an existing guide is never overwritten.

use std::{
    fs::OpenOptions,
    io::{self, Write},
    path::PathBuf,
};

use tracing::{info, warn};

use crate::{
    context::SessionContext,
    error::Result,
    exec::Executor,
    preflight::{commits_between, non_empty_lines, unmerged_paths},
    retry::Operation,
};

/// Width the narrative is wrapped to.
const WRAP_WIDTH: usize = 76;

/// Upper bound on numbered variants of a guide file name.
const MAX_NAME_VARIANTS: u32 = 100;

/// One titled block of the guide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Section title.
    pub heading: String,
    /// Section text.
    pub body: String,
}

impl Section {
    /// Build a section.
    fn new(heading: &str, body: impl Into<String>) -> Self {
        Self {
            heading: heading.to_string(),
            body: body.into(),
        }
    }
}

/// A written recovery guide.
#[derive(Debug, Clone)]
pub struct RecoveryArtifact {
    /// Where the guide was written.
    pub path: PathBuf,
    /// Guide contents, in order.
    pub sections: Vec<Section>,
}

impl RecoveryArtifact {
    /// The guide as plain text, exactly as written to disk.
    pub fn render(&self) -> String {
        render(&self.sections)
    }

    /// Find a section by heading.
    pub fn section(&self, heading: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.heading == heading)
    }
}

/// Render sections as underlined blocks separated by blank lines.
fn render(sections: &[Section]) -> String {
    let mut out = String::new();
    for section in sections {
        out.push_str(&section.heading);
        out.push('\n');
        out.push_str(&"=".repeat(section.heading.chars().count()));
        out.push('\n');
        out.push_str(section.body.trim_end());
        out.push_str("\n\n");
    }
    out
}

/// Bulleted list, or `empty` when there is nothing to list.
fn bullets(items: &[String], empty: &str) -> String {
    if items.is_empty() {
        return format!("  ({empty})");
    }
    items
        .iter()
        .map(|item| format!("  - {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Builds and writes recovery guides.
pub struct RecoveryArtifactGenerator<'a> {
    /// Runs the read-only queries.
    exec: &'a dyn Executor,
    /// Session the guide describes.
    ctx: &'a SessionContext,
    /// Remote name.
    remote: &'a str,
}

impl<'a> RecoveryArtifactGenerator<'a> {
    /// Create a generator for `ctx`.
    pub fn new(exec: &'a dyn Executor, ctx: &'a SessionContext, remote: &'a str) -> Self {
        Self { exec, ctx, remote }
    }

    /// Assemble the guide for a conflict hit during `operation` on `branch` and
    /// write it to a new file in the working directory.
    pub fn generate(&self, operation: Operation, branch: &str) -> Result<RecoveryArtifact> {
        let sections = self.sections(operation, branch)?;
        let path = self.write(&render(&sections))?;
        info!(path = %path.display(), "wrote recovery guide");
        Ok(RecoveryArtifact { path, sections })
    }

    /// Collect the guide contents.
    fn sections(&self, operation: Operation, branch: &str) -> Result<Vec<Section>> {
        let dir = self.ctx.working_dir();
        let upstream = format!("{}/{branch}", self.remote);

        let status = self.exec.capture(dir, &["status", "--porcelain"])?;
        let conflicted = unmerged_paths(status.stdout());
        let local_only = commits_between(self.exec, self.ctx, &upstream, "HEAD")?;
        let remote_only = commits_between(self.exec, self.ctx, "HEAD", &upstream)?;
        let diff = self.exec.capture(dir, &["diff", "--name-status", &upstream])?;
        let changed = if diff.success() {
            non_empty_lines(diff.stdout())
        } else {
            Vec::new()
        };

        let unavailable = format!("unavailable: {upstream} could not be read");
        Ok(vec![
            Section::new("gitsync recovery guide", self.header(operation, branch)),
            Section::new(
                "What happened",
                self.narrative(operation, branch, remote_only.as_deref()),
            ),
            Section::new(
                "Files in conflict",
                bullets(&conflicted, "git status reports no unmerged paths"),
            ),
            Section::new("How to recover", self.remediation(operation, branch)),
            Section::new(
                "Local commits not on the remote",
                match &local_only {
                    Some(commits) => bullets(commits, "none"),
                    None => format!("  ({unavailable})"),
                },
            ),
            Section::new(
                "Remote commits not in your branch",
                match &remote_only {
                    Some(commits) => bullets(commits, "none"),
                    None => format!("  ({unavailable})"),
                },
            ),
            Section::new(
                "Files that differ from the remote",
                bullets(&changed, "no differences reported"),
            ),
        ])
    }

    /// Header block identifying the session.
    fn header(&self, operation: Operation, branch: &str) -> String {
        format!(
            "Repository: {} ({})\nBranch:     {branch}\nRemote:     {}\nOperation:  {operation}\nSession:    {}",
            self.ctx.repo_label(),
            self.ctx.working_dir().display(),
            self.remote,
            self.ctx.timestamp(),
        )
    }

    /// Explanation of how the conflict came about.
    fn narrative(&self, operation: Operation, branch: &str, incoming: Option<&[String]>) -> String {
        let remote = self.remote;
        let incoming = match incoming {
            Some(commits) if !commits.is_empty() => format!("{} commit(s)", commits.len()),
            _ => "new commits".to_string(),
        };
        let text = match operation {
            Operation::Pull => format!(
                "gitsync tried to bring {incoming} from {remote}/{branch} into your local \
                 {branch} branch. Both sides have commits the other lacks, so a \
                 fast-forward was impossible. Replaying your commits on top of the remote \
                 and then merging both stopped on edits that touch the same lines. Nothing \
                 has been discarded: the working tree is paused mid-merge, waiting for you."
            ),
            Operation::Push => format!(
                "gitsync tried to push your local {branch} branch to {remote}. The remote \
                 rejected the push because it holds {incoming} you do not have. Pulling \
                 them in so the push could be retried stopped on edits that touch the same \
                 lines. Nothing was pushed and your local commits are intact."
            ),
        };
        textwrap::fill(&text, WRAP_WIDTH)
    }

    /// Ordered remediation options.
    fn remediation(&self, operation: Operation, branch: &str) -> String {
        let remote = self.remote;
        let backup = format!("gitsync-backup-{}", self.ctx.timestamp_tag());
        let mut options = vec![
            format!(
                "1. Resolve by hand (keeps everyone's work):\n   \
                 edit each file listed above and remove the conflict markers, then\n     \
                 git add <file>\n     \
                 git rebase --continue    (if a rebase is in progress)\n     \
                 git commit               (if a merge is in progress)\n   \
                 and run gitsync {operation} again."
            ),
            "2. Abort and return to where you started:\n     \
             git merge --abort        (or: git rebase --abort)"
                .to_string(),
            format!(
                "3. Accept the remote version (discards your local commits on {branch}):\n     \
                 git merge --abort\n     \
                 git checkout -b {backup}\n     \
                 git checkout {branch}\n     \
                 git reset --hard {remote}/{branch}\n   \
                 Your commits stay reachable on {backup}."
            ),
        ];
        if operation == Operation::Push {
            options.push(format!(
                "4. Overwrite the remote with your version (discards the remote commits \
                 listed below for everyone):\n     \
                 git merge --abort\n     \
                 git push --force-with-lease {remote} {branch}"
            ));
        }
        options.join("\n\n")
    }

    /// Write `contents` to a file name no earlier session has used.
    fn write(&self, contents: &str) -> Result<PathBuf> {
        let dir = self.ctx.working_dir();
        let stem = format!("gitsync-recovery-{}", self.ctx.timestamp_tag());
        for n in 1..=MAX_NAME_VARIANTS {
            let name = if n == 1 {
                format!("{stem}.txt")
            } else {
                format!("{stem}-{n}.txt")
            };
            let path = dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(contents.as_bytes())?;
                    return Ok(path);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    warn!(path = %path.display(), "recovery guide name taken");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("no free recovery guide name for {stem} in {}", dir.display()),
        )
        .into())
    }
}
