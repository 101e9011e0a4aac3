use std::{cell::RefCell, io, result::Result as StdResult};

use anyhow::Result;
use gitsync_term::{Output, OutputError, Spinner};
use libgitsync::{Checkpoint, Observer, SessionEvent, SessionOutcome, SessionReport, SyncError};
use tracing::debug;

/// Emit an output result, converting output failures into `anyhow` errors.
pub fn emit(result: StdResult<(), OutputError>) -> Result<()> {
    result.map_err(|e| anyhow::anyhow!("Output operation failed: {e}"))
}

/// Checkpoint that renders session progress and asks the user at prompts.
///
/// With `answers` set, prompts are answered by it instead of the user.
pub struct Prompter<'a> {
    /// Where progress and prompts go.
    output: &'a dyn Output,
    /// Fixed answers, e.g. `--yes` or `--no-prompt`.
    answers: Option<&'a dyn Checkpoint>,
    /// Spinner shown while a fetch is in flight.
    spinner: RefCell<Option<Spinner>>,
}

impl<'a> Prompter<'a> {
    /// Create a prompter over `output`.
    pub fn new(output: &'a dyn Output, answers: Option<&'a dyn Checkpoint>) -> Self {
        Self {
            output,
            answers,
            spinner: RefCell::new(None),
        }
    }

    /// Show an output result, logging rather than failing on errors.
    fn show(&self, result: StdResult<(), OutputError>) {
        if let Err(e) = result {
            debug!(error = %e, "could not render progress");
        }
    }
}

impl Observer for Prompter<'_> {
    fn event(&self, event: &SessionEvent) {
        let out = self.output;
        match event {
            SessionEvent::Inspected { branch, dirty } => {
                let state = if *dirty { ", with uncommitted changes" } else { "" };
                self.show(out.message(&format!("On branch {branch}{state}")));
            }
            SessionEvent::Stashed => self.show(out.success("Stashed local changes")),
            SessionEvent::Committed { message } => {
                self.show(out.success(&format!("Committed local changes: {message}")));
            }
            SessionEvent::Fetching { remote } => {
                let spinner = out.spinner(&format!("Fetching from {remote}..."));
                *self.spinner.borrow_mut() = Some(spinner);
            }
            SessionEvent::Fetched { ok } => {
                if let Some(spinner) = self.spinner.take() {
                    if *ok {
                        self.show(spinner.finish_success("Fetched"));
                    } else {
                        self.show(spinner.finish_fail("Fetch failed"));
                    }
                }
            }
            SessionEvent::Incoming { commits } => {
                let header = format!("{} incoming commit(s):", commits.len());
                match out.section(&header) {
                    Ok(section) => {
                        for commit in commits {
                            self.show(section.message(commit));
                        }
                    }
                    Err(e) => debug!(error = %e, "could not render incoming commits"),
                }
            }
            SessionEvent::Attempt {
                branch,
                attempt,
                max_attempts,
            } => {
                self.show(out.message(&format!(
                    "Attempt {attempt}/{max_attempts} on {branch}"
                )));
            }
            SessionEvent::AttemptFailed {
                branch,
                attempt,
                kind,
            } => {
                self.show(out.warn(&format!("Attempt {attempt} on {branch} failed: {kind}")));
            }
            SessionEvent::AutoResolving { branch } => {
                self.show(out.message(&format!(
                    "Histories have diverged; integrating remote commits on {branch}"
                )));
            }
            SessionEvent::BackingOff { delay } => {
                self.show(out.message(&format!("Retrying in {:.1}s", delay.as_secs_f64())));
            }
            SessionEvent::TryingFallback { branch } => {
                self.show(out.warn(&format!("Trying fallback branch {branch}")));
            }
            SessionEvent::ArtifactWritten { path } => {
                self.show(out.warn(&format!("Recovery guide written to {}", path.display())));
            }
            SessionEvent::StashRestored { ok: true } => {
                self.show(out.success("Restored stashed changes"));
            }
            SessionEvent::StashRestored { ok: false } => {
                self.show(out.warn("Could not restore stashed changes"));
            }
        }
    }
}

impl Checkpoint for Prompter<'_> {
    fn confirm(&self, prompt: &str, default: bool) -> libgitsync::Result<bool> {
        if let Some(answers) = self.answers {
            return answers.confirm(prompt, default);
        }
        match self.output.confirm(prompt, default) {
            Ok(answer) => Ok(answer),
            Err(OutputError::Cancelled) => Ok(false),
            Err(e) => Err(SyncError::Io(io::Error::other(format!(
                "could not prompt for confirmation: {e}"
            )))),
        }
    }
}

/// Render the closing summary of a session.
pub fn render_report(output: &dyn Output, report: &SessionReport) -> Result<()> {
    for note in &report.notes {
        emit(output.message(note))?;
    }

    match report.outcome {
        SessionOutcome::UpToDate => {
            emit(output.success(&format!("{} is already up to date", report.branch)))?;
        }
        outcome if outcome.succeeded() => {
            emit(output.success(&format!(
                "{} {outcome} on {}",
                report.operation, report.branch
            )))?;
        }
        // Failures are reported by the caller from the matching error.
        _ => return Ok(()),
    }

    if !report.recent.is_empty() {
        let section = output.section("Recent commits:")?;
        for commit in &report.recent {
            emit(section.message(commit))?;
        }
    }
    Ok(())
}
