//! In-memory doubles for driving the engine without a real repository.

use std::{
    cell::RefCell,
    collections::VecDeque,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    error::Result,
    event::{Checkpoint, Observer, SessionEvent},
    exec::{Capture, CommandResult, Executor},
    retry::Waiter,
};

/// A canned reply for every invocation starting with `prefix`.
struct Script {
    /// Leading arguments the rule applies to.
    prefix: Vec<String>,
    /// Replies in order; the last one repeats.
    replies: VecDeque<CommandResult>,
}

/// Executor that records invocations and answers from a script.
///
/// Unscripted commands succeed with empty output.
#[derive(Default)]
pub struct ScriptedGit {
    /// Scripted replies, matched first to last.
    scripts: RefCell<Vec<Script>>,
    /// Every invocation, as a space-joined argument string.
    calls: RefCell<Vec<String>>,
    /// Directory of every invocation.
    dirs: RefCell<Vec<PathBuf>>,
}

impl ScriptedGit {
    /// Empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply to commands beginning with `prefix` with `replies` in order.
    pub fn on<I>(&self, prefix: &[&str], replies: I) -> &Self
    where
        I: IntoIterator<Item = CommandResult>,
    {
        self.scripts.borrow_mut().push(Script {
            prefix: prefix.iter().map(ToString::to_string).collect(),
            replies: replies.into_iter().collect(),
        });
        self
    }

    /// All recorded invocations.
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    /// Number of invocations starting with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    /// Directories the invocations ran in.
    pub fn dirs(&self) -> Vec<PathBuf> {
        self.dirs.borrow().clone()
    }
}

impl Executor for ScriptedGit {
    fn run(&self, dir: &Path, args: &[&str], _capture: Capture) -> Result<CommandResult> {
        self.calls.borrow_mut().push(args.join(" "));
        self.dirs.borrow_mut().push(dir.to_path_buf());

        let mut scripts = self.scripts.borrow_mut();
        let script = scripts.iter_mut().find(|s| {
            s.prefix.len() <= args.len() && s.prefix.iter().zip(args).all(|(p, a)| p == a)
        });
        let reply = match script {
            Some(script) if script.replies.len() > 1 => script.replies.pop_front(),
            Some(script) => script.replies.front().cloned(),
            None => None,
        };
        Ok(reply.unwrap_or_else(|| CommandResult::ok("")))
    }
}

/// Waiter that records requested delays instead of sleeping.
#[derive(Default)]
pub struct RecordingWaiter {
    /// Delays requested so far.
    pub waits: RefCell<Vec<Duration>>,
}

impl Waiter for RecordingWaiter {
    fn wait(&self, delay: Duration) {
        self.waits.borrow_mut().push(delay);
    }
}

/// Checkpoint with fixed answers that records prompts and events.
pub struct Answers {
    /// Answer for every prompt.
    answer: bool,
    /// Prompts seen.
    pub prompts: RefCell<Vec<String>>,
    /// Events seen.
    pub events: RefCell<Vec<SessionEvent>>,
}

impl Answers {
    /// Answer every prompt with `answer`.
    pub fn always(answer: bool) -> Self {
        Self {
            answer,
            prompts: RefCell::new(Vec::new()),
            events: RefCell::new(Vec::new()),
        }
    }
}

impl Observer for Answers {
    fn event(&self, event: &SessionEvent) {
        self.events.borrow_mut().push(event.clone());
    }
}

impl Checkpoint for Answers {
    fn confirm(&self, prompt: &str, _default: bool) -> Result<bool> {
        self.prompts.borrow_mut().push(prompt.to_string());
        Ok(self.answer)
    }
}
