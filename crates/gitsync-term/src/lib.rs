#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]
//! Terminal output for gitsync frontends.
//!
//! This crate provides an [`Output`] trait that abstracts over how user
//! messages, confirmations and progress spinners are rendered, so the engine
//! in `libgitsync` stays UI-agnostic. Implementations include:
//!
//! - [`Terminal`]: a color-capable terminal renderer for production use
//! - [`Quiet`]: a silent implementation that suppresses output

use std::{
    io::{self, Write},
    result::Result as StdResult,
    time::Duration,
};

use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};
use thiserror::Error;

/// Indentation level (in spaces) used for nested output sections.
const INDENT: usize = 4;

/// Column messages are wrapped at.
const WRAP_WIDTH: usize = 100;

/// Narrowest column budget a deeply nested message is wrapped to.
const MIN_WRAP: usize = 40;

/// How often a spinner advances.
const SPINNER_TICK: Duration = Duration::from_millis(90);

/// Errors produced by [`Output`] implementations when interacting with the user
/// or the terminal.
#[derive(Debug, Error)]
pub enum OutputError {
    /// The requested operation is not supported by this output backend.
    #[error("{0}")]
    Unsupported(&'static str),

    /// A terminal/TTY related failure occurred.
    #[error("Terminal error: {0}")]
    Terminal(String),

    /// Underlying I/O error while writing/reading to the terminal.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The user cancelled an interactive prompt.
    #[error("Prompt cancelled")]
    Cancelled,
}

/// Convenience alias for output-related fallible operations.
pub type Result<T> = StdResult<T, OutputError>;

/// Abstraction over how user-facing messages and prompts are produced.
pub trait Output: Send + Sync {
    /// Print an informational message.
    fn message(&self, msg: &str) -> Result<()>;
    /// Print a success message.
    fn success(&self, msg: &str) -> Result<()>;
    /// Print a warning message.
    fn warn(&self, msg: &str) -> Result<()>;
    /// Print an error/failure message.
    fn fail(&self, msg: &str) -> Result<()>;
    /// Ask the user a yes/no question; `default` is preselected.
    fn confirm(&self, prompt: &str, default: bool) -> Result<bool>;
    /// Flush any buffered output.
    fn finish(&self) -> Result<()>;
    /// Print `header` and return an output that indents subsequent messages.
    fn section(&self, header: &str) -> Result<Box<dyn Output>>;
    /// Start a spinner showing `msg` until it is finished.
    fn spinner(&self, msg: &str) -> Spinner;
}

/// Output implementation that suppresses all messages and rejects interactive
/// prompts.
pub struct Quiet;

impl Output for Quiet {
    fn message(&self, _msg: &str) -> Result<()> {
        Ok(())
    }

    fn success(&self, _msg: &str) -> Result<()> {
        Ok(())
    }

    fn warn(&self, _msg: &str) -> Result<()> {
        Ok(())
    }

    fn fail(&self, _msg: &str) -> Result<()> {
        Ok(())
    }

    fn confirm(&self, _prompt: &str, _default: bool) -> Result<bool> {
        Err(OutputError::Unsupported(
            "Cannot prompt for confirmation in quiet mode",
        ))
    }

    fn finish(&self) -> Result<()> {
        Ok(())
    }

    fn section(&self, _header: &str) -> Result<Box<dyn Output>> {
        Ok(Box::new(Self))
    }

    fn spinner(&self, _msg: &str) -> Spinner {
        Spinner::hidden()
    }
}

/// Color-capable terminal renderer for user messages and prompts.
#[derive(Debug, Clone)]
pub struct Terminal {
    /// Whether to emit ANSI color sequences when writing to stdout.
    color_choice: ColorChoice,
    /// Current indentation depth in spaces.
    indent: usize,
}

impl Terminal {
    /// Create a new terminal output.
    ///
    /// - `color`: when `true`, always render colored output; when `false`,
    ///   disable ANSI colors.
    pub fn new(color: bool) -> Self {
        let color_choice = if color {
            ColorChoice::Always
        } else {
            ColorChoice::Never
        };
        Self {
            color_choice,
            indent: 0,
        }
    }

    /// Write `msg` using `color` while honoring the current indentation level.
    fn write_colored(&self, msg: &str, color: Color) -> Result<()> {
        let mut stdout = StandardStream::stdout(self.color_choice);
        stdout.set_color(ColorSpec::new().set_fg(Some(color)))?;
        writeln!(stdout, "{}", wrap_message(msg, self.indent, WRAP_WIDTH))?;
        stdout.reset()?;
        stdout.flush()?;
        Ok(())
    }
}

/// Wrap `msg` to `width` columns, indenting every line by `indent` spaces.
///
/// Existing line breaks are kept.
fn wrap_message(msg: &str, indent: usize, width: usize) -> String {
    let pad = " ".repeat(indent);
    let options = textwrap::Options::new(width.saturating_sub(indent).max(MIN_WRAP) + indent)
        .initial_indent(&pad)
        .subsequent_indent(&pad);
    msg.lines()
        .map(|line| textwrap::fill(line, &options))
        .collect::<Vec<_>>()
        .join("\n")
}

impl Output for Terminal {
    fn message(&self, msg: &str) -> Result<()> {
        self.write_colored(msg, Color::Cyan)
    }

    fn success(&self, msg: &str) -> Result<()> {
        self.write_colored(msg, Color::Green)
    }

    fn warn(&self, msg: &str) -> Result<()> {
        self.write_colored(msg, Color::Rgb(255, 165, 0)) // Orange
    }

    fn fail(&self, msg: &str) -> Result<()> {
        self.write_colored(msg, Color::Red)
    }

    fn confirm(&self, prompt: &str, default: bool) -> Result<bool> {
        let prompt = format!("{}{prompt}", " ".repeat(self.indent));
        let answer = Confirm::new()
            .with_prompt(prompt)
            .default(default)
            .interact_opt()
            .map_err(|e| OutputError::Terminal(e.to_string()))?;
        answer.ok_or(OutputError::Cancelled)
    }

    fn finish(&self) -> Result<()> {
        io::stdout().flush()?;
        Ok(())
    }

    fn section(&self, header: &str) -> Result<Box<dyn Output>> {
        self.message(header)?;
        Ok(Box::new(Self {
            color_choice: self.color_choice,
            indent: self.indent + INDENT,
        }))
    }

    fn spinner(&self, msg: &str) -> Spinner {
        Spinner::start(msg, self.clone())
    }
}

/// A progress spinner shown while a long-running step is in flight.
///
/// Dropping an unfinished spinner clears it.
pub struct Spinner {
    /// Animated bar, absent for hidden spinners.
    bar: Option<ProgressBar>,
    /// Where closing messages go.
    terminal: Option<Terminal>,
}

impl Spinner {
    /// Start an animated spinner that reports its outcome through `terminal`.
    fn start(msg: &str, terminal: Terminal) -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(ProgressStyle::default_spinner());
        bar.set_message(format!("{}{msg}", " ".repeat(terminal.indent)));
        bar.enable_steady_tick(SPINNER_TICK);
        Self {
            bar: Some(bar),
            terminal: Some(terminal),
        }
    }

    /// A spinner that draws nothing.
    pub fn hidden() -> Self {
        Self {
            bar: None,
            terminal: None,
        }
    }

    /// Stop the spinner and print `msg` as a success.
    pub fn finish_success(mut self, msg: &str) -> Result<()> {
        self.clear();
        match &self.terminal {
            Some(terminal) => terminal.success(msg),
            None => Ok(()),
        }
    }

    /// Stop the spinner and print `msg` as a failure.
    pub fn finish_fail(mut self, msg: &str) -> Result<()> {
        self.clear();
        match &self.terminal {
            Some(terminal) => terminal.fail(msg),
            None => Ok(()),
        }
    }

    /// Remove the animation from the screen.
    fn clear(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        self.clear();
    }
}
