//! Status line output and progress bars.
//!
//! Every user-facing line goes through [`Shell`] so commands never deal with
//! alignment or colour themselves. Diagnostics for developers go through
//! `tracing` instead.

use std::fmt::Display;
use std::io::{self, IsTerminal};
use std::sync::Mutex;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// Output verbosity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Errors and warnings only, no progress.
    Quiet,
    #[default]
    Normal,
    /// Status lines for every item, no progress bars.
    Verbose,
}

/// Status words for output lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    // green
    Finished,
    Passed,
    Installing,

    // cyan
    Configuring,
    Copying,
    Extracting,
    Compiling,
    Building,
    Running,
    Packing,
    Removing,

    Info,

    // yellow
    Skipping,
    Warning,

    // red
    Failed,
    Error,
}

impl Status {
    fn as_str(&self) -> &'static str {
        match self {
            Status::Finished => "Finished",
            Status::Passed => "Passed",
            Status::Installing => "Installing",
            Status::Configuring => "Configuring",
            Status::Copying => "Copying",
            Status::Extracting => "Extracting",
            Status::Compiling => "Compiling",
            Status::Building => "Building",
            Status::Running => "Running",
            Status::Packing => "Packing",
            Status::Removing => "Removing",
            Status::Info => "Info",
            Status::Skipping => "SKIPPING",
            Status::Warning => "Warning",
            Status::Failed => "FAILED",
            Status::Error => "error",
        }
    }

    fn color_code(&self) -> &'static str {
        match self {
            Status::Finished | Status::Passed | Status::Installing => "\x1b[1;32m",
            Status::Configuring
            | Status::Copying
            | Status::Extracting
            | Status::Compiling
            | Status::Building
            | Status::Running
            | Status::Packing
            | Status::Removing => "\x1b[1;36m",
            Status::Info => "\x1b[1;34m",
            Status::Skipping | Status::Warning => "\x1b[1;33m",
            Status::Failed | Status::Error => "\x1b[1;31m",
        }
    }

    fn always_shown(&self) -> bool {
        matches!(
            self,
            Status::Error | Status::Warning | Status::Failed | Status::Skipping
        )
    }
}

const STATUS_WIDTH: usize = 12;

#[derive(Debug)]
enum Sink {
    Stderr { use_color: bool },
    /// Lines are kept in memory; used by tests.
    Capture(Mutex<Vec<String>>),
}

/// Central shell for all CLI output.
#[derive(Debug)]
pub struct Shell {
    verbosity: Verbosity,
    sink: Sink,
}

impl Shell {
    pub fn new(verbosity: Verbosity) -> Self {
        Shell {
            verbosity,
            sink: Sink::Stderr {
                use_color: io::stderr().is_terminal(),
            },
        }
    }

    /// Create a shell from CLI flags. `--quiet` takes precedence.
    pub fn from_flags(quiet: bool, verbose: bool) -> Self {
        let verbosity = if quiet {
            Verbosity::Quiet
        } else if verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Normal
        };
        Shell::new(verbosity)
    }

    /// A shell that records lines instead of printing them.
    pub fn capture() -> Self {
        Shell {
            verbosity: Verbosity::Verbose,
            sink: Sink::Capture(Mutex::new(Vec::new())),
        }
    }

    /// Lines recorded by a capturing shell (without colour).
    pub fn captured(&self) -> Vec<String> {
        match &self.sink {
            Sink::Capture(lines) => lines.lock().map(|l| l.clone()).unwrap_or_default(),
            Sink::Stderr { .. } => Vec::new(),
        }
    }

    pub fn is_quiet(&self) -> bool {
        self.verbosity == Verbosity::Quiet
    }

    pub fn is_verbose(&self) -> bool {
        self.verbosity == Verbosity::Verbose
    }

    /// Print a status message.
    ///
    /// Format: `{status:>12} {message}`
    pub fn status(&self, status: Status, msg: impl Display) {
        if self.is_quiet() && !status.always_shown() {
            return;
        }

        match &self.sink {
            Sink::Stderr { use_color } => {
                let text = status.as_str();
                if *use_color {
                    eprintln!(
                        "{}{:>width$}\x1b[0m {}",
                        status.color_code(),
                        text,
                        msg,
                        width = STATUS_WIDTH
                    );
                } else {
                    eprintln!("{:>width$} {}", text, msg, width = STATUS_WIDTH);
                }
            }
            Sink::Capture(lines) => {
                if let Ok(mut lines) = lines.lock() {
                    lines.push(format!("{} {}", status.as_str(), msg));
                }
            }
        }
    }

    /// Status line only shown with `--verbose`.
    pub fn verbose(&self, status: Status, msg: impl Display) {
        if self.is_verbose() {
            self.status(status, msg);
        }
    }

    pub fn note(&self, msg: impl Display) {
        self.status(Status::Info, msg);
    }

    pub fn warn(&self, msg: impl Display) {
        self.status(Status::Warning, msg);
    }

    pub fn error(&self, msg: impl Display) {
        self.status(Status::Error, msg);
    }

    /// Create a progress bar for `total` work items.
    ///
    /// Quiet, verbose and capturing shells get a no-op bar.
    pub fn progress(&self, total: u64, msg: impl Display) -> Progress {
        let show = matches!(self.sink, Sink::Stderr { .. })
            && self.verbosity == Verbosity::Normal
            && total > 1
            && io::stderr().is_terminal();

        let pb = show.then(|| {
            let pb = ProgressBar::new(total);
            if let Ok(style) =
                ProgressStyle::default_bar().template("{spinner:.green} {msg} [{bar:40.cyan/blue}] {pos}/{len}")
            {
                pb.set_style(style.progress_chars("#>-"));
            }
            pb.set_message(msg.to_string());
            pb
        });

        Progress { pb }
    }
}

impl Default for Shell {
    fn default() -> Self {
        Shell::new(Verbosity::Normal)
    }
}

/// Progress bar wrapper; safe to bump from worker threads.
pub struct Progress {
    pb: Option<ProgressBar>,
}

impl Progress {
    pub fn inc(&self) {
        if let Some(pb) = &self.pb {
            pb.inc(1);
        }
    }

    pub fn finish(&self) {
        if let Some(pb) = &self.pb {
            pb.finish_and_clear();
        }
    }
}

impl Drop for Progress {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Format a duration in a human-readable way.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs < 60.0 {
        format!("{:.2}s", secs)
    } else {
        format!("{:.1}m", secs / 60.0)
    }
}
