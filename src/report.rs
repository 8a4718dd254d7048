// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Diagnostics and progress reporting.
//!
//! Fatal conditions travel up the call chain as [`Error`] values; the reporter is notified just
//! before they leave the library. Corrupt-data conditions are [`Warning`]s: they are counted, handed
//! to the reporter, and processing continues unless the reporter asks for escalation.

use thiserror::Error;

use crate::{
    error::{Error, MessageCode, Result},
    util::tracing_wrappers::*,
};

/// Recoverable corrupt-data conditions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    #[error("{count} extraneous bytes before marker 0x{marker:02x}")]
    ExtraneousBytes { count: usize, marker: u8 },
    #[error("Found marker 0x{found:02x} instead of RST{expected}, trying to resync")]
    MustResync { found: u8, expected: u8 },
    #[error("Corrupt entropy-coded data: hit a marker inside a segment")]
    HitMarker,
    #[error("Premature end of data")]
    PrematureEnd,
    #[error("Inconsistent progression sequence for component {component} coefficient {coefficient}")]
    BogusProgression { component: usize, coefficient: usize },
    #[error("Invalid SOS parameters for sequential JPEG")]
    NotSequential,
}

impl Warning {
    pub fn code(&self) -> MessageCode {
        match self {
            Warning::ExtraneousBytes { .. } => MessageCode::ExtraneousBytes,
            Warning::MustResync { .. } => MessageCode::MustResync,
            Warning::HitMarker => MessageCode::HitMarker,
            Warning::PrematureEnd => MessageCode::PrematureEnd,
            Warning::BogusProgression { .. } => MessageCode::BogusProgression,
            Warning::NotSequential => MessageCode::NotSequential,
        }
    }
}

/// Something the reporter is asked to format.
#[derive(Debug, Clone, Copy)]
pub enum Report<'a> {
    Fatal(&'a Error),
    Warning(&'a Warning),
}

impl Report<'_> {
    pub fn code(&self) -> MessageCode {
        match self {
            Report::Fatal(e) => e.code(),
            Report::Warning(w) => w.code(),
        }
    }
}

/// What to do after a corrupt-data warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningAction {
    Continue,
    Escalate,
}

/// Replaceable sink for diagnostics.
pub trait ErrorReporter {
    /// Called once for every fatal error, right before it is returned to the caller. The
    /// operation is unwound regardless of what this does.
    fn fatal(&mut self, error: &Error);

    /// Called for every corrupt-data warning. The warning has already been counted.
    fn warning(&mut self, warning: &Warning) -> WarningAction;

    /// Renders a message. Override to localize or decorate messages.
    fn format_message(&self, report: &Report<'_>) -> String {
        match report {
            Report::Fatal(e) => e.to_string(),
            Report::Warning(w) => w.to_string(),
        }
    }
}

/// Logs through `tracing` and keeps going on warnings, unless built with `strict`.
#[derive(Debug, Default, Clone)]
pub struct LoggingReporter {
    escalate_warnings: bool,
}

impl LoggingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A reporter that turns every corrupt-data warning into a fatal error.
    pub fn strict() -> Self {
        Self {
            escalate_warnings: true,
        }
    }
}

impl ErrorReporter for LoggingReporter {
    fn fatal(&mut self, _error: &Error) {
        error!(code = ?_error.code(), "{}", self.format_message(&Report::Fatal(_error)));
    }

    fn warning(&mut self, _warning: &Warning) -> WarningAction {
        warn!(code = ?_warning.code(), "{}", self.format_message(&Report::Warning(_warning)));
        if self.escalate_warnings {
            WarningAction::Escalate
        } else {
            WarningAction::Continue
        }
    }
}

/// Snapshot handed to a [`ProgressMonitor`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    /// Passes completed so far.
    pub completed_passes: usize,
    /// Total number of passes expected; may grow while a multi-scan stream is read.
    pub total_passes: usize,
    /// Work units (iMCU rows) done in the current pass.
    pub pass_counter: usize,
    /// Work units in the current pass.
    pub pass_limit: usize,
}

pub trait ProgressMonitor {
    /// Purely observational.
    fn on_progress(&mut self, progress: &Progress);
}

impl<F: FnMut(&Progress)> ProgressMonitor for F {
    fn on_progress(&mut self, progress: &Progress) {
        self(progress)
    }
}

/// Per-context diagnostics state: the reporter, the warning counter and the progress monitor.
pub struct Diagnostics {
    reporter: Box<dyn ErrorReporter>,
    num_warnings: usize,
    monitor: Option<Box<dyn ProgressMonitor>>,
    progress: Progress,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new(Box::new(LoggingReporter::new()))
    }
}

impl Diagnostics {
    pub fn new(reporter: Box<dyn ErrorReporter>) -> Self {
        Self {
            reporter,
            num_warnings: 0,
            monitor: None,
            progress: Progress::default(),
        }
    }

    pub fn set_reporter(&mut self, reporter: Box<dyn ErrorReporter>) {
        self.reporter = reporter;
    }

    pub fn set_monitor(&mut self, monitor: Option<Box<dyn ProgressMonitor>>) {
        self.monitor = monitor;
    }

    pub fn reporter(&self) -> &dyn ErrorReporter {
        self.reporter.as_ref()
    }

    pub fn num_warnings(&self) -> usize {
        self.num_warnings
    }

    /// Reset at the start of every datastream.
    pub fn reset(&mut self) {
        self.num_warnings = 0;
        self.progress = Progress::default();
    }

    /// Counts and reports a corrupt-data condition.
    pub fn warn(&mut self, warning: Warning) -> Result<()> {
        self.num_warnings += 1;
        match self.reporter.warning(&warning) {
            WarningAction::Continue => Ok(()),
            WarningAction::Escalate => Err(Error::CorruptData(warning)),
        }
    }

    /// Passes `result` through, notifying the reporter if it is an error.
    pub fn check<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.reporter.fatal(e);
        }
        result
    }

    pub fn progress(&self) -> Progress {
        self.progress
    }

    pub fn set_total_passes(&mut self, total_passes: usize) {
        self.progress.total_passes = total_passes.max(self.progress.completed_passes + 1);
    }

    pub fn begin_pass(&mut self, pass_limit: usize) {
        self.progress.pass_counter = 0;
        self.progress.pass_limit = pass_limit;
        if self.progress.total_passes <= self.progress.completed_passes {
            self.progress.total_passes = self.progress.completed_passes + 1;
        }
        self.notify();
    }

    pub fn advance_pass(&mut self, pass_counter: usize) {
        self.progress.pass_counter = pass_counter;
        self.notify();
    }

    pub fn end_pass(&mut self) {
        self.progress.pass_counter = self.progress.pass_limit;
        self.progress.completed_passes += 1;
        self.progress.total_passes = self.progress.total_passes.max(self.progress.completed_passes);
        self.notify();
    }

    fn notify(&mut self) {
        if let Some(monitor) = self.monitor.as_mut() {
            monitor.on_progress(&self.progress);
        }
    }
}
