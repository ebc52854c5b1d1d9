// src/commands/progress.rs
//! Terminal progress for pipeline phases
//!
//! Each phase gets its own bar. Phases that know their total up front
//! (mirror, convert, package) show a bar; the others show a spinner with a
//! running count.

use archivist::pipeline::{Phase, ProgressSink};
use archivist::progress::{LogProgress, ProgressTracker, SilentProgress};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;
use std::time::Duration;

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{msg:>10} ({pos}/{len}) [{bar:40.green/dim}] {percent}%")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg:>10} {pos}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// Progress tracker rendered with indicatif
pub struct BarProgress {
    bar: ProgressBar,
    label: String,
}

impl BarProgress {
    pub fn new(label: &str) -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(spinner_style());
        bar.set_message(label.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));
        Self {
            bar,
            label: label.to_string(),
        }
    }
}

impl ProgressTracker for BarProgress {
    fn set_message(&self, message: &str) {
        self.bar.set_message(format!("{} {}", self.label, message));
    }

    fn increment(&self, amount: u64) {
        self.bar.inc(amount);
    }

    fn set_position(&self, position: u64) {
        self.bar.set_position(position);
    }

    fn set_length(&self, length: u64) {
        if length > 0 && self.bar.length().is_none() {
            self.bar.disable_steady_tick();
            self.bar.set_style(bar_style());
        }
        self.bar.set_length(length);
    }

    fn position(&self) -> u64 {
        self.bar.position()
    }

    fn length(&self) -> u64 {
        self.bar.length().unwrap_or(0)
    }

    fn finish_with_message(&self, message: &str) {
        self.bar.finish_with_message(format!("{}: {}", self.label, message));
    }

    fn is_finished(&self) -> bool {
        self.bar.is_finished()
    }
}

/// Picks a tracker per phase from the output mode
pub struct TerminalSink {
    quiet: bool,
}

impl TerminalSink {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl ProgressSink for TerminalSink {
    fn phase(&self, phase: Phase) -> Box<dyn ProgressTracker> {
        if self.quiet {
            Box::new(SilentProgress::new())
        } else if std::io::stderr().is_terminal() {
            Box::new(BarProgress::new(phase.as_str()))
        } else {
            Box::new(LogProgress::new(phase.as_str(), 0))
        }
    }
}
