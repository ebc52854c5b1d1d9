// src/progress.rs

//! Progress tracking shared by the pipeline phases
//!
//! Phases report against the `ProgressTracker` trait and never talk to a
//! terminal directly. Conversion workers call `increment` from many threads
//! at once, so every implementation keeps its counters in atomics.
//!
//! Implementations:
//! - `SilentProgress`: counters only, for tests and `--quiet`
//! - `LogProgress`: logs roughly every tenth of the way through
//! - `CallbackProgress`: forwards events to a closure
//!
//! The CLI provides an indicatif-backed tracker on top of this trait.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::info;

/// Core trait for progress tracking
///
/// Implementations must be `Send + Sync`: conversion units report from
/// worker threads.
pub trait ProgressTracker: Send + Sync {
    /// Set the current status message
    fn set_message(&self, message: &str);

    /// Increment progress by the given amount
    fn increment(&self, amount: u64);

    /// Set progress to a specific position
    fn set_position(&self, position: u64);

    /// Set the total (length) of the progress
    fn set_length(&self, length: u64);

    fn position(&self) -> u64;

    fn length(&self) -> u64;

    /// Finish progress with a message
    fn finish_with_message(&self, message: &str);

    fn is_finished(&self) -> bool;

    /// Shrink the total to what actually advanced
    ///
    /// A run that skips already processed work would otherwise end short
    /// of its precomputed total.
    fn clamp_to_position(&self) {
        let position = self.position();
        if position < self.length() {
            self.set_length(position);
        }
    }
}

/// Position, total and finished flag behind every tracker here
#[derive(Debug, Default)]
struct Counters {
    position: AtomicU64,
    length: AtomicU64,
    finished: AtomicBool,
}

impl Counters {
    fn with_length(length: u64) -> Self {
        let counters = Self::default();
        counters.length.store(length, Ordering::Relaxed);
        counters
    }

    /// Advance and return (old, new) position
    fn advance(&self, amount: u64) -> (u64, u64) {
        let old = self.position.fetch_add(amount, Ordering::Relaxed);
        (old, old + amount)
    }

    fn position(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    fn set_position(&self, position: u64) {
        self.position.store(position, Ordering::Relaxed);
    }

    fn length(&self) -> u64 {
        self.length.load(Ordering::Relaxed)
    }

    fn set_length(&self, length: u64) {
        self.length.store(length, Ordering::Relaxed);
    }

    fn finish(&self) {
        self.finished.store(true, Ordering::Relaxed);
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }
}

/// Tracker that only counts
#[derive(Debug, Default)]
pub struct SilentProgress {
    counters: Counters,
}

impl SilentProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_length(length: u64) -> Self {
        Self {
            counters: Counters::with_length(length),
        }
    }
}

impl ProgressTracker for SilentProgress {
    fn set_message(&self, _message: &str) {}

    fn increment(&self, amount: u64) {
        self.counters.advance(amount);
    }

    fn set_position(&self, position: u64) {
        self.counters.set_position(position);
    }

    fn set_length(&self, length: u64) {
        self.counters.set_length(length);
    }

    fn position(&self) -> u64 {
        self.counters.position()
    }

    fn length(&self) -> u64 {
        self.counters.length()
    }

    fn finish_with_message(&self, _message: &str) {
        self.counters.finish();
    }

    fn is_finished(&self) -> bool {
        self.counters.is_finished()
    }
}

/// Tracker that writes milestones to the log
///
/// Used when stderr is not a terminal.
#[derive(Debug)]
pub struct LogProgress {
    phase: String,
    counters: Counters,
}

impl LogProgress {
    pub fn new(phase: impl Into<String>, length: u64) -> Self {
        Self {
            phase: phase.into(),
            counters: Counters::with_length(length),
        }
    }

    /// Whether a step from `old` to `new` crosses a tenth of the total
    fn crosses_milestone(&self, old: u64, new: u64) -> bool {
        let step = (self.counters.length() / 10).max(1);
        new / step > old / step
    }
}

impl ProgressTracker for LogProgress {
    fn set_message(&self, message: &str) {
        info!("{}: {}", self.phase, message);
    }

    fn increment(&self, amount: u64) {
        let (old, new) = self.counters.advance(amount);
        let length = self.counters.length();
        if length > 0 && self.crosses_milestone(old, new) {
            info!("{}: {}/{} ({}%)", self.phase, new, length, new * 100 / length);
        }
    }

    fn set_position(&self, position: u64) {
        self.counters.set_position(position);
    }

    fn set_length(&self, length: u64) {
        self.counters.set_length(length);
    }

    fn position(&self) -> u64 {
        self.counters.position()
    }

    fn length(&self) -> u64 {
        self.counters.length()
    }

    fn finish_with_message(&self, message: &str) {
        self.counters.finish();
        info!("{}: {}", self.phase, message);
    }

    fn is_finished(&self) -> bool {
        self.counters.is_finished()
    }
}

/// Event delivered to a [`CallbackProgress`] closure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Message(String),
    Position { current: u64, total: u64 },
    Length(u64),
    Finished(String),
}

/// Tracker that hands every change to a closure
pub struct CallbackProgress<F>
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    callback: F,
    counters: Counters,
}

impl<F> CallbackProgress<F>
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    pub fn new(length: u64, callback: F) -> Self {
        Self {
            callback,
            counters: Counters::with_length(length),
        }
    }

    fn emit_position(&self, current: u64) {
        (self.callback)(ProgressEvent::Position {
            current,
            total: self.counters.length(),
        });
    }
}

impl<F> ProgressTracker for CallbackProgress<F>
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn set_message(&self, message: &str) {
        (self.callback)(ProgressEvent::Message(message.to_string()));
    }

    fn increment(&self, amount: u64) {
        let (_, new) = self.counters.advance(amount);
        self.emit_position(new);
    }

    fn set_position(&self, position: u64) {
        self.counters.set_position(position);
        self.emit_position(position);
    }

    fn set_length(&self, length: u64) {
        self.counters.set_length(length);
        (self.callback)(ProgressEvent::Length(length));
    }

    fn position(&self) -> u64 {
        self.counters.position()
    }

    fn length(&self) -> u64 {
        self.counters.length()
    }

    fn finish_with_message(&self, message: &str) {
        self.counters.finish();
        (self.callback)(ProgressEvent::Finished(message.to_string()));
    }

    fn is_finished(&self) -> bool {
        self.counters.is_finished()
    }
}
