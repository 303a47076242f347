//! Render lifecycle tracking.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::context::RunId;
use crate::error::IllegalTransition;

/// Lifecycle phases for one bridge invocation.
///
/// ```text
/// Started -> ShellPending -> ShellReady -> Streaming -> Completed
///                 |                            `-----> StreamFailed
///                 `-> ShellFailed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    /// Invocation created, render operation not started yet.
    Started,
    /// Render operation started, waiting for the shell.
    ShellPending,
    /// Shell is ready, the host has been asked to flush its preamble.
    ShellReady,
    /// Chunks are being piped into the sink.
    Streaming,
    /// Sink finished and the host transport was closed.
    Completed,
    /// Sink reported a failure after streaming started.
    StreamFailed,
    /// Shell failed before any output was committed.
    ShellFailed,
}

impl LifecyclePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::ShellPending => "shell_pending",
            Self::ShellReady => "shell_ready",
            Self::Streaming => "streaming",
            Self::Completed => "completed",
            Self::StreamFailed => "stream_failed",
            Self::ShellFailed => "shell_failed",
        }
    }

    /// Terminal phases settle the completion token.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::StreamFailed | Self::ShellFailed
        )
    }

    /// Check whether `next` is a legal successor of this phase.
    pub fn can_transition_to(&self, next: LifecyclePhase) -> bool {
        use LifecyclePhase::*;

        matches!(
            (self, next),
            (Started, ShellPending)
                | (ShellPending, ShellReady)
                | (ShellPending, ShellFailed)
                | (ShellReady, Streaming)
                | (Streaming, Completed)
                | (Streaming, StreamFailed)
        )
    }

    /// Move to `next`, leaving the phase untouched if the move is illegal.
    pub fn transition(&mut self, next: LifecyclePhase) -> Result<(), IllegalTransition> {
        if !self.can_transition_to(next) {
            return Err(IllegalTransition { from: *self, to: next });
        }
        *self = next;
        Ok(())
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Well-known timing marks recorded by the bridge.
pub mod marks {
    pub const SHELL_READY: &str = "shell_ready";
    pub const FIRST_CHUNK: &str = "first_chunk";
    pub const COMPLETE: &str = "complete";
}

/// Timing context for observability.
#[derive(Debug, Clone)]
pub struct TimingContext {
    start: Instant,
    marks: HashMap<&'static str, Instant>,
}

impl TimingContext {
    /// Create a new timing context.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            marks: HashMap::new(),
        }
    }

    /// Record a timing mark. The first recording wins.
    pub fn mark(&mut self, name: &'static str) {
        self.marks.entry(name).or_insert_with(Instant::now);
    }

    /// Get elapsed time since start.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Time from start to a recorded mark.
    pub fn since_start(&self, name: &str) -> Option<Duration> {
        self.marks.get(name).map(|t| t.duration_since(self.start))
    }

    /// Get time to shell ready.
    pub fn time_to_shell(&self) -> Option<Duration> {
        self.since_start(marks::SHELL_READY)
    }

    /// Get time to the first chunk handed to the host.
    pub fn time_to_first_chunk(&self) -> Option<Duration> {
        self.since_start(marks::FIRST_CHUNK)
    }
}

impl Default for TimingContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer trait for lifecycle events.
///
/// Called synchronously on every accepted transition; implementations must
/// not call back into the bridge.
pub trait LifecycleObserver: Send + Sync {
    /// Called when a lifecycle phase is entered.
    fn on_phase(&self, run: &RunId, phase: LifecyclePhase, elapsed: Duration);
}
