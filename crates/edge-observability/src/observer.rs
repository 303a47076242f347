//! Lifecycle observers.

use std::time::Duration;

use edge_core::{LifecycleObserver, LifecyclePhase, RunId};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Logs every lifecycle transition through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl LifecycleObserver for TracingObserver {
    fn on_phase(&self, run: &RunId, phase: LifecyclePhase, elapsed: Duration) {
        let elapsed_us = elapsed.as_micros() as u64;
        match phase {
            LifecyclePhase::ShellFailed | LifecyclePhase::StreamFailed => {
                warn!(run_id = %run, phase = %phase, elapsed_us, "render run failed");
            }
            LifecyclePhase::Completed => {
                info!(run_id = %run, phase = %phase, elapsed_us, "render run completed");
            }
            _ => debug!(run_id = %run, phase = %phase, elapsed_us, "render phase"),
        }
    }
}

/// A single observed transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseEvent {
    pub run_id: RunId,
    pub phase: LifecyclePhase,
    /// Time since the run started (microseconds).
    pub elapsed_us: u64,
}

/// Timing summary for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub run_id: RunId,
    /// Phases in the order they were entered.
    pub phases: Vec<LifecyclePhase>,
    /// Terminal phase, once reached.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<LifecyclePhase>,
    /// Time to shell ready (microseconds).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_to_shell_us: Option<u64>,
    /// Time to the terminal phase (microseconds).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_us: Option<u64>,
}

impl RunSummary {
    /// Serialize as a JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{{\"run_id\":\"{}\"}}", self.run_id))
    }
}

/// Stores transitions in memory for inspection.
///
/// Events accumulate across runs until they are taken or cleared, so a
/// long-lived recorder should [`take`](Self::take) each run once it settles.
#[derive(Debug, Default)]
pub struct PhaseRecorder {
    events: Mutex<Vec<PhaseEvent>>,
}

impl PhaseRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events, across runs, in arrival order.
    pub fn events(&self) -> Vec<PhaseEvent> {
        self.events.lock().clone()
    }

    /// Phases entered by `run`.
    pub fn phases(&self, run: &RunId) -> Vec<LifecyclePhase> {
        self.events
            .lock()
            .iter()
            .filter(|event| &event.run_id == run)
            .map(|event| event.phase)
            .collect()
    }

    /// Summarise `run`, or `None` if it was never observed.
    pub fn summary(&self, run: &RunId) -> Option<RunSummary> {
        let events = self.events.lock();
        let mut summary: Option<RunSummary> = None;

        for event in events.iter().filter(|event| &event.run_id == run) {
            let entry = summary.get_or_insert_with(|| RunSummary {
                run_id: run.clone(),
                phases: Vec::new(),
                outcome: None,
                time_to_shell_us: None,
                total_us: None,
            });
            entry.phases.push(event.phase);
            if event.phase == LifecyclePhase::ShellReady {
                entry.time_to_shell_us = Some(event.elapsed_us);
            }
            if event.phase.is_terminal() {
                entry.outcome = Some(event.phase);
                entry.total_us = Some(event.elapsed_us);
            }
        }

        summary
    }

    /// Remove and return the events of `run`, leaving other runs in place.
    pub fn take(&self, run: &RunId) -> Vec<PhaseEvent> {
        let mut events = self.events.lock();
        let (taken, kept): (Vec<_>, Vec<_>) = events.drain(..).partition(|event| &event.run_id == run);
        *events = kept;
        taken
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl LifecycleObserver for PhaseRecorder {
    fn on_phase(&self, run: &RunId, phase: LifecyclePhase, elapsed: Duration) {
        self.events.lock().push(PhaseEvent {
            run_id: run.clone(),
            phase,
            elapsed_us: elapsed.as_micros() as u64,
        });
    }
}
