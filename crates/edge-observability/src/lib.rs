//! Observability for the shell-first stream bridge.
//!
//! This crate provides:
//! - `init_tracing` - Global `tracing` subscriber with human or JSON output
//! - `TracingObserver` - Logs every lifecycle transition
//! - `PhaseRecorder` - Keeps transitions in memory and summarises runs

mod observer;
mod telemetry;

pub use observer::*;
pub use telemetry::*;

// Re-export the observer contract so hosts only need this crate
pub use edge_core::{LifecycleObserver, LifecyclePhase, RunId};
