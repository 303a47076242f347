//! Core abstractions for the shell-first stream bridge.
//!
//! This crate provides the fundamental types shared by the bridge and its hosts:
//! - `LifecyclePhase` - Explicit render lifecycle with validated transitions
//! - `TimingContext` - Timing marks for observability
//! - `BridgeError` / `RenderError` - Error taxonomy
//! - `BridgeConfig` - Bridge configuration
//! - `RunId` - Per-invocation identifier

mod config;
mod context;
mod error;
mod lifecycle;

pub use config::*;
pub use context::*;
pub use error::*;
pub use lifecycle::*;
