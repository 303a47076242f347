//! Streaming primitives for shell-first SSR.
//!
//! This crate bridges a render engine that produces a document shell
//! followed by streamed chunks to a host transport that only accepts
//! pushed bytes:
//! - `StreamBridge` - Runs one render and settles a `CompletionToken` exactly once
//! - `HostTransport` - Capability trait implemented by the host
//! - `ChunkSink` - Per-run adapter the engine pipes its output into
//! - `ShellRenderer` - Reference engine built from a `Shell` and `Section`s
//! - `channel` - In-process transport for HTTP-style servers

mod bridge;
mod channel;
mod completion;
mod renderer;
mod section;
mod shell;
mod sink;
mod transport;

#[cfg(test)]
mod test_support;

pub use bridge::*;
pub use channel::*;
pub use completion::*;
pub use renderer::*;
pub use section::*;
pub use shell::*;
pub use sink::*;
pub use transport::*;
