//! Host transport capability.

use std::fmt;
use std::sync::Arc;

use edge_core::BridgeError;

/// One unit of rendered output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    Text(String),
    Binary(Vec<u8>),
}

impl Chunk {
    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(bytes) => bytes,
        }
    }

    /// The text payload, if this is a text chunk.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary(_) => None,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Text(text) => text.into_bytes(),
            Self::Binary(bytes) => bytes,
        }
    }
}

impl From<String> for Chunk {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Chunk {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Vec<u8>> for Chunk {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Binary(bytes)
    }
}

impl From<&[u8]> for Chunk {
    fn from(bytes: &[u8]) -> Self {
        Self::Binary(bytes.to_vec())
    }
}

/// What a host transport's `write` accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChunkEncoding {
    /// Only UTF-8 text; binary chunks are decoded before writing.
    #[default]
    Text,
    /// Raw bytes; chunks are passed through untouched.
    Binary,
}

/// Zero-argument cancellation function handed to the host.
#[derive(Clone)]
pub struct AbortHandle(Arc<dyn Fn() + Send + Sync>);

impl AbortHandle {
    pub fn new(abort: impl Fn() + Send + Sync + 'static) -> Self {
        Self(Arc::new(abort))
    }

    /// A handle that does nothing.
    pub fn noop() -> Self {
        Self::new(|| {})
    }

    /// Ask the render operation to stop producing chunks.
    pub fn abort(&self) {
        (self.0)()
    }
}

impl fmt::Debug for AbortHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbortHandle").finish_non_exhaustive()
    }
}

/// Capability set a host exposes to the bridge.
///
/// Only `write` is required; every other member defaults to a no-op.
/// Members are called one at a time and never under the bridge's lock. A
/// member may re-enter its own invocation, for example by firing the
/// registered abort; the calls that triggers arrive after it returns.
pub trait HostTransport: Send {
    /// Forward one chunk. An error fails the invocation with a sink error.
    fn write(&mut self, chunk: Chunk) -> anyhow::Result<()>;

    /// What `write` accepts.
    fn encoding(&self) -> ChunkEncoding {
        ChunkEncoding::Text
    }

    /// Called once, after the last write, on success only.
    fn close(&mut self) {}

    /// Called once when the shell is ready, before the first write.
    fn flush(&mut self) {}

    /// Notification hook for every error the bridge observes.
    fn on_error(&mut self, _error: &BridgeError) {}

    /// Called once per invocation, before any write.
    fn register_abort(&mut self, _abort: AbortHandle) {}
}

impl<T: HostTransport + ?Sized> HostTransport for Box<T> {
    fn write(&mut self, chunk: Chunk) -> anyhow::Result<()> {
        (**self).write(chunk)
    }

    fn encoding(&self) -> ChunkEncoding {
        (**self).encoding()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn flush(&mut self) {
        (**self).flush()
    }

    fn on_error(&mut self, error: &BridgeError) {
        (**self).on_error(error)
    }

    fn register_abort(&mut self, abort: AbortHandle) {
        (**self).register_abort(abort)
    }
}
