//! Error taxonomy for the stream bridge.

use std::fmt;
use std::sync::Arc;

use crate::lifecycle::LifecyclePhase;

/// A failure raised by the render engine or the host transport.
///
/// Cheap to clone, so the same failure can be forwarded to the host's
/// error hook and still settle the completion token.
#[derive(Clone)]
pub struct RenderError(Arc<anyhow::Error>);

impl RenderError {
    /// Wrap any standard error.
    pub fn new<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self(Arc::new(anyhow::Error::new(error)))
    }

    /// Create an error from a plain message.
    pub fn msg<M>(message: M) -> Self
    where
        M: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        Self(Arc::new(anyhow::Error::msg(message)))
    }

    /// Access the underlying error.
    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }
}

impl From<anyhow::Error> for RenderError {
    fn from(err: anyhow::Error) -> Self {
        Self(Arc::new(err))
    }
}

impl From<&'static str> for RenderError {
    fn from(message: &'static str) -> Self {
        Self::msg(message)
    }
}

impl From<String> for RenderError {
    fn from(message: String) -> Self {
        Self::msg(message)
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#}", self.0)
    }
}

impl fmt::Debug for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        let inner: &anyhow::Error = &self.0;
        inner.source()
    }
}

/// Classified failure of one bridge invocation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BridgeError {
    /// Raised before any output was committed.
    #[error("shell error: {0}")]
    Shell(RenderError),

    /// Raised by the engine after the shell; notified but not fatal by itself.
    #[error("stream error: {0}")]
    Stream(RenderError),

    /// Forwarding a chunk to the host failed.
    #[error("sink error: {0}")]
    Sink(RenderError),

    /// Every settling path was dropped without reporting an outcome.
    #[error("render operation dropped before settling")]
    Abandoned,
}

impl BridgeError {
    /// Whether this error settles the completion token.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Stream(_))
    }

    /// The originating failure, if any.
    pub fn cause(&self) -> Option<&RenderError> {
        match self {
            Self::Shell(err) | Self::Stream(err) | Self::Sink(err) => Some(err),
            Self::Abandoned => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Shell(_) => "shell",
            Self::Stream(_) => "stream",
            Self::Sink(_) => "sink",
            Self::Abandoned => "abandoned",
        }
    }
}

/// A lifecycle transition that the state machine refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal lifecycle transition from {from} to {to}")]
pub struct IllegalTransition {
    pub from: LifecyclePhase,
    pub to: LifecyclePhase,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_error_keeps_message_and_context() {
        let err = RenderError::from(anyhow::anyhow!("disk full").context("write chunk"));
        let text = err.to_string();

        assert!(text.contains("write chunk"));
        assert!(text.contains("disk full"));
    }

    #[test]
    fn test_bridge_error_classification() {
        let boom = RenderError::msg("boom");

        assert!(BridgeError::Shell(boom.clone()).is_fatal());
        assert!(BridgeError::Sink(boom.clone()).is_fatal());
        assert!(!BridgeError::Stream(boom.clone()).is_fatal());
        assert!(BridgeError::Abandoned.is_fatal());

        let shell = BridgeError::Shell(boom);
        assert_eq!(shell.kind(), "shell");
        assert_eq!(shell.cause().map(ToString::to_string).as_deref(), Some("boom"));
        assert_eq!(shell.to_string(), "shell error: boom");
    }

    #[test]
    fn test_illegal_transition_display() {
        let err = IllegalTransition {
            from: LifecyclePhase::Completed,
            to: LifecyclePhase::StreamFailed,
        };
        assert_eq!(
            err.to_string(),
            "illegal lifecycle transition from completed to stream_failed"
        );
    }
}
