//! Global `tracing` subscriber setup.

use std::fmt;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt as fmt_layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when neither directives nor `RUST_LOG` are given.
pub const DEFAULT_FILTER: &str = "info";

static TRACING_INIT: OnceLock<LogFormat> = OnceLock::new();

/// Output format for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Compact human-readable lines (for development).
    #[default]
    Human,
    /// One JSON object per event (for log aggregation).
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Human => write!(f, "human"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Build the event filter.
///
/// Explicit directives win over `RUST_LOG`, which wins over [`DEFAULT_FILTER`].
pub fn build_filter(directives: Option<&str>) -> Result<EnvFilter> {
    match directives {
        Some(directives) => EnvFilter::try_new(directives)
            .with_context(|| format!("invalid log filter '{directives}'")),
        None => Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))),
    }
}

/// Install the global subscriber. Events go to stderr so stdout stays free
/// for rendered output.
///
/// Calling it again after a successful install is a no-op.
pub fn init_tracing(format: LogFormat, directives: Option<&str>) -> Result<()> {
    if TRACING_INIT.get().is_some() {
        return Ok(());
    }

    let filter = build_filter(directives)?;
    let registry = tracing_subscriber::registry().with(filter);
    let installed = match format {
        LogFormat::Human => registry
            .with(
                fmt_layer::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .compact(),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                fmt_layer::layer()
                    .with_writer(std::io::stderr)
                    .json()
                    .flatten_event(true),
            )
            .try_init(),
    };

    if let Err(err) = installed {
        // Another caller won the race to install a subscriber.
        if TRACING_INIT.get().is_none() {
            return Err(anyhow::Error::from(err).context("failed to install tracing subscriber"));
        }
    }

    let _ = TRACING_INIT.set(format);
    Ok(())
}

/// Format of the installed subscriber, if any.
pub fn installed_format() -> Option<LogFormat> {
    TRACING_INIT.get().copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_directives_are_validated() {
        assert!(build_filter(Some("edge_streaming=debug,info")).is_ok());

        let err = build_filter(Some("edge_streaming=loud")).unwrap_err();
        assert!(err.to_string().contains("invalid log filter"));
    }

    #[test]
    fn test_init_is_idempotent() {
        init_tracing(LogFormat::Json, Some("warn")).unwrap();
        init_tracing(LogFormat::Human, None).unwrap();

        assert_eq!(installed_format(), Some(LogFormat::Json));
    }

    #[test]
    fn test_log_format_serde() {
        let format: LogFormat = serde_json::from_str("\"json\"").unwrap();
        assert_eq!(format, LogFormat::Json);
        assert_eq!(LogFormat::default().to_string(), "human");
    }
}
