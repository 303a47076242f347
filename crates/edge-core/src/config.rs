//! Bridge configuration.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// How binary chunks are turned into text for text-only hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Utf8Policy {
    /// Replace invalid sequences with U+FFFD.
    #[default]
    Lossy,
    /// Treat invalid sequences as a sink failure.
    Strict,
}

/// Configuration for a stream bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Friendly name used in logs to tell bridge instances apart.
    #[serde(default = "default_name")]
    pub name: String,

    /// Text normalisation for binary chunks.
    #[serde(default)]
    pub utf8: Utf8Policy,

    /// Log every forwarded chunk at trace level.
    #[serde(default)]
    pub trace_chunks: bool,
}

fn default_name() -> String {
    "default".to_string()
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            utf8: Utf8Policy::default(),
            trace_chunks: false,
        }
    }
}

impl BridgeConfig {
    /// Create a configuration with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set the UTF-8 policy.
    pub fn with_utf8(mut self, policy: Utf8Policy) -> Self {
        self.utf8 = policy;
        self
    }

    /// Enable or disable per-chunk trace logging.
    pub fn with_trace_chunks(mut self, enabled: bool) -> Self {
        self.trace_chunks = enabled;
        self
    }

    /// Load config from a `.toml` or `.json` file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))
        } else {
            Self::from_toml_str(&content)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display()))
        }
    }

    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Render as a TOML document.
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = BridgeConfig::from_toml_str("").unwrap();
        assert_eq!(config, BridgeConfig::default());
        assert_eq!(config.name, "default");
        assert_eq!(config.utf8, Utf8Policy::Lossy);
    }

    #[test]
    fn test_toml_overrides() {
        let config = BridgeConfig::from_toml_str(
            r#"
            name = "storefront"
            utf8 = "strict"
            trace_chunks = true
            "#,
        )
        .unwrap();

        assert_eq!(config.name, "storefront");
        assert_eq!(config.utf8, Utf8Policy::Strict);
        assert!(config.trace_chunks);
    }

    #[test]
    fn test_toml_round_trips_through_string() {
        let config = BridgeConfig::new("edge").with_utf8(Utf8Policy::Strict);
        let text = config.to_toml_string().unwrap();
        assert_eq!(BridgeConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_load_json_file() {
        let path = std::env::temp_dir().join(format!("edge-bridge-{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "name": "json-bridge" }"#).unwrap();

        let config = BridgeConfig::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.name, "json-bridge");
        assert!(!config.trace_chunks);
    }

    #[test]
    fn test_load_missing_file_reports_path() {
        let err = BridgeConfig::load("/nonexistent/edge.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/edge.toml"));
    }
}
