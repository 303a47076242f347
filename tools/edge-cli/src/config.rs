//! CLI configuration.

use std::path::Path;

use anyhow::{Context, Result};
use edge_core::BridgeConfig;
use edge_observability::LogFormat;
use serde::{Deserialize, Serialize};

/// File names searched for, in order, in each directory.
pub const CONFIG_FILE_NAMES: [&str; 3] = ["edge.toml", ".edge.toml", "edge.json"];

/// CLI configuration file.
///
/// Bridge settings live at the top level; logging has its own table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(flatten)]
    pub bridge: BridgeConfig,

    #[serde(default)]
    pub log: LogConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Output format; `--json` overrides it.
    #[serde(default)]
    pub format: LogFormat,

    /// `EnvFilter` directives; `--verbose` overrides them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl CliConfig {
    /// Load config from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))
        } else {
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display()))
        }
    }

    /// Save config to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::to_string_pretty(self)?
        } else {
            toml::to_string_pretty(self)?
        };

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }
}

/// Generate a default edge.toml config file.
pub fn generate_default_config(name: &str) -> String {
    format!(
        r#"# Stream bridge configuration

# Shown in logs to tell bridge instances apart.
name = "{name}"

# How binary chunks are decoded for text-only hosts: "lossy" or "strict".
utf8 = "lossy"

# Log every forwarded chunk at trace level.
trace_chunks = false

[log]
# "human" or "json".
format = "human"
# filter = "edge_streaming=debug,info"
"#
    )
}
