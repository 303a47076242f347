//! CLI command implementations.

pub mod config;
pub mod render;

use clap::{Args, Subcommand};

/// Arguments for the render command.
#[derive(Args, Debug, Clone)]
pub struct RenderArgs {
    /// Delay before the deferred quote resolves, in milliseconds.
    #[arg(long, default_value = "300")]
    pub delay_ms: u64,

    /// Give up on the quote after this many milliseconds.
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Fail the header so the shell never becomes ready.
    #[arg(long)]
    pub fail_shell: bool,

    /// Fail the deferred quote after the shell was sent.
    #[arg(long)]
    pub fail_section: bool,

    /// Abort the render after this many milliseconds.
    #[arg(long)]
    pub abort_after_ms: Option<u64>,
}

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show effective configuration.
    Show,
    /// Initialize a new config file.
    Init {
        /// Name written into the file.
        #[arg(short, long, default_value = "default")]
        name: String,
        /// Force overwrite existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Validate the config file.
    Validate,
}
