//! Configuration management commands.

use std::fs;

use anyhow::{bail, Context as _, Result};

use super::{ConfigArgs, ConfigCommand};
use crate::config::{generate_default_config, CliConfig, CONFIG_FILE_NAMES};
use crate::context::Context;

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => show_config(ctx),
        ConfigCommand::Init { name, force } => init_config(&name, force, ctx),
        ConfigCommand::Validate => validate_config(ctx),
    }
}

fn show_config(ctx: &Context) -> Result<()> {
    if ctx.output.is_json() {
        ctx.output.json(&ctx.config);
        return Ok(());
    }

    ctx.output.header("Current Configuration");
    match &ctx.config_path {
        Some(path) => ctx.output.kv("source", &path.display().to_string()),
        None => ctx.output.kv("source", "built-in defaults"),
    }

    ctx.output.info("[bridge]");
    ctx.output.kv("name", &ctx.config.bridge.name);
    ctx.output.kv("utf8", &format!("{:?}", ctx.config.bridge.utf8).to_lowercase());
    ctx.output.kv("trace_chunks", &ctx.config.bridge.trace_chunks.to_string());

    ctx.output.info("[log]");
    ctx.output.kv("format", &ctx.config.log.format.to_string());
    ctx.output.kv("filter", ctx.config.log.filter.as_deref().unwrap_or("(RUST_LOG or info)"));

    Ok(())
}

fn init_config(name: &str, force: bool, ctx: &Context) -> Result<()> {
    let path = ctx.cwd.join(CONFIG_FILE_NAMES[0]);

    if path.exists() && !force {
        bail!(
            "{} already exists. Use --force to overwrite.",
            path.display()
        );
    }

    fs::write(&path, generate_default_config(name))
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;

    ctx.output.success(&format!("Created {}", path.display()));
    Ok(())
}

fn validate_config(ctx: &Context) -> Result<()> {
    let Some(path) = &ctx.config_path else {
        bail!(
            "No config file found. Looked for {} in {} and its parents.",
            CONFIG_FILE_NAMES.join(", "),
            ctx.cwd.display()
        );
    };

    let config = CliConfig::load(path)?;
    if config.bridge.name.trim().is_empty() {
        bail!("name must not be empty");
    }
    if let Some(filter) = &config.log.filter {
        edge_observability::build_filter(Some(filter))?;
    }

    if ctx.output.is_json() {
        ctx.output.json(&serde_json::json!({ "valid": true, "path": path }));
    } else {
        ctx.output.success(&format!("{} is valid", path.display()));
    }
    Ok(())
}
