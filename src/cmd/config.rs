//! Configuration view and validation commands: `jobboard config`.

use std::path::Path;

use anyhow::{Context, Result, bail};

use super::super::ConfigCommands;
use jobboard::config::JobboardConfig;

pub fn cmd_config(
    config_path: &Path,
    config: &JobboardConfig,
    command: Option<ConfigCommands>,
) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => {
            if config_path.exists() {
                println!("# Config file: {}", config_path.display());
            } else {
                println!("# No config file at {} (defaults)", config_path.display());
            }
            // The session token is a credential.
            let mut shown = config.clone();
            if shown.client.token.is_some() {
                shown.client.token = Some("<redacted>".to_string());
            }
            let rendered =
                toml::to_string_pretty(&shown).context("Failed to render configuration")?;
            println!("{}", rendered);
        }
        Some(ConfigCommands::Validate) => {
            let warnings = config.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                for warning in &warnings {
                    println!("warning: {}", warning);
                }
                println!("{} warning(s)", warnings.len());
            }
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                bail!("{} already exists", config_path.display());
            }
            if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            JobboardConfig::default().save(config_path)?;
            println!("Wrote {}", config_path.display());
        }
    }
    Ok(())
}
