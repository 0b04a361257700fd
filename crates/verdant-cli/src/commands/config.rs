//! Config command - inspect and initialize the configuration file.

use anyhow::{Context, Result, bail};

use super::CommandContext;
use crate::cli::ConfigAction;
use crate::style;
use crate::util::write_output;
use verdant_cli::config::Config;

/// Execute the config command.
pub fn cmd_config(ctx: &CommandContext, action: ConfigAction) -> Result<()> {
    let path = &ctx.config_path;

    match action {
        ConfigAction::Show => {
            let content =
                toml::to_string_pretty(&ctx.config).context("Failed to serialize config")?;
            write_output(ctx.output.as_ref(), &content)?;
        }
        ConfigAction::Path => {
            println!("{}", path.display());
        }
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                bail!(
                    "Config file already exists at {} (use --force to overwrite)",
                    path.display()
                );
            }
            Config::default().save(path)?;
            println!(
                "{}",
                style::format_success(
                    &format!("Wrote default config to {}", path.display()),
                    ctx.no_color
                )
            );
        }
        ConfigAction::Validate => {
            // Reload from disk so CLI overrides do not mask file errors.
            let config = if path.exists() {
                Config::load(path)?
            } else {
                Config::default()
            };
            config.validate()?;
            println!(
                "{}",
                style::format_success(&format!("{} is valid", path.display()), ctx.no_color)
            );
        }
    }
    Ok(())
}
