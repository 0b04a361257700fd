use std::io;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use verdant_cli::config::{Config, default_config_path};

mod cli;
mod commands;
mod style;
mod util;

use cli::{Cli, Commands};
use commands::{CommandContext, RecordArgs};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle completions command early (before tracing init)
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "verdant", &mut io::stdout());
        return Ok(());
    }

    // When quiet mode is enabled, suppress info-level logging
    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config = if config_path.exists() {
        Config::load(&config_path)?
    } else {
        Config::default()
    };

    // Override config with CLI args
    if let Some(url) = cli.api_url {
        config.api.url = url;
    }
    if let Some(path) = cli.database {
        config.storage.path = path;
    }

    let ctx = CommandContext {
        config,
        config_path,
        output: cli.output,
        no_color: cli.no_color,
        quiet: cli.quiet,
    };

    // Config commands must work even when the file is invalid.
    if let Commands::Config { action } = cli.command {
        return commands::cmd_config(&ctx, action);
    }
    ctx.config
        .validate()
        .with_context(|| format!("Invalid configuration in {}", ctx.config_path.display()))?;
    tracing::debug!(database = %ctx.config.storage.path.display(), "Configuration loaded");

    match cli.command {
        Commands::Sync { format } => commands::cmd_sync(&ctx, format).await,
        Commands::Status { format } => commands::cmd_status(&ctx, format).await,
        Commands::Credentials { action } => commands::cmd_credentials(&ctx, action).await,
        Commands::Record {
            sensor,
            location,
            value,
            at,
        } => {
            commands::cmd_record(
                &ctx,
                RecordArgs {
                    sensor,
                    location,
                    value,
                    at,
                },
            )
            .await
        }
        Commands::Config { .. } | Commands::Completions { .. } => {
            // Already handled above
            unreachable!()
        }
    }
}
