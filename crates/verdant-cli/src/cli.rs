//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use uuid::Uuid;

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "verdant")]
#[command(author, version, about = "Sync a greenhouse controller with the Verdant service", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "VERDANT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Database path (overrides config)
    #[arg(short, long, global = true, env = "VERDANT_DB")]
    pub database: Option<PathBuf>,

    /// Service base URL (overrides config)
    #[arg(long, global = true, env = "VERDANT_API_URL")]
    pub api_url: Option<String>,

    /// Write output to file instead of stdout
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a full sync: pull tables and history, then push local changes
    Sync {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show local sync state and pending uploads
    Status {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Manage stored service credentials
    Credentials {
        #[command(subcommand)]
        action: CredentialsAction,
    },

    /// Record sensor samples into local history
    Record {
        /// Sensor id
        #[arg(short, long)]
        sensor: Uuid,

        /// Location id the sensor is placed in
        #[arg(short, long)]
        location: Uuid,

        /// Sample value
        #[arg(allow_negative_numbers = true)]
        value: f64,

        /// Sample time (RFC3339), defaults to now
        #[arg(long)]
        at: Option<String>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Credentials subcommands
#[derive(Debug, Clone, Subcommand)]
pub enum CredentialsAction {
    /// Store the user id and token used for authenticated requests
    Set {
        /// Service user id
        user_id: String,

        /// Access token
        #[arg(long, env = "VERDANT_TOKEN", hide_env_values = true)]
        token: String,
    },

    /// Remove stored credentials
    Clear,

    /// Show the stored user id
    Show,
}

/// Configuration subcommands
#[derive(Debug, Clone, Copy, Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Check the configuration file for errors
    Validate,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_record_with_negative_value() {
        let sensor = Uuid::new_v4();
        let location = Uuid::new_v4();
        let cli = Cli::try_parse_from([
            "verdant",
            "record",
            "--sensor",
            &sensor.to_string(),
            "--location",
            &location.to_string(),
            "-3.5",
        ])
        .unwrap();

        match cli.command {
            Commands::Record {
                sensor: s,
                value,
                at,
                ..
            } => {
                assert_eq!(s, sensor);
                assert_eq!(value, -3.5);
                assert!(at.is_none());
            }
            _ => panic!("expected record command"),
        }
    }

    #[test]
    fn test_parse_sync_json() {
        let cli = Cli::try_parse_from(["verdant", "sync", "--format", "json", "-q"]).unwrap();
        assert!(cli.quiet);
        assert!(matches!(
            cli.command,
            Commands::Sync {
                format: OutputFormat::Json
            }
        ));
    }
}
