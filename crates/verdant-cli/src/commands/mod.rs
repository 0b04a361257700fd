//! Command implementations for the CLI.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use verdant_cli::config::Config;
use verdant_core::{HttpTransport, SyncCoordinator, SyncHandle};

mod config;
mod credentials;
mod record;
mod status;
mod sync;

pub use config::cmd_config;
pub use credentials::cmd_credentials;
pub use record::{RecordArgs, cmd_record};
pub use status::cmd_status;
pub use sync::cmd_sync;

/// Settings shared by every command, after CLI overrides are applied.
pub struct CommandContext {
    pub config: Config,
    pub config_path: PathBuf,
    pub output: Option<PathBuf>,
    pub no_color: bool,
    pub quiet: bool,
}

impl CommandContext {
    /// Start a coordinator over the configured store and service.
    ///
    /// All store access from commands goes through it so a command never
    /// races a sync running in the same process.
    pub fn coordinator(&self) -> Result<SyncHandle> {
        let transport = HttpTransport::new(&self.config.api.url, self.config.api.timeout())
            .context("Failed to create HTTP client")?;
        Ok(SyncCoordinator::spawn(
            &self.config.storage.path,
            Arc::new(transport),
            self.config.sync.to_options(),
        ))
    }
}
