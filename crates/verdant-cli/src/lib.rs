//! Command-line interface for the Verdant greenhouse sync engine.
//!
//! The `verdant` binary runs syncs against the central service and manages
//! the controller's local store.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sync` | Pull reference tables and history, then push local changes |
//! | `status` | Show credentials, watermarks, table sizes and pending uploads |
//! | `credentials` | Set, show or clear the stored API credentials |
//! | `record` | Add a sample to local sensor history |
//! | `config` | Show, initialize or validate the configuration file |
//! | `completions` | Generate shell completions |
//!
//! # Configuration
//!
//! The CLI reads `~/.config/verdant/config.toml` (or platform equivalent):
//!
//! ```toml
//! [api]
//! url = "https://greenhouse.example/api"
//! timeout_secs = 30
//!
//! [storage]
//! path = "/var/lib/verdant/verdant.db"
//!
//! [sync]
//! max_days_per_request = 15
//! upload_batch_size = 30
//! ```
//!
//! # Environment Variables
//!
//! - `VERDANT_CONFIG`: configuration file path
//! - `VERDANT_DB`: database path (overrides `storage.path`)
//! - `VERDANT_API_URL`: service URL (overrides `api.url`)
//! - `VERDANT_TOKEN`: token for `credentials set`
//! - `RUST_LOG`: log filter when neither `-v` nor `-q` is given
//! - `NO_COLOR`: disable colored output when set
//!
//! # Examples
//!
//! ```bash
//! verdant credentials set 17 --token "$TOKEN"
//! verdant sync
//! verdant record --sensor 6f1c... --location 2b9e... 21.5
//! verdant status --format json
//! ```

pub mod config;

// Re-export core dependencies for convenience
pub use verdant_core;
pub use verdant_store;
pub use verdant_types;
