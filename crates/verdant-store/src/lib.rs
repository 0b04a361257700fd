//! Local data persistence for the Verdant greenhouse sync engine.
//!
//! This crate provides SQLite-based storage that lets the engine work offline
//! and reconcile with the greenhouse API later.
//!
//! # Features
//!
//! - Reference and configuration tables, one JSON document per row, keyed by
//!   each table's identity strategy
//! - Transactional saves of staged [`ChangeSet`]s
//! - Day-granular sensor history blocks with compact sample payloads
//! - Upload bookkeeping (`UploadedAt`) and re-edit detection
//! - Persisted credentials and sync watermarks
//!
//! # Example
//!
//! ```no_run
//! use verdant_store::{HistoryQuery, Store};
//!
//! let store = Store::open_default()?;
//!
//! // Blocks still waiting for their first upload
//! let pending = store.query_blocks(&HistoryQuery::new().never_uploaded())?;
//! println!("{} blocks to upload", pending.len());
//! # Ok::<(), verdant_store::Error>(())
//! ```

mod error;
mod models;
mod queries;
mod schema;
mod store;

pub use error::{Error, Result};
pub use models::{
    ChangeSet, Credentials, HistoryStats, StagedEntity, SyncSettings, unix_millis,
};
pub use queries::{HistoryQuery, UploadFilter};
pub use store::Store;

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/verdant/verdant.db`
/// - macOS: `~/Library/Application Support/verdant/verdant.db`
/// - Windows: `C:\Users\<user>\AppData\Local\verdant\verdant.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("verdant")
        .join("verdant.db")
}
