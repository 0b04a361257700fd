//! Synchronization engine for Verdant greenhouse controllers.
//!
//! A controller keeps working offline against its local store and reconciles
//! with the central service whenever a sync runs. This crate implements that
//! reconciliation on top of [`verdant_store`].
//!
//! # Features
//!
//! - **Serialized pipeline**: [`SyncCoordinator`] runs syncs and other store
//!   writes one at a time in FIFO order
//! - **Reference tables**: last-writer-wins merge of configuration entities
//!   ([`ReferenceTableSyncer`], [`MergePolicy`])
//! - **Sensor history**: day-block pull with per-device watermark resume
//!   ([`TimeSeriesSyncer`])
//! - **Uploads**: batched, all-or-nothing history push with re-upload of
//!   blocks edited after their upload ([`UploadBatcher`])
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use verdant_core::{HttpTransport, SyncCoordinator, SyncOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = HttpTransport::new("https://api.example.com/", Duration::from_secs(30))?;
//!     let handle = SyncCoordinator::spawn(
//!         verdant_store::default_db_path(),
//!         Arc::new(transport),
//!         SyncOptions::default(),
//!     );
//!
//!     let report = handle.sync().await?;
//!     for phase in &report.completed {
//!         println!("done: {phase}");
//!     }
//!     if let Some(failure) = &report.failure {
//!         eprintln!("{} failed with {} errors", failure.phase, failure.errors.len());
//!     }
//!
//!     handle.shutdown().await?;
//!     Ok(())
//! }
//! ```

use time::OffsetDateTime;

pub mod coordinator;
pub mod error;
pub mod merge;
pub mod mock;
pub mod options;
pub mod reference;
pub mod timeseries;
pub mod transport;
pub mod upload;

pub use coordinator::{PhaseFailure, SyncCoordinator, SyncHandle, SyncPhase, SyncReport};
pub use error::{Error, ErrorKind, Result};
pub use merge::{MergeAction, MergePolicy};
pub use mock::{MockTransport, RecordedRequest, RequestMethod};
pub use options::{
    DEFAULT_MAX_DAYS_PER_REQUEST, DEFAULT_UPLOAD_BATCH_SIZE, HISTORY_TABLE, SyncOptions,
};
pub use reference::{
    ReferencePullReport, ReferencePushReport, ReferenceTableSyncer, StagedTable, TablePush,
    TableStats,
};
pub use timeseries::{DeviceHistoryReport, HistoryPullReport, TimeSeriesSyncer, device_watermark};
#[cfg(feature = "http")]
pub use transport::HttpTransport;
pub use transport::{TOKEN_HEADER, Transport, USER_ID_HEADER};
pub use upload::{UploadBatcher, UploadReport};

// Re-export the storage and model crates so callers need a single dependency.
pub use verdant_store as store;
pub use verdant_store::{Credentials, Store, SyncSettings};
pub use verdant_types as types;

/// Current instant at whole-second precision.
///
/// Every timestamp the engine writes goes through here so stored values
/// compare equal after a round trip through the service.
pub(crate) fn now_utc() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now.replace_nanosecond(0).unwrap_or(now)
}
