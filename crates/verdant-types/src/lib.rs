//! Shared types for the Verdant greenhouse sync engine.
//!
//! This crate provides the data model exchanged between the local store and
//! the greenhouse API:
//!
//! - Reference and configuration tables (locations, devices, sensors, ...)
//! - The [`SyncEntity`] capability trait selecting each table's identity and
//!   mutability rules
//! - Day-granular [`HistoryBlock`]s with their compact sample encoding
//!
//! # Example
//!
//! ```
//! use time::macros::{date, datetime};
//! use uuid::Uuid;
//! use verdant_types::{HistoryBlock, Sample};
//!
//! let block = HistoryBlock::new(
//!     Uuid::new_v4(),
//!     Uuid::new_v4(),
//!     date!(2026 - 01 - 01),
//!     vec![Sample::new(datetime!(2026-01-01 10:00 UTC), 21.5)],
//! );
//! assert_eq!(block.samples()?.len(), 1);
//! # Ok::<(), verdant_types::PayloadError>(())
//! ```

pub mod entity;
pub mod error;
pub mod history;
pub mod tables;

pub use entity::{EntityKey, IdentityStrategy, Mutability, SyncEntity};
pub use error::{PayloadError, PayloadResult};
pub use history::{
    HistoryBlock, HistoryBlockWire, Payload, SAMPLE_RECORD_LEN, Sample, day_of, decode_samples,
    encode_samples, end_of_day, merge_samples,
};
pub use tables::{
    CropCycle, CropType, Device, Location, Parameter, Person, Placement, Relay, RelayType, Sensor,
    SensorType, Subsystem,
};
