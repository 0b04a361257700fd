//! Error types for history payload encoding in verdant-types.

use thiserror::Error;

/// Errors that can occur when decoding a stored history payload.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum PayloadError {
    /// The encoded payload is not made of whole sample records.
    #[error("Encoded payload of {len} bytes is not a multiple of the {record_len}-byte sample record")]
    Truncated {
        /// Length of the payload in bytes.
        len: usize,
        /// Size of a single encoded sample.
        record_len: usize,
    },

    /// A sample carries a timestamp that cannot be represented.
    #[error("Sample timestamp out of range: {0}")]
    InvalidTimestamp(i64),
}

/// Result type alias using verdant-types' PayloadError type.
pub type PayloadResult<T> = std::result::Result<T, PayloadError>;
