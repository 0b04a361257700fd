//! Error types for verdant-core.
//!
//! Sync phases never stop at the first failure. Each table or device operation
//! turns its failure into an [`Error`] value that is collected into the phase's
//! error list, so sibling operations keep running. A phase that finishes with a
//! non-empty list aborts the remaining phases of the pipeline.
//!
//! | Kind | Raised by | Effect |
//! |------|-----------|--------|
//! | [`ErrorKind::Transport`] | a failed GET or POST | table/device skipped, phase fails |
//! | [`ErrorKind::Decode`] | a response that is not the expected JSON | table/device skipped, phase fails |
//! | [`ErrorKind::Payload`] | a stored history payload that cannot be decoded | phase fails |
//! | [`ErrorKind::Store`] | SQLite or serialization errors | phase fails |
//! | [`ErrorKind::MissingCredentials`] | an authenticated table with no stored credentials | table skipped, phase fails |
//! | [`ErrorKind::CoordinatorStopped`] | submitting to a stopped coordinator | request rejected |
//! | [`ErrorKind::JobPanicked`] | a store job that panicked on the worker | that job only |
//!
//! Merge conflicts are not errors: they are resolved by
//! [`MergePolicy`](crate::MergePolicy).

use thiserror::Error;

/// Errors that can occur while synchronizing.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A request to the API failed or returned a non-success status.
    #[error("Request for {table} failed: {message}")]
    Transport {
        /// Table or path that was requested.
        table: String,
        /// Description of the failure, or the response body.
        message: String,
        /// HTTP status, when a response was received.
        status: Option<u16>,
    },

    /// A response body could not be decoded.
    #[error("Failed to decode {table}: {source}")]
    Decode {
        /// Table or path whose response was malformed.
        table: String,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A history payload could not be decoded.
    #[error("Invalid history payload: {0}")]
    Payload(#[from] verdant_types::PayloadError),

    /// Local store error.
    #[error("Store error: {0}")]
    Store(#[from] verdant_store::Error),

    /// An authenticated request was attempted without stored credentials.
    #[error("No credentials stored, cannot request {table}")]
    MissingCredentials {
        /// The table that needed credentials.
        table: String,
    },

    /// The coordinator's worker is no longer running.
    #[error("Sync coordinator has stopped")]
    CoordinatorStopped,

    /// A queued store operation panicked. The worker keeps running.
    #[error("Store operation panicked")]
    JobPanicked,

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Transport,
    Decode,
    Payload,
    Store,
    MissingCredentials,
    CoordinatorStopped,
    JobPanicked,
    Config,
}

impl Error {
    /// The kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Transport { .. } => ErrorKind::Transport,
            Error::Decode { .. } => ErrorKind::Decode,
            Error::Payload(_) => ErrorKind::Payload,
            Error::Store(_) => ErrorKind::Store,
            Error::MissingCredentials { .. } => ErrorKind::MissingCredentials,
            Error::CoordinatorStopped => ErrorKind::CoordinatorStopped,
            Error::JobPanicked => ErrorKind::JobPanicked,
            Error::InvalidConfig(_) => ErrorKind::Config,
        }
    }

    /// Create a transport error.
    pub fn transport(
        table: impl Into<String>,
        message: impl Into<String>,
        status: Option<u16>,
    ) -> Self {
        Self::Transport {
            table: table.into(),
            message: message.into(),
            status,
        }
    }

    /// Create a decode error.
    pub fn decode(table: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Decode {
            table: table.into(),
            source,
        }
    }

    /// Create a missing credentials error.
    pub fn missing_credentials(table: impl Into<String>) -> Self {
        Self::MissingCredentials {
            table: table.into(),
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

/// Result type alias using verdant-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
