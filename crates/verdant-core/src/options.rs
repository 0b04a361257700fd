//! Tunables for a sync run.

use serde::{Deserialize, Serialize};

/// API table that receives and serves sensor history.
pub const HISTORY_TABLE: &str = "SensorsHistory";

/// Default number of days requested per history page.
pub const DEFAULT_MAX_DAYS_PER_REQUEST: u32 = 15;

/// Default number of history blocks per upload request.
pub const DEFAULT_UPLOAD_BATCH_SIZE: usize = 30;

/// Options controlling paging and batching.
///
/// ```
/// use verdant_core::SyncOptions;
///
/// let options = SyncOptions::default()
///     .max_days_per_request(7)
///     .upload_batch_size(10);
/// assert_eq!(options.max_days_per_request, 7);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    /// Days of history requested per page.
    pub max_days_per_request: u32,
    /// History blocks posted per request in the never-uploaded pass.
    pub upload_batch_size: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            max_days_per_request: DEFAULT_MAX_DAYS_PER_REQUEST,
            upload_batch_size: DEFAULT_UPLOAD_BATCH_SIZE,
        }
    }
}

impl SyncOptions {
    /// Set the number of days per history page. Clamped to at least 1.
    #[must_use]
    pub fn max_days_per_request(mut self, days: u32) -> Self {
        self.max_days_per_request = days.max(1);
        self
    }

    /// Set the upload batch size. Clamped to at least 1.
    #[must_use]
    pub fn upload_batch_size(mut self, size: usize) -> Self {
        self.upload_batch_size = size.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = SyncOptions::default();
        assert_eq!(options.max_days_per_request, 15);
        assert_eq!(options.upload_batch_size, 30);
    }

    #[test]
    fn test_setters_clamp_zero() {
        let options = SyncOptions::default()
            .max_days_per_request(0)
            .upload_batch_size(0);
        assert_eq!(options.max_days_per_request, 1);
        assert_eq!(options.upload_batch_size, 1);
    }

    #[test]
    fn test_deserialize_fills_missing_fields_with_defaults() {
        let options: SyncOptions = serde_json::from_str(r#"{"upload_batch_size": 12}"#).unwrap();
        assert_eq!(options.upload_batch_size, 12);
        assert_eq!(options.max_days_per_request, DEFAULT_MAX_DAYS_PER_REQUEST);

        let json = serde_json::to_value(&options).unwrap();
        assert_eq!(json["max_days_per_request"], 15);
    }
}
