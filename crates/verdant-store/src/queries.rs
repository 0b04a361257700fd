//! Query builder for sensor history blocks.
//!
//! [`HistoryQuery`] follows the builder pattern: every filter is optional and
//! filters can be chained in any order.
//!
//! # Example
//!
//! ```
//! use verdant_store::{HistoryQuery, Store};
//! use uuid::Uuid;
//!
//! let store = Store::open_in_memory()?;
//! let sensor = Uuid::new_v4();
//!
//! // Newest uploaded block of a sensor
//! let query = HistoryQuery::new().sensor(sensor).uploaded().limit(1);
//! let latest = store.query_blocks(&query)?;
//!
//! // Everything waiting for its first upload, oldest first
//! let pending = HistoryQuery::new().never_uploaded().oldest_first();
//! let blocks = store.query_blocks(&pending)?;
//! # let _ = (latest, blocks);
//! # Ok::<(), verdant_store::Error>(())
//! ```

use uuid::Uuid;

/// Upload state filter for history blocks.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum UploadFilter {
    /// All blocks.
    #[default]
    Any,
    /// Blocks that were never uploaded.
    NeverUploaded,
    /// Blocks uploaded at least once.
    Uploaded,
    /// Uploaded blocks whose day had not ended at upload time, so samples may
    /// have been added since.
    OpenSinceUpload,
}

/// Fluent query builder for history blocks.
///
/// By default, queries return blocks ordered by day descending (newest first).
#[derive(Debug, Default, Clone)]
pub struct HistoryQuery {
    /// Restrict to these sensors. Empty means all sensors.
    pub sensor_ids: Vec<Uuid>,
    /// Upload state filter.
    pub upload: UploadFilter,
    /// Maximum number of results to return.
    pub limit: Option<u32>,
    /// If true, order by day descending (newest first). Default: true.
    pub newest_first: bool,
}

impl HistoryQuery {
    /// Create a new query with default settings.
    ///
    /// Default behavior:
    /// - No sensor filter (all sensors)
    /// - Any upload state
    /// - No limit
    /// - Ordered by newest first
    pub fn new() -> Self {
        Self {
            newest_first: true,
            ..Default::default()
        }
    }

    /// Restrict to a sensor. Can be called repeatedly.
    pub fn sensor(mut self, sensor_id: Uuid) -> Self {
        self.sensor_ids.push(sensor_id);
        self
    }

    /// Restrict to a set of sensors.
    pub fn sensors(mut self, sensor_ids: impl IntoIterator<Item = Uuid>) -> Self {
        self.sensor_ids.extend(sensor_ids);
        self
    }

    /// Only blocks that were never uploaded.
    pub fn never_uploaded(mut self) -> Self {
        self.upload = UploadFilter::NeverUploaded;
        self
    }

    /// Only blocks uploaded at least once.
    pub fn uploaded(mut self) -> Self {
        self.upload = UploadFilter::Uploaded;
        self
    }

    /// Only blocks whose day marker is after their upload time.
    pub fn open_since_upload(mut self) -> Self {
        self.upload = UploadFilter::OpenSinceUpload;
        self
    }

    /// Limit the maximum number of results returned.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Order results by oldest day first.
    pub fn oldest_first(mut self) -> Self {
        self.newest_first = false;
        self
    }

    /// Build the SQL WHERE clause and parameters.
    pub(crate) fn build_where(&self) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions: Vec<String> = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if !self.sensor_ids.is_empty() {
            let placeholders = vec!["?"; self.sensor_ids.len()].join(", ");
            conditions.push(format!("sensor_id IN ({})", placeholders));
            for id in &self.sensor_ids {
                params.push(Box::new(id.hyphenated().to_string()));
            }
        }

        match self.upload {
            UploadFilter::Any => {}
            UploadFilter::NeverUploaded => conditions.push("uploaded_at IS NULL".to_string()),
            UploadFilter::Uploaded => conditions.push("uploaded_at IS NOT NULL".to_string()),
            UploadFilter::OpenSinceUpload => conditions
                .push("uploaded_at IS NOT NULL AND time_stamp > uploaded_at".to_string()),
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    /// Build the full SQL query.
    pub(crate) fn build_sql(&self) -> String {
        let (where_clause, _) = self.build_where();
        let order = if self.newest_first { "DESC" } else { "ASC" };

        let mut sql = format!(
            "SELECT sensor_id, location_id, time_stamp, uploaded_at, raw_data \
             FROM history {} ORDER BY day {}, sensor_id ASC",
            where_clause, order
        );

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_query_new_defaults() {
        let query = HistoryQuery::new();
        assert!(query.sensor_ids.is_empty());
        assert_eq!(query.upload, UploadFilter::Any);
        assert!(query.limit.is_none());
        assert!(query.newest_first);
    }

    #[test]
    fn test_history_query_default_is_different_from_new() {
        assert!(!HistoryQuery::default().newest_first);
        assert!(HistoryQuery::new().newest_first);
    }

    #[test]
    fn test_build_where_empty() {
        let (where_clause, params) = HistoryQuery::new().build_where();
        assert_eq!(where_clause, "");
        assert!(params.is_empty());
    }

    #[test]
    fn test_build_where_sensors() {
        let query = HistoryQuery::new().sensors([Uuid::nil(), Uuid::max()]);
        let (where_clause, params) = query.build_where();
        assert_eq!(where_clause, "WHERE sensor_id IN (?, ?)");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_build_where_sensor_and_upload_state() {
        let query = HistoryQuery::new().sensor(Uuid::nil()).never_uploaded();
        let (where_clause, params) = query.build_where();
        assert_eq!(
            where_clause,
            "WHERE sensor_id IN (?) AND uploaded_at IS NULL"
        );
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_build_where_open_since_upload() {
        let (where_clause, _) = HistoryQuery::new().open_since_upload().build_where();
        assert!(where_clause.contains("time_stamp > uploaded_at"));
    }

    #[test]
    fn test_build_sql_order_and_limit() {
        let sql = HistoryQuery::new().uploaded().limit(1).build_sql();
        assert!(sql.contains("WHERE uploaded_at IS NOT NULL"));
        assert!(sql.contains("ORDER BY day DESC"));
        assert!(sql.ends_with("LIMIT 1"));

        let sql = HistoryQuery::new().oldest_first().build_sql();
        assert!(sql.contains("ORDER BY day ASC"));
    }
}
