//! Mock transport implementation for testing.
//!
//! This module provides a scripted [`Transport`] so the sync engine can be
//! exercised end to end without a server.
//!
//! # Features
//!
//! - **Scripted responses**: fixed bodies per table, or queues of pages per
//!   path prefix for paginated history
//! - **Failure injection**: fail GETs per path, or fail the n-th POST
//! - **Request recording**: every call is recorded for later assertions

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use verdant_store::Credentials;

use crate::error::{Error, Result};
use crate::transport::Transport;

/// HTTP method of a recorded request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMethod {
    Get,
    Post,
}

/// A request observed by [`MockTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    /// GET or POST.
    pub method: RequestMethod,
    /// Requested path or table.
    pub path: String,
    /// Posted body, `None` for GETs.
    pub body: Option<String>,
    /// Whether credentials were attached.
    pub authenticated: bool,
}

#[derive(Debug, Clone)]
enum MockResponse {
    Body(String),
    Fail { status: u16, message: String },
}

impl MockResponse {
    fn into_result(self, path: &str) -> Result<String> {
        match self {
            MockResponse::Body(body) => Ok(body),
            MockResponse::Fail { status, message } => {
                Err(Error::transport(path, message, Some(status)))
            }
        }
    }
}

/// A scripted transport for testing.
///
/// GET lookups try the full path first, then drop trailing `/` segments one by
/// one, so a queue registered for `SensorsHistory/{device}` answers every page
/// request of that device. At each candidate, a queued page is served before a
/// fixed response. Unscripted paths answer with an empty JSON array.
///
/// # Example
///
/// ```
/// use verdant_core::{MockTransport, Transport};
///
/// #[tokio::main]
/// async fn main() {
///     let mock = MockTransport::new();
///     mock.set_response("Parameters", "[]").await;
///     mock.push_page("SensorsHistory/dev-1", "[1]").await;
///
///     assert_eq!(mock.get("SensorsHistory/dev-1/0/15", None).await.unwrap(), "[1]");
///     assert_eq!(mock.get("SensorsHistory/dev-1/9/15", None).await.unwrap(), "[]");
///     assert_eq!(mock.gets().await.len(), 2);
/// }
/// ```
#[derive(Debug, Default)]
pub struct MockTransport {
    fixed: Mutex<HashMap<String, MockResponse>>,
    queued: Mutex<HashMap<String, VecDeque<MockResponse>>>,
    post_failures: Mutex<HashMap<usize, u16>>,
    failing_tables: Mutex<HashSet<String>>,
    requests: Mutex<Vec<RecordedRequest>>,
    post_count: AtomicUsize,
}

impl MockTransport {
    /// Create a mock that answers every GET with `[]` and accepts every POST.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer GETs for `path` with `body` until replaced.
    pub async fn set_response(&self, path: &str, body: impl Into<String>) {
        self.fixed
            .lock()
            .await
            .insert(path.to_string(), MockResponse::Body(body.into()));
    }

    /// Fail GETs for `path` with `status` until replaced.
    pub async fn fail_get(&self, path: &str, status: u16) {
        self.fixed.lock().await.insert(
            path.to_string(),
            MockResponse::Fail {
                status,
                message: format!("mock failure for {path}"),
            },
        );
    }

    /// Queue one page for GETs under `path`.
    pub async fn push_page(&self, path: &str, body: impl Into<String>) {
        self.queued
            .lock()
            .await
            .entry(path.to_string())
            .or_default()
            .push_back(MockResponse::Body(body.into()));
    }

    /// Queue one failing response for GETs under `path`.
    pub async fn push_failure(&self, path: &str, status: u16) {
        self.queued
            .lock()
            .await
            .entry(path.to_string())
            .or_default()
            .push_back(MockResponse::Fail {
                status,
                message: format!("mock failure for {path}"),
            });
    }

    /// Fail the POST with the given zero-based call index.
    pub async fn fail_post_at(&self, index: usize, status: u16) {
        self.post_failures.lock().await.insert(index, status);
    }

    /// Fail every POST to `table`.
    pub async fn fail_posts_to(&self, table: &str) {
        self.failing_tables.lock().await.insert(table.to_string());
    }

    /// All recorded requests, in call order.
    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().await.clone()
    }

    /// Recorded GETs, in call order.
    pub async fn gets(&self) -> Vec<RecordedRequest> {
        self.filtered(|r| r.method == RequestMethod::Get).await
    }

    /// Recorded POSTs, in call order.
    pub async fn posts(&self) -> Vec<RecordedRequest> {
        self.filtered(|r| r.method == RequestMethod::Post).await
    }

    /// Recorded POSTs to `table`, in call order.
    pub async fn posts_to(&self, table: &str) -> Vec<RecordedRequest> {
        self.filtered(|r| r.method == RequestMethod::Post && r.path == table)
            .await
    }

    /// Number of POSTs attempted so far.
    pub fn post_count(&self) -> usize {
        self.post_count.load(Ordering::SeqCst)
    }

    /// Forget recorded requests. Scripts and the POST counter are kept.
    pub async fn clear_requests(&self) {
        self.requests.lock().await.clear();
    }

    async fn filtered(&self, keep: impl Fn(&RecordedRequest) -> bool) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .await
            .iter()
            .filter(|r| keep(r))
            .cloned()
            .collect()
    }

    async fn record(&self, request: RecordedRequest) {
        self.requests.lock().await.push(request);
    }

    async fn lookup(&self, path: &str) -> Option<MockResponse> {
        let mut candidate = path;
        loop {
            if let Some(queue) = self.queued.lock().await.get_mut(candidate)
                && let Some(response) = queue.pop_front()
            {
                return Some(response);
            }
            if let Some(response) = self.fixed.lock().await.get(candidate) {
                return Some(response.clone());
            }
            candidate = &candidate[..candidate.rfind('/')?];
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, path: &str, credentials: Option<&Credentials>) -> Result<String> {
        self.record(RecordedRequest {
            method: RequestMethod::Get,
            path: path.to_string(),
            body: None,
            authenticated: credentials.is_some(),
        })
        .await;

        match self.lookup(path).await {
            Some(response) => response.into_result(path),
            None => Ok("[]".to_string()),
        }
    }

    async fn post(&self, table: &str, payload: String, _credentials: &Credentials) -> Result<()> {
        let index = self.post_count.fetch_add(1, Ordering::SeqCst);
        self.record(RecordedRequest {
            method: RequestMethod::Post,
            path: table.to_string(),
            body: Some(payload),
            authenticated: true,
        })
        .await;

        if let Some(status) = self.post_failures.lock().await.get(&index) {
            return Err(Error::transport(
                table,
                format!("mock failure on post #{index}"),
                Some(*status),
            ));
        }
        if self.failing_tables.lock().await.contains(table) {
            return Err(Error::transport(
                table,
                format!("mock failure for {table}"),
                Some(500),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        Credentials::new("1", "token")
    }

    #[tokio::test]
    async fn test_unscripted_get_is_empty_array() {
        let mock = MockTransport::new();
        assert_eq!(mock.get("Anything", None).await.unwrap(), "[]");
    }

    #[tokio::test]
    async fn test_fixed_response_is_reused() {
        let mock = MockTransport::new();
        mock.set_response("Parameters", r#"[{"ID":1}]"#).await;

        for _ in 0..2 {
            assert_eq!(
                mock.get("Parameters", None).await.unwrap(),
                r#"[{"ID":1}]"#
            );
        }
    }

    #[tokio::test]
    async fn test_pages_are_served_in_order_by_prefix() {
        let mock = MockTransport::new();
        mock.push_page("SensorsHistory/d", "[1]").await;
        mock.push_page("SensorsHistory/d", "[2]").await;

        assert_eq!(mock.get("SensorsHistory/d/0/15", None).await.unwrap(), "[1]");
        assert_eq!(mock.get("SensorsHistory/d/5/15", None).await.unwrap(), "[2]");
        assert_eq!(mock.get("SensorsHistory/d/9/15", None).await.unwrap(), "[]");
        assert_eq!(mock.get("SensorsHistory/other/0/15", None).await.unwrap(), "[]");
    }

    #[tokio::test]
    async fn test_get_failure() {
        let mock = MockTransport::new();
        mock.fail_get("Sensors", 503).await;

        let err = mock.get("Sensors", Some(&creds())).await.unwrap_err();
        assert!(matches!(err, Error::Transport { status: Some(503), .. }));
        assert!(mock.gets().await[0].authenticated);
    }

    #[tokio::test]
    async fn test_post_failure_by_index() {
        let mock = MockTransport::new();
        mock.fail_post_at(1, 500).await;

        assert!(mock.post("A", "[]".into(), &creds()).await.is_ok());
        assert!(mock.post("A", "[]".into(), &creds()).await.is_err());
        assert!(mock.post("A", "[]".into(), &creds()).await.is_ok());
        assert_eq!(mock.post_count(), 3);
        assert_eq!(mock.posts_to("A").await.len(), 3);
    }

    #[tokio::test]
    async fn test_post_failure_by_table() {
        let mock = MockTransport::new();
        mock.fail_posts_to("Devices").await;

        assert!(mock.post("Devices", "[]".into(), &creds()).await.is_err());
        assert!(mock.post("Sensors", "[]".into(), &creds()).await.is_ok());
    }
}
