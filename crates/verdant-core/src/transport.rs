//! Transport abstraction for the greenhouse API.
//!
//! The sync engine only needs two operations from the network: fetch the JSON
//! of a named table (or history page path) and post a JSON array to a named
//! table. [`Transport`] captures exactly that, so the engine runs the same
//! against [`HttpTransport`] and [`MockTransport`](crate::MockTransport).

use async_trait::async_trait;

use verdant_store::Credentials;

use crate::error::Result;

/// Header carrying the user id on authenticated requests.
pub const USER_ID_HEADER: &str = "X-User-Id";
/// Header carrying the access token on authenticated requests.
pub const TOKEN_HEADER: &str = "X-Token";

/// Request/response access to the greenhouse API.
///
/// # Example
///
/// ```
/// use verdant_core::{Result, Transport};
///
/// async fn parameter_count<T: Transport>(transport: &T) -> Result<usize> {
///     let body = transport.get("Parameters", None).await?;
///     Ok(body.matches("\"ID\"").count())
/// }
/// ```
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch the raw JSON payload at `path`.
    ///
    /// `path` is a table name or a history page path such as
    /// `SensorsHistory/{device}/{since}/{days}`.
    async fn get(&self, path: &str, credentials: Option<&Credentials>) -> Result<String>;

    /// Post a JSON payload to `table`.
    async fn post(&self, table: &str, payload: String, credentials: &Credentials) -> Result<()>;
}

#[cfg(feature = "http")]
pub use http::HttpTransport;

#[cfg(feature = "http")]
mod http {
    use std::time::Duration;

    use async_trait::async_trait;
    use reqwest::{Client, RequestBuilder, Response};
    use tracing::debug;

    use verdant_store::Credentials;

    use super::{TOKEN_HEADER, Transport, USER_ID_HEADER};
    use crate::error::{Error, Result};

    /// [`Transport`] over HTTP using `reqwest`.
    ///
    /// `GET {base}/{path}` and `POST {base}/{table}` with JSON bodies.
    /// Any non-2xx status becomes [`Error::Transport`] carrying the status and
    /// the response body.
    ///
    /// ```no_run
    /// use std::time::Duration;
    /// use verdant_core::HttpTransport;
    ///
    /// let transport = HttpTransport::new("https://greenhouse.example/api", Duration::from_secs(30))?;
    /// assert_eq!(transport.base_url(), "https://greenhouse.example/api");
    /// # Ok::<(), verdant_core::Error>(())
    /// ```
    #[derive(Debug, Clone)]
    pub struct HttpTransport {
        client: Client,
        base_url: String,
    }

    impl HttpTransport {
        /// Create a transport with a request timeout.
        pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
            let client = Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| Error::invalid_config(format!("HTTP client: {e}")))?;

            Self::with_client(base_url, client)
        }

        /// Create a transport with a custom reqwest Client.
        pub fn with_client(base_url: &str, client: Client) -> Result<Self> {
            // Normalize URL (remove trailing slash)
            let base_url = base_url.trim_end_matches('/').to_string();

            if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                return Err(Error::invalid_config(format!(
                    "URL must start with http:// or https://, got: {}",
                    base_url
                )));
            }

            Ok(Self { client, base_url })
        }

        /// Get the base URL.
        pub fn base_url(&self) -> &str {
            &self.base_url
        }

        fn url(&self, path: &str) -> String {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }

        async fn send(&self, path: &str, request: RequestBuilder) -> Result<Response> {
            let response = request
                .send()
                .await
                .map_err(|e| Error::transport(path, e.to_string(), None))?;

            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            let body = response.text().await.unwrap_or_default();
            let message = if body.is_empty() {
                status.to_string()
            } else {
                body
            };
            Err(Error::transport(path, message, Some(status.as_u16())))
        }
    }

    fn authenticate(request: RequestBuilder, credentials: &Credentials) -> RequestBuilder {
        request
            .header(USER_ID_HEADER, &credentials.user_id)
            .header(TOKEN_HEADER, &credentials.token)
    }

    #[async_trait]
    impl Transport for HttpTransport {
        async fn get(&self, path: &str, credentials: Option<&Credentials>) -> Result<String> {
            let url = self.url(path);
            debug!("GET {}", url);

            let mut request = self.client.get(&url);
            if let Some(credentials) = credentials {
                request = authenticate(request, credentials);
            }

            let response = self.send(path, request).await?;
            response
                .text()
                .await
                .map_err(|e| Error::transport(path, e.to_string(), None))
        }

        async fn post(
            &self,
            table: &str,
            payload: String,
            credentials: &Credentials,
        ) -> Result<()> {
            let url = self.url(table);
            debug!("POST {} ({} bytes)", url, payload.len());

            let request = authenticate(
                self.client
                    .post(&url)
                    .header(reqwest::header::CONTENT_TYPE, "application/json")
                    .body(payload),
                credentials,
            );

            self.send(table, request).await?;
            Ok(())
        }
    }

}
