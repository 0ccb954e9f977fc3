//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with proper user agent strings
//! - GET requests whose body is handed back as a byte stream
//! - HEAD requests used by the link prober
//! - Transport error classification
//!
//! The [`Fetcher`] trait is the seam between the crawl engine and the
//! network; tests plug in a deterministic implementation.

use crate::config::UserAgentConfig;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::{header::CONTENT_TYPE, redirect::Policy, Client, Method};
use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Accept header sent with every page and probe request
pub const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Maximum redirect hops followed by the HTTP client
const MAX_REDIRECTS: usize = 10;

/// Transport-level failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("connection closed before a response was received")]
    ConnectionClosed,

    #[error("{0}")]
    Other(String),
}

/// Request method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMethod {
    Get,
    Head,
}

/// A single HTTP request
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: FetchMethod,
    pub url: Url,
    /// Extra request headers as `(name, value)` pairs
    pub headers: Vec<(String, String)>,
    /// Whole-request deadline; None leaves it to the client default
    pub timeout: Option<Duration>,
}

impl FetchRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: FetchMethod::Get,
            url,
            headers: Vec::new(),
            timeout: None,
        }
    }

    pub fn head(url: Url) -> Self {
        Self {
            method: FetchMethod::Head,
            ..Self::get(url)
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Streamed response body
pub type BodyStream = BoxStream<'static, Result<Bytes, FetchError>>;

/// Response head plus streamed body
pub struct FetchResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: BodyStream,
}

impl FetchResponse {
    /// Builds a response whose body arrives as the given chunks
    pub fn from_chunks(status: u16, content_type: Option<&str>, chunks: Vec<Bytes>) -> Self {
        Self {
            status,
            content_type: content_type.map(str::to_string),
            body: stream::iter(chunks.into_iter().map(Ok)).boxed(),
        }
    }

    /// Builds a response with a single-chunk body
    pub fn from_bytes(status: u16, content_type: Option<&str>, body: impl Into<Bytes>) -> Self {
        Self::from_chunks(status, content_type, vec![body.into()])
    }

    /// Returns true when the content type names an HTML document
    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| {
                let ct = ct.to_ascii_lowercase();
                ct.contains("text/html") || ct.contains("application/xhtml+xml")
            })
            .unwrap_or(false)
    }
}

impl fmt::Debug for FetchResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchResponse")
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Pluggable HTTP transport
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Sends the request and returns once the response head arrived
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
/// * `timeout` - Default whole-request timeout
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use page_audit::config::UserAgentConfig;
/// use page_audit::crawler::build_http_client;
/// use std::time::Duration;
///
/// let client = build_http_client(&UserAgentConfig::default(), Duration::from_secs(30)).unwrap();
/// ```
pub fn build_http_client(
    config: &UserAgentConfig,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Classifies a reqwest error into a [`FetchError`]
pub fn classify_reqwest_error(err: &reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::Timeout;
    }

    if closed_before_response(err) {
        return FetchError::ConnectionClosed;
    }

    if err.is_connect() {
        return FetchError::Connect(root_cause(err));
    }

    FetchError::Other(root_cause(err))
}

/// Walks the source chain looking for hyper's "connection closed" error
fn closed_before_response(err: &reqwest::Error) -> bool {
    let mut source: Option<&(dyn StdError + 'static)> = err.source();
    while let Some(cause) = source {
        let text = cause.to_string().to_ascii_lowercase();
        if text.contains("connection closed") || text.contains("incomplete message") {
            return true;
        }
        source = cause.source();
    }
    false
}

fn root_cause(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source: Option<&(dyn StdError + 'static)> = err.source();
    while let Some(cause) = source {
        message = cause.to_string();
        source = cause.source();
    }
    message
}

/// [`Fetcher`] backed by a shared reqwest client
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds the client from the user agent configuration
    pub fn from_config(config: &UserAgentConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self::new(build_http_client(config, timeout)?))
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        let method = match request.method {
            FetchMethod::Get => Method::GET,
            FetchMethod::Head => Method::HEAD,
        };

        let mut builder = self.client.request(method, request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| classify_reqwest_error(&e)))
            .boxed();

        Ok(FetchResponse {
            status,
            content_type,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_http_client() {
        let client = build_http_client(&UserAgentConfig::default(), Duration::from_secs(30));
        assert!(client.is_ok());
    }

    #[test]
    fn test_request_builders() {
        let url = Url::parse("https://example.com/").unwrap();
        let request = FetchRequest::head(url.clone())
            .header("Accept", ACCEPT_HTML)
            .timeout(Duration::from_secs(5));

        assert_eq!(request.method, FetchMethod::Head);
        assert_eq!(request.url, url);
        assert_eq!(request.headers.len(), 1);
        assert_eq!(request.timeout, Some(Duration::from_secs(5)));
        assert_eq!(FetchRequest::get(url).method, FetchMethod::Get);
    }

    #[test]
    fn test_is_html() {
        let html = FetchResponse::from_bytes(200, Some("text/html; charset=utf-8"), "");
        assert!(html.is_html());

        let xhtml = FetchResponse::from_bytes(200, Some("application/xhtml+xml"), "");
        assert!(xhtml.is_html());

        let json = FetchResponse::from_bytes(200, Some("application/json"), "{}");
        assert!(!json.is_html());

        let missing = FetchResponse::from_bytes(200, None, "");
        assert!(!missing.is_html());
    }

    #[tokio::test]
    async fn test_from_chunks_streams_in_order() {
        let mut response = FetchResponse::from_chunks(
            200,
            None,
            vec![Bytes::from_static(b"<ti"), Bytes::from_static(b"tle>")],
        );
        let mut collected = Vec::new();
        while let Some(chunk) = response.body.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(collected, b"<title>");
    }

    #[tokio::test]
    async fn test_connection_refused_is_connect_error() {
        let fetcher =
            ReqwestFetcher::from_config(&UserAgentConfig::default(), Duration::from_secs(5))
                .unwrap();
        // Port 9 (discard) is closed on test machines.
        let url = Url::parse("http://127.0.0.1:9/").unwrap();
        let err = fetcher.fetch(FetchRequest::get(url)).await.unwrap_err();
        assert!(matches!(err, FetchError::Connect(_) | FetchError::Other(_)));
    }
}
