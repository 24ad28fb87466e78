//! HTTP transport for favicon probing.
//!
//! The resolver follows redirects itself, one hop at a time, so the
//! production transport disables reqwest's redirect handling for
//! header probes and reports each hop's status line and `Location`
//! header verbatim. Body fetches do follow redirects, since a page
//! body is only useful at its final location.

pub mod url;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, header};
use std::time::Duration;

use favik_core::Error;

/// `Location` header of a redirect response.
///
/// Misbehaving servers occasionally emit the header more than once;
/// resolving a `Multiple` always follows the last value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Single(String),
    Multiple(Vec<String>),
}

impl Location {
    /// The redirect target to follow.
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::Single(value) => Some(value),
            Self::Multiple(values) => values.last().map(String::as_str),
        }
    }
}

/// Response metadata for one probe hop.
#[derive(Debug, Clone)]
pub struct RawHeader {
    /// First response line, e.g. `HTTP/1.1 301 Moved Permanently`.
    pub status_line: String,

    /// `Location` header, when the response carried one.
    pub location: Option<Location>,
}

impl RawHeader {
    /// Numeric status parsed from position 1 of the status line.
    pub fn status(&self) -> Option<u16> {
        self.status_line.split_whitespace().nth(1)?.parse().ok()
    }
}

/// Transport capability consumed by the resolver.
///
/// Both methods return `None` when the transport produced no usable
/// response at all. Tests substitute deterministic fakes.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue a single request for `url` without following redirects
    /// and report its status line and `Location` header.
    async fn retrieve_header(&self, url: &str) -> Option<RawHeader>;

    /// Fetch the body at `url`.
    async fn retrieve_url(&self, url: &str) -> Option<Bytes>;
}

/// Configuration for the HTTP transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// User agent string (default: "favik/0.1")
    pub user_agent: String,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Redirect cap for body fetches (default: 10)
    pub max_redirects: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self { user_agent: "favik/0.1".to_string(), timeout: Duration::from_millis(20000), max_redirects: 10 }
    }
}

/// reqwest-backed transport.
pub struct HttpTransport {
    /// Redirects disabled; the resolver walks hops itself.
    probe: Client,
    /// Redirects followed up to the configured cap.
    body: Client,
}

impl HttpTransport {
    /// Create a transport with the given configuration.
    pub fn new(config: TransportConfig) -> Result<Self, Error> {
        let probe = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Http(format!("failed to build HTTP client: {e}")))?;

        let body = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Http(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { probe, body })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn retrieve_header(&self, url: &str) -> Option<RawHeader> {
        let response = match self.probe.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!("header probe for {} failed: {}", url, e);
                return None;
            }
        };

        let status = response.status();
        let status_line = format!("HTTP/1.1 {} {}", status.as_u16(), status.canonical_reason().unwrap_or(""));

        let mut locations: Vec<String> = response
            .headers()
            .get_all(header::LOCATION)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .map(str::to_string)
            .collect();

        let location = match locations.len() {
            0 => None,
            1 => Some(Location::Single(locations.remove(0))),
            _ => Some(Location::Multiple(locations)),
        };

        Some(RawHeader { status_line, location })
    }

    async fn retrieve_url(&self, url: &str) -> Option<Bytes> {
        let response = self
            .body
            .get(url)
            .header(
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .send()
            .await
            .map_err(|e| tracing::debug!("body fetch for {} failed: {}", url, e))
            .ok()?;

        response.bytes().await.ok()
    }
}
