//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the fetch layer, including:
//! - Building HTTP clients with the descriptive user agent and fixed headers
//! - GET requests that read the full body or fail
//! - Offline mode, which refuses every request before it leaves the process
//! - Error classification by status code
//!
//! There is no retry: failures go back to the caller, which decides whether
//! to skip the story or stop.

use crate::config::ClientConfig;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Errors that can occur while fetching
#[derive(Debug, Error)]
pub enum FetchError {
    /// The server answered with a non-success status
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    /// Offline mode is on and the content is not cached
    #[error("offline mode: not fetching {url}")]
    Offline { url: String },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("request to {url} failed")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("could not build HTTP client")]
    Client(#[source] reqwest::Error),
}

impl FetchError {
    /// The HTTP status, for status errors
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND.as_u16())
    }

    pub fn is_forbidden(&self) -> bool {
        self.status() == Some(StatusCode::FORBIDDEN.as_u16())
    }

    fn from_reqwest(url: &Url, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else {
            Self::Request {
                url: url.to_string(),
                source: e,
            }
        }
    }
}

/// A fully read response
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// Final URL after redirects
    pub url: String,
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl FetchResponse {
    /// Content-Type header value
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The outbound client configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use whateley_fetch::config::ClientConfig;
/// use whateley_fetch::crawler::build_http_client;
///
/// let client = build_http_client(&ClientConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &ClientConfig) -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,*/*;q=0.8"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

    Client::builder()
        .user_agent(config.user_agent.clone())
        .default_headers(headers)
        .timeout(config.timeout())
        .connect_timeout(config.timeout())
        .gzip(true)
        .brotli(true)
        .build()
}

/// HTTP client with offline enforcement
#[derive(Debug, Clone)]
pub struct FetchClient {
    client: Client,
    offline: bool,
}

impl FetchClient {
    /// Creates a client from the configuration
    pub fn new(config: &ClientConfig, offline: bool) -> Result<Self, FetchError> {
        let client = build_http_client(config).map_err(FetchError::Client)?;
        Ok(Self { client, offline })
    }

    pub fn is_offline(&self) -> bool {
        self.offline
    }

    /// Fetches a URL and reads the whole body
    ///
    /// # Arguments
    ///
    /// * `url` - The URL to fetch
    /// * `method` - HTTP method; story and asset lookups use GET
    ///
    /// # Returns
    ///
    /// * `Ok(FetchResponse)` - 2xx response with its body
    /// * `Err(FetchError::Offline)` - Offline mode is on; nothing was sent
    /// * `Err(FetchError::Status)` - Server answered with another status
    /// * `Err(FetchError::Timeout | Request)` - Transport failure
    pub async fn fetch(&self, url: &Url, method: Method) -> Result<FetchResponse, FetchError> {
        if self.offline {
            return Err(FetchError::Offline {
                url: url.to_string(),
            });
        }

        debug!("> {} {}", method, url);
        let response = self
            .client
            .request(method.clone(), url.clone())
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = response.status();
        debug!("< {} {} {}", method, url, status.as_u16());

        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let final_url = response.url().to_string();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        Ok(FetchResponse {
            url: final_url,
            status: status.as_u16(),
            headers,
            body: body.to_vec(),
        })
    }

    /// GET shorthand
    pub async fn get(&self, url: &Url) -> Result<FetchResponse, FetchError> {
        self.fetch(url, Method::GET).await
    }
}
