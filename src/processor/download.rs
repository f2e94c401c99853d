//! Image and header fetching over HTTP

use chrono::DateTime;
use reqwest::Client;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderMap, HeaderName, LAST_MODIFIED, SERVER};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::{ScrapeError, ScrapeResult};
use crate::utils::{CHROME_USER_AGENT, with_timeout};

/// Failure processing a single result
///
/// Never aborts a run: the coordinator counts it under [`kind`](Self::kind)
/// and moves on to the next record.
#[derive(Debug, Error)]
pub enum ItemError {
    #[error("Download of {url} timed out after {after:?}")]
    Timeout { url: String, after: Duration },

    #[error("HTTP {status} fetching {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("{url} served non-image content ({content_type})")]
    NotAnImage { url: String, content_type: String },

    #[error("Request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("Could not decode image from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("Could not encode image: {0}")]
    Encode(String),

    #[error("Could not store image: {0}")]
    Io(#[from] std::io::Error),

    /// The blocking image task panicked or was cancelled
    #[error("Image task failed: {0}")]
    Task(String),
}

impl ItemError {
    /// Stable error-kind key used by the error tally
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::HttpStatus { .. } => "http_status",
            Self::NotAnImage { .. } => "not_an_image",
            Self::Transport { .. } => "transport",
            Self::Decode { .. } => "decode",
            Self::Encode(_) => "encode",
            Self::Io(_) => "io",
            Self::Task(_) => "task",
        }
    }

    fn transport(url: &str, err: &reqwest::Error) -> Self {
        Self::Transport {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

/// Descriptive response headers recorded in the manifest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlHeaders {
    /// Milliseconds since the Unix epoch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_length: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
}

impl UrlHeaders {
    #[must_use]
    pub fn from_header_map(headers: &HeaderMap) -> Self {
        let text = |name: HeaderName| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };

        Self {
            last_modified: text(LAST_MODIFIED).and_then(|raw| parse_http_date_millis(&raw)),
            content_type: text(CONTENT_TYPE),
            content_length: text(CONTENT_LENGTH),
            server: text(SERVER),
        }
    }
}

/// Parse an HTTP date (`Wed, 21 Oct 2015 07:28:00 GMT`) to epoch milliseconds
#[must_use]
pub fn parse_http_date_millis(raw: &str) -> Option<i64> {
    match DateTime::parse_from_rfc2822(raw.trim()) {
        Ok(date) => Some(date.timestamp_millis()),
        Err(e) => {
            debug!("Unparseable last-modified '{}': {}", raw, e);
            None
        }
    }
}

/// Whether a declared content type may carry image bytes
fn is_image_content_type(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime.starts_with("image/") || mime == "application/octet-stream" || mime == "binary/octet-stream"
}

/// HTTP client for image bytes and their headers
#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
    download_timeout: Duration,
    header_timeout: Duration,
}

impl Downloader {
    pub fn new(download_timeout: Duration, header_timeout: Duration) -> ScrapeResult<Self> {
        let client = Client::builder()
            .user_agent(CHROME_USER_AGENT)
            .build()
            .map_err(|e| ScrapeError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            download_timeout,
            header_timeout,
        })
    }

    /// Fetch the raw bytes of an image
    ///
    /// The whole exchange, body included, is bounded by the download timeout.
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, ItemError> {
        let request = async {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| ItemError::transport(url, &e))?;

            let status = response.status();
            if !status.is_success() {
                return Err(ItemError::HttpStatus {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }

            if let Some(content_type) = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                && !is_image_content_type(content_type)
            {
                return Err(ItemError::NotAnImage {
                    url: url.to_string(),
                    content_type: content_type.to_string(),
                });
            }

            let bytes = response
                .bytes()
                .await
                .map_err(|e| ItemError::transport(url, &e))?;
            Ok(bytes.to_vec())
        };

        with_timeout(request, self.download_timeout)
            .await
            .map_err(|elapsed| ItemError::Timeout {
                url: url.to_string(),
                after: elapsed.after,
            })?
    }

    /// Fetch descriptive headers with a `HEAD` request
    ///
    /// Best effort: a failed, unsuccessful or slow request yields empty headers.
    pub async fn fetch_headers(&self, url: &str) -> UrlHeaders {
        match with_timeout(self.client.head(url).send(), self.header_timeout).await {
            Ok(Ok(response)) if response.status().is_success() => {
                UrlHeaders::from_header_map(response.headers())
            }
            Ok(Ok(response)) => {
                warn!("HEAD {} returned {}", url, response.status());
                UrlHeaders::default()
            }
            Ok(Err(e)) => {
                warn!("HEAD {} failed: {}", url, e);
                UrlHeaders::default()
            }
            Err(elapsed) => {
                warn!("HEAD {} timed out after {:?}", url, elapsed.after);
                UrlHeaders::default()
            }
        }
    }
}
