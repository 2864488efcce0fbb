//! Page fetcher
//!
//! Performs an authenticated GET and parses the body into a queryable
//! document. Transport failures are classified and reported upward; this
//! layer never retries.

use crate::crawler::Session;
use scraper::Html;
use thiserror::Error;
use url::Url;

/// A transport-level failure while fetching one URL
#[derive(Debug, Error)]
#[error("failed to fetch {url}: {source}")]
pub struct FetchError {
    pub url: String,
    pub source: reqwest::Error,
}

/// Coarse classification of a [`FetchError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// The request or the body read timed out
    Timeout,
    /// Connection refused, DNS failure, TLS failure
    Connect,
    /// The connection broke while reading the body
    Body,
    Other,
}

impl FetchError {
    pub fn new(url: &Url, source: reqwest::Error) -> Self {
        Self {
            url: url.to_string(),
            source,
        }
    }

    pub fn kind(&self) -> FetchErrorKind {
        if self.source.is_timeout() {
            FetchErrorKind::Timeout
        } else if self.source.is_connect() {
            FetchErrorKind::Connect
        } else if self.source.is_body() || self.source.is_decode() {
            FetchErrorKind::Body
        } else {
            FetchErrorKind::Other
        }
    }
}

/// A fetched and parsed page
///
/// `url` is the URL that was requested; relative links resolve against it.
pub struct Page {
    url: Url,
    document: Html,
}

impl Page {
    /// Parses HTML text fetched from `url`
    ///
    /// html5ever recovers from malformed markup, so parsing itself never fails.
    pub fn parse(url: Url, html: &str) -> Self {
        Self {
            url,
            document: Html::parse_document(html),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn document(&self) -> &Html {
        &self.document
    }
}

/// Fetches `url` with the session's cookies and parses the response body
///
/// Non-2xx responses are not errors: their body is parsed like any other.
pub async fn fetch_page(session: &Session, url: &Url) -> Result<Page, FetchError> {
    let response = session
        .client()
        .get(url.clone())
        .send()
        .await
        .map_err(|e| FetchError::new(url, e))?;

    let status = response.status();
    if !status.is_success() {
        tracing::debug!("{} answered HTTP {}", url, status.as_u16());
    }

    let body = response.text().await.map_err(|e| FetchError::new(url, e))?;

    Ok(Page::parse(url.clone(), &body))
}
