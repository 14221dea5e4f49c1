//! HTTP client for byte transfers.

use std::time::Duration;

use reqwest::header::{COOKIE, RANGE};
use reqwest::{Client, Response};
use tracing::debug;
use url::Url;

use super::DownloadError;
use crate::user_agent;

/// Default connect timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 15;

/// Default read (idle) timeout in seconds.
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 15;

/// HTTP client wrapper used by transfer workers.
///
/// There is no whole-request timeout: a large file may stream for hours.
/// Only the connect phase and each read are bounded.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Creates a client with the default 15 s connect and read timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::ClientBuild`] if the TLS backend fails to initialize.
    pub fn new() -> Result<Self, DownloadError> {
        Self::with_timeouts(
            Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS),
        )
    }

    /// Creates a client with explicit connect and read timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::ClientBuild`] if the TLS backend fails to initialize.
    pub fn with_timeouts(connect: Duration, read: Duration) -> Result<Self, DownloadError> {
        // Transparent decompression would make byte offsets disagree with
        // Content-Length and Range, so it stays off here.
        let client = Client::builder()
            .connect_timeout(connect)
            .read_timeout(read)
            .gzip(false)
            .user_agent(user_agent::default_download_user_agent())
            .build()
            .map_err(DownloadError::ClientBuild)?;
        Ok(Self { client })
    }

    /// Sends a GET for `url`, asking for bytes from `offset` onward when it is non-zero.
    ///
    /// `auth_token` is sent as the provider's `accountToken` cookie. Redirects
    /// are followed. Status checking is left to the caller because a resume
    /// must tell 200 from 206 (and 416) apart.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidUrl`] for an unparsable URL, or
    /// [`DownloadError::Network`]/[`DownloadError::Timeout`] if the request fails.
    pub async fn open(
        &self,
        url: &str,
        offset: u64,
        auth_token: Option<&str>,
    ) -> Result<Response, DownloadError> {
        let parsed = Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;

        let mut request = self.client.get(parsed);
        if offset > 0 {
            request = request.header(RANGE, format!("bytes={offset}-"));
        }
        if let Some(token) = auth_token.filter(|t| !t.is_empty()) {
            request = request.header(COOKIE, format!("accountToken={token}"));
        }

        debug!(url, offset, "opening transfer");
        request
            .send()
            .await
            .map_err(|e| DownloadError::network(url, e))
    }
}
