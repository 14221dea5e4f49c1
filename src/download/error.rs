//! Error types for the transfer engine.

use std::path::PathBuf;

use thiserror::Error;

use crate::store::StoreError;

/// Errors that end a transfer attempt. Any of these moves the job to `Failed`.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS, connection refused, TLS, reset mid-body).
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL being fetched.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Connect or read timeout on the connection.
    #[error("timeout downloading {url}\n  Suggestion: The job keeps its partial file; retry or resume it later")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// The server answered with something other than 200 or 206.
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// Creating, seeking or writing the destination file failed.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The body ended before the announced size was reached.
    #[error("transfer of {url} ended early: expected {expected} bytes, got {actual}")]
    Incomplete {
        /// The URL being fetched.
        url: String,
        /// Announced total size.
        expected: u64,
        /// Bytes on disk when the stream ended.
        actual: u64,
    },

    /// The job's URL could not be parsed.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    /// The job row could not be updated.
    #[error("failed to persist state of job {job_id}: {source}")]
    Store {
        /// Job whose row failed to update.
        job_id: i64,
        /// The store failure.
        #[source]
        source: StoreError,
    },
}

impl DownloadError {
    /// Creates a network or timeout error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            return Self::timeout(url);
        }
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an early-end error.
    pub fn incomplete(url: impl Into<String>, expected: u64, actual: u64) -> Self {
        Self::Incomplete {
            url: url.into(),
            expected,
            actual,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a persistence error for `job_id`.
    pub fn store(job_id: i64, source: StoreError) -> Self {
        Self::Store { job_id, source }
    }
}

// No `From<reqwest::Error>` / `From<std::io::Error>`: every variant needs the
// url or path the source errors don't carry.
