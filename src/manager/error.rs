//! Error types for job control operations.

use std::path::PathBuf;

use thiserror::Error;

use crate::store::{JobStatus, StoreError};

/// Errors returned by [`super::JobManager`] operations.
///
/// Transfer failures never show up here: they end in the job's `Failed`
/// status and a status event.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// The submission was malformed; nothing was persisted or fetched.
    #[error("invalid request: {reason}\n  Suggestion: {suggestion}")]
    InvalidRequest {
        /// What is wrong with the request.
        reason: String,
        /// How to fix it.
        suggestion: String,
    },

    /// The destination directory could not be created.
    #[error("cannot prepare destination {path}: {source}")]
    Io {
        /// Directory that failed.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The job table could not be read or written.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The job's current state does not allow the operation.
    #[error("cannot {action} job {job_id} while it is {status}")]
    InvalidTransition {
        /// Target job.
        job_id: i64,
        /// Its current status.
        status: JobStatus,
        /// The refused operation.
        action: &'static str,
    },
}

impl ManagerError {
    /// Creates an `InvalidRequest` error.
    pub fn invalid_request(reason: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates an `Io` error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an `InvalidTransition` error.
    #[must_use]
    pub fn invalid_transition(job_id: i64, status: JobStatus, action: &'static str) -> Self {
        Self::InvalidTransition {
            job_id,
            status,
            action,
        }
    }

    /// Returns true for a missing job row.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(StoreError::JobNotFound(_)))
    }
}
