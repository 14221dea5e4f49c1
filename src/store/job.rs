//! Job record and status definitions.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Persisted lifecycle state of a download job.
///
/// Cancellation is not a stored state: a cancelled job's row is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created or queued, waiting for a transfer slot.
    Pending,
    /// A transfer worker currently owns the job.
    Downloading,
    /// Stopped by the user (or by crash recovery); resumable.
    Paused,
    /// Transfer failed; partial file kept for resume or retry.
    Failed,
    /// All bytes written.
    Completed,
}

impl JobStatus {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Downloading => "downloading",
            Self::Paused => "paused",
            Self::Failed => "failed",
            Self::Completed => "completed",
        }
    }

    /// Returns true for states a `resume` may start from.
    #[must_use]
    pub fn is_resumable(&self) -> bool {
        matches!(self, Self::Pending | Self::Paused | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "downloading" => Ok(Self::Downloading),
            "paused" => Ok(Self::Paused),
            "failed" => Ok(Self::Failed),
            "completed" => Ok(Self::Completed),
            _ => Err(format!("invalid job status: {s}")),
        }
    }
}

/// A persisted download job.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DownloadJob {
    /// Stable surrogate key.
    pub id: i64,
    /// URL the transfer engine fetches.
    pub url: String,
    /// Name shown to the user.
    #[sqlx(rename = "file_name")]
    pub display_name: String,
    /// Destination on disk; unique across jobs.
    pub local_path: String,
    /// Expected size, or -1 when unknown.
    pub total_bytes: i64,
    /// Bytes written so far.
    pub downloaded_bytes: i64,
    /// Stored status text, parsed via [`DownloadJob::status`].
    #[sqlx(rename = "status")]
    #[serde(rename = "status")]
    pub status_str: String,
    /// Provider credential re-sent on every transfer request.
    #[serde(skip_serializing)]
    pub auth_token: Option<String>,
    /// Shared-folder identifier grouping sibling jobs.
    pub group_id: Option<String>,
    /// Milliseconds since the Unix epoch of the last mutation.
    #[sqlx(rename = "timestamp")]
    pub last_update_timestamp: i64,
}

impl DownloadJob {
    /// Returns the parsed status.
    ///
    /// Unknown values read as `Failed` so they can still be retried or cancelled.
    #[must_use]
    pub fn status(&self) -> JobStatus {
        self.status_str.parse().unwrap_or(JobStatus::Failed)
    }

    /// Destination path as a `PathBuf`.
    #[must_use]
    pub fn local_path(&self) -> PathBuf {
        PathBuf::from(&self.local_path)
    }

    /// Completion percentage, when the total size is known.
    #[must_use]
    pub fn progress_percent(&self) -> Option<u8> {
        progress_percent(self.downloaded_bytes, self.total_bytes)
    }
}

impl fmt::Display for DownloadJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DownloadJob {{ id: {}, name: {}, status: {} }}",
            self.id,
            self.display_name,
            self.status()
        )
    }
}

/// Percentage of `downloaded` over `total`, clamped to 100; `None` when `total` is unknown.
#[must_use]
pub fn progress_percent(downloaded: i64, total: i64) -> Option<u8> {
    if total <= 0 {
        return None;
    }
    let percent = (i128::from(downloaded.max(0)) * 100) / i128::from(total);
    Some(u8::try_from(percent.min(100)).unwrap_or(100))
}

/// Values for inserting a new job row.
#[derive(Debug, Clone, Copy)]
pub struct NewJob<'a> {
    /// URL to fetch.
    pub url: &'a str,
    /// Name shown to the user.
    pub display_name: &'a str,
    /// Destination path.
    pub local_path: &'a Path,
    /// Initial status.
    pub status: JobStatus,
    /// Provider credential, if any.
    pub auth_token: Option<&'a str>,
    /// Shared-folder identifier, if any.
    pub group_id: Option<&'a str>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_round_trips_through_str() {
        for status in [
            JobStatus::Pending,
            JobStatus::Downloading,
            JobStatus::Paused,
            JobStatus::Failed,
            JobStatus::Completed,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
            assert_eq!(status.to_string(), status.as_str());
        }
    }

    #[test]
    fn test_job_status_rejects_unknown() {
        let err = "cancelled".parse::<JobStatus>().unwrap_err();
        assert!(err.contains("cancelled"));
    }

    #[test]
    fn test_job_status_resumable_states() {
        assert!(JobStatus::Paused.is_resumable());
        assert!(JobStatus::Failed.is_resumable());
        assert!(JobStatus::Pending.is_resumable());
        assert!(!JobStatus::Downloading.is_resumable());
        assert!(!JobStatus::Completed.is_resumable());
    }

    #[test]
    fn test_progress_percent_unknown_total() {
        assert_eq!(progress_percent(500, -1), None);
        assert_eq!(progress_percent(500, 0), None);
    }

    #[test]
    fn test_progress_percent_clamps_to_hundred() {
        assert_eq!(progress_percent(50, 200), Some(25));
        assert_eq!(progress_percent(300, 200), Some(100));
    }
}
