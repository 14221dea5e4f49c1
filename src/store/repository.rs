//! Repository seam for the writes a transfer worker makes.
//!
//! The transfer engine depends on this trait rather than on [`JobStore`]
//! directly, so it only sees the row mutations it is allowed to make.

use async_trait::async_trait;

use super::{JobStatus, JobStore, Result};

/// Row mutations needed while a job is being transferred.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Sets the job's status.
    async fn set_status(&self, id: i64, status: JobStatus) -> Result<()>;

    /// Records bytes written and, when known, the expected total.
    async fn record_progress(
        &self,
        id: i64,
        downloaded_bytes: i64,
        total_bytes: Option<i64>,
    ) -> Result<()>;

    /// Sets the expected total size (-1 for unknown).
    async fn record_total_bytes(&self, id: i64, total_bytes: i64) -> Result<()>;
}

#[async_trait]
impl JobRepository for JobStore {
    async fn set_status(&self, id: i64, status: JobStatus) -> Result<()> {
        JobStore::update_status(self, id, status, None).await
    }

    async fn record_progress(
        &self,
        id: i64,
        downloaded_bytes: i64,
        total_bytes: Option<i64>,
    ) -> Result<()> {
        JobStore::update_progress(self, id, downloaded_bytes, total_bytes).await
    }

    async fn record_total_bytes(&self, id: i64, total_bytes: i64) -> Result<()> {
        JobStore::update_total_bytes(self, id, total_bytes).await
    }
}
