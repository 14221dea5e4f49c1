//! Persistent job store.
//!
//! One `downloads` row per destination path. Every mutation is a single short
//! statement; rows are owned by exactly one transfer worker at a time, so no
//! cross-row transactions are needed.
//!
//! # Example
//!
//! ```ignore
//! use lockerdl_core::store::{JobStore, JobStatus, NewJob};
//! use lockerdl_core::Database;
//! use std::path::Path;
//!
//! let store = JobStore::new(Database::new_in_memory().await?);
//! let id = store
//!     .insert(&NewJob {
//!         url: "https://example.com/a.zip",
//!         display_name: "a.zip",
//!         local_path: Path::new("/downloads/a.zip"),
//!         status: JobStatus::Pending,
//!         auth_token: None,
//!         group_id: None,
//!     })
//!     .await?;
//! store.update_progress(id, 4096, Some(8192)).await?;
//! ```

mod error;
mod job;
mod repository;

pub use error::{StoreDbErrorKind, StoreError};
pub use job::{DownloadJob, JobStatus, NewJob, progress_percent};
pub use repository::JobRepository;

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, instrument};

use crate::db::Database;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

const SELECT_COLUMNS: &str = "SELECT id, url, file_name, local_path, total_bytes, downloaded_bytes, status, auth_token, group_id, timestamp FROM downloads";

/// Returns `Ok(())` if a row was touched; otherwise [`StoreError::JobNotFound`].
fn check_affected(id: i64, rows_affected: u64) -> Result<()> {
    if rows_affected == 0 {
        Err(StoreError::JobNotFound(id))
    } else {
        Ok(())
    }
}

/// Milliseconds since the Unix epoch.
fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}

fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// `SQLite`-backed job table.
#[derive(Debug, Clone)]
pub struct JobStore {
    db: Database,
}

impl JobStore {
    /// Creates a store over an open database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Inserts a job and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the insert fails, including when a
    /// row for the same local path already exists.
    #[instrument(skip(self, job), fields(url = %job.url, path = %job.local_path.display()))]
    pub async fn insert(&self, job: &NewJob<'_>) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            r"INSERT INTO downloads (
                url, file_name, local_path, total_bytes, downloaded_bytes,
                status, auth_token, group_id, timestamp
            ) VALUES (?, ?, ?, -1, 0, ?, ?, ?, ?)
            RETURNING id",
        )
        .bind(job.url)
        .bind(job.display_name)
        .bind(path_text(job.local_path))
        .bind(job.status.as_str())
        .bind(job.auth_token)
        .bind(job.group_id)
        .bind(now_millis())
        .fetch_one(self.db.pool())
        .await?;

        debug!(job_id = id, "job inserted");
        Ok(id)
    }

    /// Sets the status and, when given, the local path.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::JobNotFound`] if no row has this id.
    #[instrument(skip(self, local_path), fields(status = %status))]
    pub async fn update_status(
        &self,
        id: i64,
        status: JobStatus,
        local_path: Option<&Path>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE downloads SET status = ?, local_path = COALESCE(?, local_path), timestamp = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(local_path.map(path_text))
        .bind(now_millis())
        .bind(id)
        .execute(self.db.pool())
        .await?;

        check_affected(id, result.rows_affected())
    }

    /// Records transfer progress; `total_bytes` is left unchanged when `None`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::JobNotFound`] if no row has this id.
    pub async fn update_progress(
        &self,
        id: i64,
        downloaded_bytes: i64,
        total_bytes: Option<i64>,
    ) -> Result<()> {
        let total_bytes =
            total_bytes.map(|total| if total > 0 { total.max(downloaded_bytes) } else { total });
        let result = sqlx::query(
            "UPDATE downloads SET downloaded_bytes = ?, total_bytes = COALESCE(?, total_bytes), timestamp = ? WHERE id = ?",
        )
        .bind(downloaded_bytes.max(0))
        .bind(total_bytes)
        .bind(now_millis())
        .bind(id)
        .execute(self.db.pool())
        .await?;

        check_affected(id, result.rows_affected())
    }

    /// Sets the expected total size (-1 for unknown).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::JobNotFound`] if no row has this id.
    pub async fn update_total_bytes(&self, id: i64, total_bytes: i64) -> Result<()> {
        let result =
            sqlx::query("UPDATE downloads SET total_bytes = ?, timestamp = ? WHERE id = ?")
                .bind(total_bytes)
                .bind(now_millis())
                .bind(id)
                .execute(self.db.pool())
                .await?;

        check_affected(id, result.rows_affected())
    }

    /// Moves a job to a new destination path.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::JobNotFound`] if no row has this id, or
    /// [`StoreError::Database`] if another job already owns the path.
    pub async fn update_local_path(&self, id: i64, local_path: &Path) -> Result<()> {
        let result = sqlx::query("UPDATE downloads SET local_path = ?, timestamp = ? WHERE id = ?")
            .bind(path_text(local_path))
            .bind(now_millis())
            .bind(id)
            .execute(self.db.pool())
            .await?;

        check_affected(id, result.rows_affected())
    }

    /// Replaces the URL and credential of an existing row (used when a
    /// resolver hands out a fresh direct link for the same destination).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::JobNotFound`] if no row has this id.
    pub async fn update_source(&self, id: i64, url: &str, auth_token: Option<&str>) -> Result<()> {
        let result = sqlx::query(
            "UPDATE downloads SET url = ?, auth_token = COALESCE(?, auth_token), timestamp = ? WHERE id = ?",
        )
        .bind(url)
        .bind(auth_token)
        .bind(now_millis())
        .bind(id)
        .execute(self.db.pool())
        .await?;

        check_affected(id, result.rows_affected())
    }

    /// Puts a failed job back to `pending` with zero progress.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::JobNotFound`] if no row has this id.
    #[instrument(skip(self))]
    pub async fn reset_for_retry(&self, id: i64) -> Result<()> {
        let result = sqlx::query(
            "UPDATE downloads SET status = 'pending', downloaded_bytes = 0, timestamp = ? WHERE id = ?",
        )
        .bind(now_millis())
        .bind(id)
        .execute(self.db.pool())
        .await?;

        check_affected(id, result.rows_affected())
    }

    /// Fetches a job by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    pub async fn get(&self, id: i64) -> Result<Option<DownloadJob>> {
        let job = sqlx::query_as::<_, DownloadJob>(&format!("{SELECT_COLUMNS} WHERE id = ?"))
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(job)
    }

    /// Fetches the job targeting `local_path`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    pub async fn get_by_local_path(&self, local_path: &Path) -> Result<Option<DownloadJob>> {
        let job =
            sqlx::query_as::<_, DownloadJob>(&format!("{SELECT_COLUMNS} WHERE local_path = ?"))
                .bind(path_text(local_path))
                .fetch_optional(self.db.pool())
                .await?;
        Ok(job)
    }

    /// Lists every job, most recently updated first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    pub async fn list_all(&self) -> Result<Vec<DownloadJob>> {
        let jobs = sqlx::query_as::<_, DownloadJob>(&format!(
            "{SELECT_COLUMNS} ORDER BY timestamp DESC, id DESC"
        ))
        .fetch_all(self.db.pool())
        .await?;
        Ok(jobs)
    }

    /// Deletes a row. Returns whether a row existed; the caller owns file cleanup.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the delete fails.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM downloads WHERE id = ?")
            .bind(id)
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Deletes every completed row without touching files. Returns the count.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the delete fails.
    #[instrument(skip(self))]
    pub async fn delete_completed(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM downloads WHERE status = 'completed'")
            .execute(self.db.pool())
            .await?;
        info!(removed = result.rows_affected(), "cleared completed jobs");
        Ok(result.rows_affected())
    }

    /// Demotes rows left `downloading` or `pending` by a previous process to
    /// `paused`, skipping ids that are live in `active_ids`. Returns the count.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a query fails.
    #[instrument(skip(self, active_ids))]
    pub async fn reconcile_interrupted(&self, active_ids: &[i64]) -> Result<u64> {
        let stranded: Vec<i64> = sqlx::query_scalar(
            "SELECT id FROM downloads WHERE status IN ('downloading', 'pending')",
        )
        .fetch_all(self.db.pool())
        .await?;

        let mut demoted = 0;
        for id in stranded.into_iter().filter(|id| !active_ids.contains(id)) {
            let result = sqlx::query(
                "UPDATE downloads SET status = 'paused', timestamp = ? WHERE id = ? AND status IN ('downloading', 'pending')",
            )
            .bind(now_millis())
            .bind(id)
            .execute(self.db.pool())
            .await?;
            demoted += result.rows_affected();
        }

        if demoted > 0 {
            info!(demoted, "demoted interrupted jobs to paused");
        }
        Ok(demoted)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    async fn store() -> JobStore {
        JobStore::new(Database::new_in_memory().await.unwrap())
    }

    async fn insert(store: &JobStore, path: &str, status: JobStatus) -> i64 {
        let path = PathBuf::from(path);
        store
            .insert(&NewJob {
                url: "https://example.com/file.bin",
                display_name: "file.bin",
                local_path: &path,
                status,
                auth_token: None,
                group_id: None,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_store_insert_and_get_defaults() {
        let store = store().await;
        let id = insert(&store, "/dl/file.bin", JobStatus::Pending).await;

        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.status(), JobStatus::Pending);
        assert_eq!(job.total_bytes, -1);
        assert_eq!(job.downloaded_bytes, 0);
        assert_eq!(job.local_path, "/dl/file.bin");
    }

    #[tokio::test]
    async fn test_store_update_missing_id_is_not_found() {
        let store = store().await;
        let err = store
            .update_status(999, JobStatus::Paused, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::JobNotFound(999)));
    }

    #[tokio::test]
    async fn test_store_update_progress_keeps_total_when_none() {
        let store = store().await;
        let id = insert(&store, "/dl/a.bin", JobStatus::Downloading).await;

        store.update_progress(id, 100, Some(1000)).await.unwrap();
        store.update_progress(id, 400, None).await.unwrap();

        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.downloaded_bytes, 400);
        assert_eq!(job.total_bytes, 1000);
    }

    #[tokio::test]
    async fn test_store_update_progress_never_below_downloaded() {
        let store = store().await;
        let id = insert(&store, "/dl/a.bin", JobStatus::Downloading).await;

        store.update_progress(id, 1500, Some(1000)).await.unwrap();

        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.total_bytes, 1500);
    }

    #[tokio::test]
    async fn test_store_reset_for_retry_clears_progress() {
        let store = store().await;
        let id = insert(&store, "/dl/a.bin", JobStatus::Failed).await;
        store.update_progress(id, 300, Some(900)).await.unwrap();

        store.reset_for_retry(id).await.unwrap();

        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.status(), JobStatus::Pending);
        assert_eq!(job.downloaded_bytes, 0);
        assert_eq!(job.total_bytes, 900);
    }

    #[tokio::test]
    async fn test_store_get_by_local_path() {
        let store = store().await;
        let id = insert(&store, "/dl/group/a.bin", JobStatus::Paused).await;

        let found = store
            .get_by_local_path(Path::new("/dl/group/a.bin"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, id);
        assert!(
            store
                .get_by_local_path(Path::new("/dl/other.bin"))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_store_delete_completed_only_removes_completed() {
        let store = store().await;
        insert(&store, "/dl/1.bin", JobStatus::Completed).await;
        insert(&store, "/dl/2.bin", JobStatus::Completed).await;
        let kept = insert(&store, "/dl/3.bin", JobStatus::Paused).await;

        assert_eq!(store.delete_completed().await.unwrap(), 2);

        let remaining = store.list_all().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, kept);
    }

    #[tokio::test]
    async fn test_store_delete_reports_existence() {
        let store = store().await;
        let id = insert(&store, "/dl/a.bin", JobStatus::Paused).await;

        assert!(store.delete(id).await.unwrap());
        assert!(!store.delete(id).await.unwrap());
    }

    #[tokio::test]
    async fn test_store_reconcile_skips_active_ids() {
        let store = store().await;
        let live = insert(&store, "/dl/live.bin", JobStatus::Downloading).await;
        let orphan = insert(&store, "/dl/orphan.bin", JobStatus::Downloading).await;
        let queued = insert(&store, "/dl/queued.bin", JobStatus::Pending).await;
        let done = insert(&store, "/dl/done.bin", JobStatus::Completed).await;

        let demoted = store.reconcile_interrupted(&[live]).await.unwrap();

        assert_eq!(demoted, 2);
        let status = |id| {
            let store = store.clone();
            async move { store.get(id).await.unwrap().unwrap().status() }
        };
        assert_eq!(status(live).await, JobStatus::Downloading);
        assert_eq!(status(orphan).await, JobStatus::Paused);
        assert_eq!(status(queued).await, JobStatus::Paused);
        assert_eq!(status(done).await, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_store_update_local_path_rejects_taken_path() {
        let store = store().await;
        let a = insert(&store, "/dl/a.bin", JobStatus::Paused).await;
        insert(&store, "/dl/b.bin", JobStatus::Paused).await;

        store
            .update_local_path(a, Path::new("/dl/moved/a.bin"))
            .await
            .unwrap();
        assert_eq!(
            store.get(a).await.unwrap().unwrap().local_path(),
            PathBuf::from("/dl/moved/a.bin")
        );

        let err = store
            .update_local_path(a, Path::new("/dl/b.bin"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Database { .. }));
    }

    #[tokio::test]
    async fn test_store_update_source_keeps_token_when_none() {
        let store = store().await;
        let path = PathBuf::from("/dl/t.bin");
        let id = store
            .insert(&NewJob {
                url: "https://old.example/t.bin",
                display_name: "t.bin",
                local_path: &path,
                status: JobStatus::Paused,
                auth_token: Some("tok"),
                group_id: Some("grp"),
            })
            .await
            .unwrap();

        store
            .update_source(id, "https://new.example/t.bin", None)
            .await
            .unwrap();

        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.url, "https://new.example/t.bin");
        assert_eq!(job.auth_token.as_deref(), Some("tok"));
        assert_eq!(job.group_id.as_deref(), Some("grp"));
    }
}
