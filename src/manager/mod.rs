//! Job manager: admission control over transfer workers.
//!
//! One lock guards the set of active workers together with the FIFO of
//! requests waiting for a slot. Every submission and every worker exit takes
//! that lock, so "count active, then start or enqueue" and "remove finished,
//! then pop next" never interleave.
//!
//! # Example
//!
//! ```no_run
//! use lockerdl_core::download::HttpClient;
//! use lockerdl_core::events::EventSink;
//! use lockerdl_core::manager::{JobManager, SubmitRequest};
//! use lockerdl_core::store::JobStore;
//! # use lockerdl_core::Database;
//!
//! # async fn example(db: Database) -> Result<(), Box<dyn std::error::Error>> {
//! let manager = JobManager::new(
//!     JobStore::new(db),
//!     HttpClient::new()?,
//!     EventSink::default(),
//!     "/tmp/lockerdl",
//!     3,
//! );
//! manager.reconcile().await?;
//! let outcome = manager
//!     .submit(SubmitRequest::new("https://example.com/game.zip", "game.zip"))
//!     .await?;
//! println!("{outcome}");
//! manager.wait_idle().await;
//! # Ok(())
//! # }
//! ```

mod error;

pub use error::ManagerError;

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio::sync::{Mutex, broadcast, watch};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::download::{
    HttpClient, TransferControl, TransferOutcome, run_transfer, sanitize_filename,
    sanitize_relative_path,
};
use crate::events::{EventSink, JobEvent};
use crate::resolver::Resolution;
use crate::store::{DownloadJob, JobStatus, JobStore, NewJob, StoreError};

/// Lowest accepted concurrency bound.
pub const MIN_CONCURRENT: usize = 1;
/// Highest accepted concurrency bound.
pub const MAX_CONCURRENT: usize = 10;
/// Concurrency bound used when none is configured.
pub const DEFAULT_MAX_CONCURRENT: usize = 3;

/// Clamps a requested concurrency bound into `[MIN_CONCURRENT, MAX_CONCURRENT]`.
#[must_use]
pub fn clamp_concurrency(requested: usize) -> usize {
    requested.clamp(MIN_CONCURRENT, MAX_CONCURRENT)
}

/// A request to download one direct URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRequest {
    /// Direct, byte-servable URL.
    pub url: String,
    /// Relative path under the download directory; may contain folders.
    pub display_name: String,
    /// Provider credential sent as a cookie on every transfer of this job.
    pub auth_token: Option<String>,
    /// Namespaces the destination so multi-file releases stay together.
    pub group_id: Option<String>,
}

impl SubmitRequest {
    /// Creates a request without credential or group.
    pub fn new(url: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            display_name: display_name.into(),
            auth_token: None,
            group_id: None,
        }
    }

    /// Sets the provider credential.
    #[must_use]
    pub fn with_auth_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token;
        self
    }

    /// Sets the group namespace.
    #[must_use]
    pub fn with_group_id(mut self, group_id: Option<String>) -> Self {
        self.group_id = group_id;
        self
    }

    fn validate(&self) -> Result<(), ManagerError> {
        let parsed = Url::parse(&self.url).map_err(|e| {
            ManagerError::invalid_request(
                format!("'{}' is not a valid URL: {e}", self.url),
                "Pass an absolute http(s) URL",
            )
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ManagerError::invalid_request(
                format!("unsupported URL scheme '{}'", parsed.scheme()),
                "Only http and https downloads are supported",
            ));
        }
        if self.display_name.trim().is_empty() {
            return Err(ManagerError::invalid_request(
                "empty file name",
                "Pass a file name with --name",
            ));
        }
        Ok(())
    }
}

/// Why a submission was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// A live or queued job already targets the same destination.
    AlreadyDownloading,
    /// The same URL already completed into the same destination.
    AlreadyDownloaded,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyDownloading => write!(f, "already downloading"),
            Self::AlreadyDownloaded => write!(f, "already downloaded"),
        }
    }
}

/// What admission did with a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// A worker was started for this job id.
    Started(i64),
    /// The job id waits in the FIFO for a free slot.
    Queued(i64),
    /// Nothing changed.
    Rejected(RejectReason),
}

impl SubmitOutcome {
    /// Job id for started or queued outcomes.
    #[must_use]
    pub fn job_id(&self) -> Option<i64> {
        match self {
            Self::Started(id) | Self::Queued(id) => Some(*id),
            Self::Rejected(_) => None,
        }
    }
}

impl fmt::Display for SubmitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started(id) => write!(f, "job {id} started"),
            Self::Queued(id) => write!(f, "job {id} queued"),
            Self::Rejected(reason) => write!(f, "rejected: {reason}"),
        }
    }
}

/// A job row waiting for a worker slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedRequest {
    /// Row id; the row is `Pending` while queued.
    pub job_id: i64,
    /// Direct URL at enqueue time.
    pub url: String,
    /// Destination file.
    pub local_path: PathBuf,
}

impl QueuedRequest {
    fn from_job(job: &DownloadJob) -> Self {
        Self {
            job_id: job.id,
            url: job.url.clone(),
            local_path: job.local_path(),
        }
    }
}

/// Ids of live and waiting jobs, in admission order for the queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdmissionSnapshot {
    /// Jobs with a running worker (unordered).
    pub active: Vec<i64>,
    /// Jobs waiting for a slot, front first.
    pub queued: Vec<i64>,
}

struct ActiveTask {
    control: Arc<TransferControl>,
    done: watch::Receiver<bool>,
    local_path: PathBuf,
}

#[derive(Default)]
struct AdmissionState {
    active: HashMap<i64, ActiveTask>,
    queue: VecDeque<QueuedRequest>,
}

impl AdmissionState {
    fn targets(&self, path: &Path) -> bool {
        self.active.values().any(|task| task.local_path == path)
            || self.queue.iter().any(|request| request.local_path == path)
    }

    fn owns(&self, job_id: i64) -> bool {
        self.active.contains_key(&job_id) || self.queue.iter().any(|r| r.job_id == job_id)
    }

    fn dequeue(&mut self, job_id: i64) -> Option<QueuedRequest> {
        let position = self.queue.iter().position(|r| r.job_id == job_id)?;
        self.queue.remove(position)
    }
}

struct ManagerInner {
    store: JobStore,
    client: HttpClient,
    events: EventSink,
    download_dir: PathBuf,
    max_concurrent: AtomicUsize,
    state: Mutex<AdmissionState>,
}

/// Owns the active worker set and the waiting queue.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct JobManager {
    inner: Arc<ManagerInner>,
}

impl fmt::Debug for JobManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobManager")
            .field("download_dir", &self.inner.download_dir)
            .field("max_concurrent", &self.max_concurrent())
            .finish_non_exhaustive()
    }
}

impl JobManager {
    /// Creates a manager; `max_concurrent` is clamped to `[1, 10]`.
    pub fn new(
        store: JobStore,
        client: HttpClient,
        events: EventSink,
        download_dir: impl Into<PathBuf>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                store,
                client,
                events,
                download_dir: download_dir.into(),
                max_concurrent: AtomicUsize::new(clamp_concurrency(max_concurrent)),
                state: Mutex::new(AdmissionState::default()),
            }),
        }
    }

    /// Base directory every destination lives under.
    #[must_use]
    pub fn download_dir(&self) -> &Path {
        &self.inner.download_dir
    }

    /// The job store backing this manager.
    #[must_use]
    pub fn store(&self) -> &JobStore {
        &self.inner.store
    }

    /// Current concurrency bound.
    #[must_use]
    pub fn max_concurrent(&self) -> usize {
        self.inner.max_concurrent.load(Ordering::SeqCst)
    }

    /// Opens a subscription to job events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.events.subscribe()
    }

    /// Demotes rows left `downloading` or `pending` by an earlier process to
    /// `paused`. Call once at startup, before the first submission.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::Store`] if the update fails.
    pub async fn reconcile(&self) -> Result<u64, ManagerError> {
        let state = self.inner.state.lock().await;
        let live: Vec<i64> = state
            .active
            .keys()
            .copied()
            .chain(state.queue.iter().map(|r| r.job_id))
            .collect();
        Ok(self.inner.store.reconcile_interrupted(&live).await?)
    }

    /// Submits one direct URL for download.
    ///
    /// The destination is `download_dir/[group_id/]display_name`, every path
    /// component sanitized.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::InvalidRequest`] for a malformed request,
    /// [`ManagerError::Io`] if the destination directory cannot be created,
    /// or [`ManagerError::Store`] if the job row cannot be written. In every
    /// error case no transfer is started.
    #[instrument(skip(self, request), fields(url = %request.url, name = %request.display_name))]
    pub async fn submit(&self, request: SubmitRequest) -> Result<SubmitOutcome, ManagerError> {
        request.validate()?;
        let local_path = destination_path(
            &self.inner.download_dir,
            &request.display_name,
            request.group_id.as_deref(),
        );

        let mut state = self.inner.state.lock().await;
        if state.targets(&local_path) {
            info!(path = %local_path.display(), "submission rejected: already downloading");
            return Ok(SubmitOutcome::Rejected(RejectReason::AlreadyDownloading));
        }

        let existing = self.inner.store.get_by_local_path(&local_path).await?;
        let job_id = match existing {
            Some(job) if job.url == request.url => {
                if job.status() == JobStatus::Completed {
                    info!(job_id = job.id, "submission rejected: already downloaded");
                    return Ok(SubmitOutcome::Rejected(RejectReason::AlreadyDownloaded));
                }
                debug!(job_id = job.id, status = %job.status(), "resuming existing job");
                self.inner
                    .store
                    .update_source(job.id, &request.url, request.auth_token.as_deref())
                    .await?;
                self.inner
                    .store
                    .update_status(job.id, JobStatus::Pending, None)
                    .await?;
                job.id
            }
            other => {
                if let Some(stale) = other {
                    debug!(job_id = stale.id, "replacing job with a different URL");
                    self.inner.store.delete(stale.id).await?;
                }
                create_parent_dir(&local_path).await?;
                self.inner
                    .store
                    .insert(&NewJob {
                        url: &request.url,
                        display_name: request.display_name.trim(),
                        local_path: &local_path,
                        status: JobStatus::Pending,
                        auth_token: request.auth_token.as_deref(),
                        group_id: request.group_id.as_deref(),
                    })
                    .await?
            }
        };

        self.inner.admit(&mut state, job_id).await
    }

    /// Submits every item of a resolution, in order.
    ///
    /// `display_override` renames the item only when there is exactly one.
    /// Each item gets its own outcome; one failure does not stop the rest.
    pub async fn submit_resolution(
        &self,
        resolution: &Resolution,
        display_override: Option<&str>,
    ) -> Vec<Result<SubmitOutcome, ManagerError>> {
        let rename = display_override
            .map(str::trim)
            .filter(|name| !name.is_empty() && resolution.items.len() == 1);

        let mut outcomes = Vec::with_capacity(resolution.items.len());
        for item in &resolution.items {
            let request = SubmitRequest::new(
                item.direct_url.clone(),
                rename.unwrap_or(item.relative_path.as_str()),
            )
            .with_auth_token(resolution.auth_token.clone())
            .with_group_id(item.group_id.clone());
            outcomes.push(self.submit(request).await);
        }
        outcomes
    }

    /// Asks a live worker to stop and keep its progress, or parks a queued job.
    ///
    /// Returns once the request is recorded; the worker persists `Paused`
    /// when it reaches its next check.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::InvalidTransition`] if the job is neither
    /// running nor queued, or [`ManagerError::Store`] if it does not exist.
    #[instrument(skip(self))]
    pub async fn pause(&self, job_id: i64) -> Result<(), ManagerError> {
        let mut state = self.inner.state.lock().await;
        if let Some(task) = state.active.get(&job_id) {
            task.control.request_pause();
            return Ok(());
        }
        if state.dequeue(job_id).is_some() {
            self.inner
                .store
                .update_status(job_id, JobStatus::Paused, None)
                .await?;
            self.inner.events.status(job_id, JobStatus::Paused);
            return Ok(());
        }
        drop(state);

        let job = self.require_job(job_id).await?;
        Err(ManagerError::invalid_transition(job_id, job.status(), "pause"))
    }

    /// Pauses every live worker and parks every queued job. Returns how many
    /// jobs were affected.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::Store`] if a queued job cannot be marked paused.
    pub async fn pause_all(&self) -> Result<usize, ManagerError> {
        let mut state = self.inner.state.lock().await;
        for task in state.active.values() {
            task.control.request_pause();
        }
        let mut affected = state.active.len();
        while let Some(request) = state.queue.pop_front() {
            self.inner
                .store
                .update_status(request.job_id, JobStatus::Paused, None)
                .await?;
            self.inner.events.status(request.job_id, JobStatus::Paused);
            affected += 1;
        }
        info!(affected, "paused all jobs");
        Ok(affected)
    }

    /// Restarts a paused, failed or stranded pending job from its recorded offset.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::InvalidTransition`] if the job is live, queued
    /// or completed, or [`ManagerError::Store`] if it does not exist.
    #[instrument(skip(self))]
    pub async fn resume(&self, job_id: i64) -> Result<SubmitOutcome, ManagerError> {
        let mut state = self.inner.state.lock().await;
        let job = self.require_job(job_id).await?;
        let live = state.owns(job_id);
        let stranded = job.status() == JobStatus::Downloading && !live;
        if live || !(job.status().is_resumable() || stranded) {
            return Err(ManagerError::invalid_transition(
                job_id,
                job.status(),
                "resume",
            ));
        }

        self.inner
            .store
            .update_status(job_id, JobStatus::Pending, None)
            .await?;
        self.inner.admit(&mut state, job_id).await
    }

    /// Restarts a failed job from byte zero.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::InvalidTransition`] unless the job is `Failed`
    /// and no worker or queue entry owns it, or [`ManagerError::Store`] if it
    /// does not exist.
    #[instrument(skip(self))]
    pub async fn retry(&self, job_id: i64) -> Result<SubmitOutcome, ManagerError> {
        let mut state = self.inner.state.lock().await;
        let job = self.require_job(job_id).await?;
        // A failed worker persists `Failed` before it releases its slot.
        if state.owns(job_id) || job.status() != JobStatus::Failed {
            return Err(ManagerError::invalid_transition(
                job_id,
                job.status(),
                "retry",
            ));
        }

        self.inner.store.reset_for_retry(job_id).await?;
        self.inner.admit(&mut state, job_id).await
    }

    /// Stops the job if it is running, then deletes its row and file.
    ///
    /// Cancelling an unknown id is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::InvalidTransition`] if the job is completed
    /// (including a worker that finished before it saw the request), or
    /// [`ManagerError::Store`] if the row cannot be deleted.
    #[instrument(skip(self))]
    pub async fn cancel(&self, job_id: i64) -> Result<(), ManagerError> {
        let mut state = self.inner.state.lock().await;
        if let Some(task) = state.active.get(&job_id) {
            task.control.request_cancel();
            let mut done = task.done.clone();
            drop(state);
            // The worker discards its own row and file when it sees the flag.
            if done.wait_for(|finished| *finished).await.is_err() {
                warn!(job_id, "worker exited without reporting");
            }
        } else {
            state.dequeue(job_id);
            drop(state);
        }

        if let Some(job) = self.inner.store.get(job_id).await?
            && job.status() == JobStatus::Completed
        {
            return Err(ManagerError::invalid_transition(
                job_id,
                JobStatus::Completed,
                "cancel",
            ));
        }
        self.inner.discard(job_id).await
    }

    /// Removes several jobs and their files, stopping any that run. Completed
    /// jobs are deleted too. Returns how many rows were removed.
    ///
    /// # Errors
    ///
    /// Returns the first [`ManagerError`]; earlier ids stay deleted.
    pub async fn delete_jobs(&self, job_ids: &[i64]) -> Result<usize, ManagerError> {
        let mut removed = 0;
        for &job_id in job_ids {
            if self.inner.store.get(job_id).await?.is_none() {
                continue;
            }
            match self.cancel(job_id).await {
                Ok(()) => {}
                Err(ManagerError::InvalidTransition {
                    status: JobStatus::Completed,
                    ..
                }) => self.inner.discard(job_id).await?,
                Err(error) => return Err(error),
            }
            removed += 1;
        }
        Ok(removed)
    }

    /// Fetches one job.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::Store`] if the query fails.
    pub async fn get_job(&self, job_id: i64) -> Result<Option<DownloadJob>, ManagerError> {
        Ok(self.inner.store.get(job_id).await?)
    }

    /// Lists every job, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::Store`] if the query fails.
    pub async fn list_jobs(&self) -> Result<Vec<DownloadJob>, ManagerError> {
        Ok(self.inner.store.list_all().await?)
    }

    /// Forgets completed jobs without touching their files.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::Store`] if the delete fails.
    pub async fn clear_completed(&self) -> Result<u64, ManagerError> {
        Ok(self.inner.store.delete_completed().await?)
    }

    /// Changes the concurrency bound (clamped) and fills any new slots.
    pub async fn set_max_concurrent(&self, requested: usize) -> usize {
        let bound = clamp_concurrency(requested);
        let mut state = self.inner.state.lock().await;
        self.inner.max_concurrent.store(bound, Ordering::SeqCst);
        self.inner.admit_queued(&mut state).await;
        bound
    }

    /// Ids of live and queued jobs.
    pub async fn snapshot(&self) -> AdmissionSnapshot {
        let state = self.inner.state.lock().await;
        AdmissionSnapshot {
            active: state.active.keys().copied().collect(),
            queued: state.queue.iter().map(|r| r.job_id).collect(),
        }
    }

    /// Waits until no worker runs and nothing is queued.
    pub async fn wait_idle(&self) {
        loop {
            let pending: Vec<watch::Receiver<bool>> = {
                let state = self.inner.state.lock().await;
                state.active.values().map(|task| task.done.clone()).collect()
            };
            if pending.is_empty() {
                return;
            }
            for mut done in pending {
                let _ = done.wait_for(|finished| *finished).await;
            }
        }
    }

    async fn require_job(&self, job_id: i64) -> Result<DownloadJob, ManagerError> {
        self.inner
            .store
            .get(job_id)
            .await?
            .ok_or_else(|| StoreError::JobNotFound(job_id).into())
    }
}

impl ManagerInner {
    /// Starts `job_id` now or appends it to the queue. The row must be `Pending`.
    async fn admit(
        self: &Arc<Self>,
        state: &mut AdmissionState,
        job_id: i64,
    ) -> Result<SubmitOutcome, ManagerError> {
        if state.active.len() < self.max_concurrent.load(Ordering::SeqCst) {
            self.start(state, job_id).await?;
            return Ok(SubmitOutcome::Started(job_id));
        }

        let job = self
            .store
            .get(job_id)
            .await?
            .ok_or(StoreError::JobNotFound(job_id))?;
        state.queue.push_back(QueuedRequest::from_job(&job));
        self.events.status(job_id, JobStatus::Pending);
        info!(job_id, queued = state.queue.len(), "job queued");
        Ok(SubmitOutcome::Queued(job_id))
    }

    /// Pops queued jobs while there are free slots.
    async fn admit_queued(self: &Arc<Self>, state: &mut AdmissionState) {
        while state.active.len() < self.max_concurrent.load(Ordering::SeqCst) {
            let Some(next) = state.queue.pop_front() else {
                break;
            };
            if let Err(error) = self.start(state, next.job_id).await {
                warn!(job_id = next.job_id, error = %error, "queued job could not start");
            }
        }
    }

    /// Persists `Downloading`, then spawns the worker.
    async fn start(
        self: &Arc<Self>,
        state: &mut AdmissionState,
        job_id: i64,
    ) -> Result<(), ManagerError> {
        self.store
            .update_status(job_id, JobStatus::Downloading, None)
            .await?;
        let job = self
            .store
            .get(job_id)
            .await?
            .ok_or(StoreError::JobNotFound(job_id))?;
        self.events.status(job_id, JobStatus::Downloading);

        let control = Arc::new(TransferControl::new());
        let (done_tx, done_rx) = watch::channel(false);
        state.active.insert(
            job_id,
            ActiveTask {
                control: Arc::clone(&control),
                done: done_rx,
                local_path: job.local_path(),
            },
        );

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            match run_transfer(&inner.client, &inner.store, &inner.events, &job, &control).await {
                Ok(TransferOutcome::Cancelled) => {
                    if let Err(error) = inner.discard(job.id).await {
                        warn!(job_id = job.id, error = %error, "cancel cleanup failed");
                    }
                }
                Ok(outcome) => debug!(job_id = job.id, ?outcome, "worker finished"),
                Err(error) => debug!(job_id = job.id, error = %error, "worker failed"),
            }
            Arc::clone(&inner).worker_exited(job.id, control).await;
            let _ = done_tx.send(true);
        });

        info!(job_id, active = state.active.len(), "job started");
        Ok(())
    }

    /// Frees the worker's slot and admits the next request.
    ///
    /// Only the entry registered for this worker's `control` is removed.
    /// Boxed because it re-enters `start`, which spawns the worker that calls it.
    fn worker_exited(
        self: Arc<Self>,
        job_id: i64,
        control: Arc<TransferControl>,
    ) -> BoxFuture<'static, ()> {
        async move {
            let mut state = self.state.lock().await;
            if state
                .active
                .get(&job_id)
                .is_some_and(|task| Arc::ptr_eq(&task.control, &control))
            {
                state.active.remove(&job_id);
            } else {
                warn!(job_id, "slot already taken over by another worker");
            }
            self.admit_queued(&mut state).await;
        }
        .boxed()
    }

    /// Deletes the row and its file. Idempotent.
    async fn discard(&self, job_id: i64) -> Result<(), ManagerError> {
        let Some(job) = self.store.get(job_id).await? else {
            return Ok(());
        };
        let path = job.local_path();
        match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!(path = %path.display(), "partial file removed"),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
            Err(error) => warn!(path = %path.display(), error = %error, "could not remove file"),
        }
        if self.store.delete(job_id).await? {
            self.events.emit(JobEvent::Cancelled { job_id });
            info!(job_id, "job cancelled");
        }
        Ok(())
    }
}

/// Builds `base/[group_id/]display_name` with every component sanitized.
#[must_use]
pub fn destination_path(base: &Path, display_name: &str, group_id: Option<&str>) -> PathBuf {
    let mut path = base.to_path_buf();
    if let Some(group) = group_id.map(str::trim).filter(|g| !g.is_empty()) {
        path.push(sanitize_filename(group));
    }
    path.push(sanitize_relative_path(display_name));
    path
}

async fn create_parent_dir(path: &Path) -> Result<(), ManagerError> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| ManagerError::io(parent, e))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::resolver::ResolvedItem;
    use tempfile::TempDir;

    async fn manager(max: usize) -> (JobManager, TempDir) {
        let dir = TempDir::new().unwrap();
        let db = Database::new_in_memory().await.unwrap();
        let manager = JobManager::new(
            JobStore::new(db),
            HttpClient::new().unwrap(),
            EventSink::default(),
            dir.path(),
            max,
        );
        (manager, dir)
    }

    #[test]
    fn test_clamp_concurrency_bounds() {
        assert_eq!(clamp_concurrency(0), 1);
        assert_eq!(clamp_concurrency(3), 3);
        assert_eq!(clamp_concurrency(99), 10);
    }

    #[test]
    fn test_destination_path_with_group() {
        let path = destination_path(Path::new("/dl"), "Disc 1/setup.exe", Some("abc-123"));
        assert_eq!(path, PathBuf::from("/dl/abc-123/Disc 1/setup.exe"));
    }

    #[test]
    fn test_destination_path_sanitizes_components() {
        let path = destination_path(Path::new("/dl"), "../con.txt", Some("  "));
        assert!(path.starts_with("/dl"));
        assert!(!path.components().any(|c| c.as_os_str() == ".."));
    }

    #[test]
    fn test_submit_request_validation() {
        assert!(SubmitRequest::new("https://h/x", "x").validate().is_ok());
        assert!(matches!(
            SubmitRequest::new("ftp://h/x", "x").validate(),
            Err(ManagerError::InvalidRequest { .. })
        ));
        assert!(matches!(
            SubmitRequest::new("not a url", "x").validate(),
            Err(ManagerError::InvalidRequest { .. })
        ));
        assert!(matches!(
            SubmitRequest::new("https://h/x", "   ").validate(),
            Err(ManagerError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn test_submit_outcome_display() {
        assert_eq!(SubmitOutcome::Started(4).to_string(), "job 4 started");
        assert_eq!(
            SubmitOutcome::Rejected(RejectReason::AlreadyDownloaded).to_string(),
            "rejected: already downloaded"
        );
        assert_eq!(SubmitOutcome::Queued(2).job_id(), Some(2));
        assert_eq!(
            SubmitOutcome::Rejected(RejectReason::AlreadyDownloading).job_id(),
            None
        );
    }

    #[tokio::test]
    async fn test_submit_invalid_request_writes_nothing() {
        let (manager, _dir) = manager(1).await;
        let err = manager
            .submit(SubmitRequest::new("mailto:x@y", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ManagerError::InvalidRequest { .. }));
        assert!(manager.list_jobs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_submit_rejects_completed_duplicate() {
        let (manager, dir) = manager(1).await;
        let path = dir.path().join("done.bin");
        let id = manager
            .store()
            .insert(&NewJob {
                url: "https://h/done.bin",
                display_name: "done.bin",
                local_path: &path,
                status: JobStatus::Completed,
                auth_token: None,
                group_id: None,
            })
            .await
            .unwrap();

        let outcome = manager
            .submit(SubmitRequest::new("https://h/done.bin", "done.bin"))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            SubmitOutcome::Rejected(RejectReason::AlreadyDownloaded)
        );
        assert_eq!(manager.list_jobs().await.unwrap().len(), 1);
        assert_eq!(
            manager.get_job(id).await.unwrap().unwrap().status(),
            JobStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_resume_completed_is_invalid_transition() {
        let (manager, dir) = manager(1).await;
        let id = manager
            .store()
            .insert(&NewJob {
                url: "https://h/a",
                display_name: "a",
                local_path: &dir.path().join("a"),
                status: JobStatus::Completed,
                auth_token: None,
                group_id: None,
            })
            .await
            .unwrap();

        let err = manager.resume(id).await.unwrap_err();
        assert!(matches!(
            err,
            ManagerError::InvalidTransition {
                status: JobStatus::Completed,
                action: "resume",
                ..
            }
        ));
        assert!(matches!(
            manager.retry(id).await.unwrap_err(),
            ManagerError::InvalidTransition { .. }
        ));
        assert!(matches!(
            manager.pause(id).await.unwrap_err(),
            ManagerError::InvalidTransition { .. }
        ));
    }

    #[tokio::test]
    async fn test_control_unknown_job() {
        let (manager, _dir) = manager(1).await;
        assert!(manager.resume(404).await.unwrap_err().is_not_found());
        assert!(manager.pause(404).await.unwrap_err().is_not_found());
        manager.cancel(404).await.unwrap();
        assert_eq!(manager.delete_jobs(&[404, 405]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cancel_paused_job_removes_row_and_file() {
        let (manager, dir) = manager(1).await;
        let path = dir.path().join("part.bin");
        std::fs::write(&path, b"partial").unwrap();
        let id = manager
            .store()
            .insert(&NewJob {
                url: "https://h/part.bin",
                display_name: "part.bin",
                local_path: &path,
                status: JobStatus::Paused,
                auth_token: None,
                group_id: None,
            })
            .await
            .unwrap();
        let mut events = manager.subscribe();

        manager.cancel(id).await.unwrap();

        assert!(manager.get_job(id).await.unwrap().is_none());
        assert!(!path.exists());
        assert_eq!(events.recv().await.unwrap(), JobEvent::Cancelled { job_id: id });
        manager.cancel(id).await.unwrap();
    }

    #[tokio::test]
    async fn test_reconcile_demotes_stranded_rows() {
        let (manager, dir) = manager(1).await;
        let id = manager
            .store()
            .insert(&NewJob {
                url: "https://h/s",
                display_name: "s",
                local_path: &dir.path().join("s"),
                status: JobStatus::Downloading,
                auth_token: None,
                group_id: None,
            })
            .await
            .unwrap();

        assert_eq!(manager.reconcile().await.unwrap(), 1);
        assert_eq!(
            manager.get_job(id).await.unwrap().unwrap().status(),
            JobStatus::Paused
        );
    }

    #[tokio::test]
    async fn test_submit_resolution_rename_only_single_item() {
        let (manager, _dir) = manager(1).await;
        let resolution = Resolution {
            items: vec![
                ResolvedItem::new("a.bin", "mailto:a"),
                ResolvedItem::new("b.bin", "mailto:b"),
            ],
            auth_token: None,
        };
        let outcomes = manager.submit_resolution(&resolution, Some("x")).await;
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(Result::is_err));
    }

    #[tokio::test]
    async fn test_worker_exit_only_frees_its_own_slot() {
        let (manager, dir) = manager(1).await;
        let current = Arc::new(TransferControl::new());
        let (_done_tx, done) = watch::channel(false);
        manager.inner.state.lock().await.active.insert(
            7,
            ActiveTask {
                control: Arc::clone(&current),
                done,
                local_path: dir.path().join("seven.bin"),
            },
        );

        let stale = Arc::new(TransferControl::new());
        Arc::clone(&manager.inner).worker_exited(7, stale).await;
        assert_eq!(manager.snapshot().await.active, vec![7]);

        Arc::clone(&manager.inner).worker_exited(7, current).await;
        assert!(manager.snapshot().await.active.is_empty());
    }

    #[tokio::test]
    async fn test_set_max_concurrent_clamps() {
        let (manager, _dir) = manager(3).await;
        assert_eq!(manager.set_max_concurrent(0).await, 1);
        assert_eq!(manager.max_concurrent(), 1);
        assert_eq!(manager.set_max_concurrent(50).await, 10);
        assert_eq!(manager.snapshot().await, AdmissionSnapshot::default());
        manager.wait_idle().await;
    }
}
