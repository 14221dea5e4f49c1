//! Resumable transfer of one job.
//!
//! [`run_transfer`] owns a job from `Downloading` until it completes, pauses,
//! fails or is cancelled:
//!
//! - a non-zero `downloaded_bytes` becomes a `Range: bytes=N-` request
//! - `206` continues writing at offset N; `200` means the server ignored the
//!   range, so progress restarts at zero and the file is rewritten
//! - the body is written in 8 KiB slices and the pause/cancel flags are
//!   checked after every slice
//! - progress is persisted and published at most every 500 ms or 1 MiB
//!
//! Completion marks the row `Completed`. An error marks it `Failed` and keeps
//! the partial file. A pause records progress and marks it `Paused`. A cancel
//! only stops; removing the row and file is the job manager's job.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use futures_util::StreamExt;
use reqwest::Response;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};

use super::progress::ProgressTracker;
use super::{DownloadError, HttpClient};
use crate::events::{EventSink, JobEvent};
use crate::store::{DownloadJob, JobRepository, JobStatus, progress_percent};

/// Size of the slices written between two pause/cancel checks.
pub const CHUNK_SIZE: usize = 8 * 1024;

/// Cooperative stop flags shared between a worker and the job manager.
#[derive(Debug, Default)]
pub struct TransferControl {
    pause: AtomicBool,
    cancel: AtomicBool,
}

impl TransferControl {
    /// Creates a control with both flags cleared.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks the worker to stop and keep its progress.
    pub fn request_pause(&self) {
        self.pause.store(true, Ordering::SeqCst);
    }

    /// Asks the worker to stop without persisting anything.
    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Whether a pause was requested.
    #[must_use]
    pub fn is_pause_requested(&self) -> bool {
        self.pause.load(Ordering::SeqCst)
    }

    /// Whether a cancel was requested.
    #[must_use]
    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

/// How a transfer that did not fail ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Every byte is on disk.
    Completed {
        /// Destination file.
        path: PathBuf,
        /// Final file size.
        bytes: u64,
    },
    /// Stopped on request; progress was persisted.
    Paused {
        /// Bytes on disk.
        downloaded_bytes: u64,
    },
    /// Stopped on request; nothing was persisted.
    Cancelled,
}

/// Progress shared between the streaming loop and the final bookkeeping.
#[derive(Debug, Clone, Copy)]
struct TransferState {
    downloaded: u64,
    total: i64,
}

/// Runs one transfer session for `job` and records how it ended.
///
/// The job row must already be `Downloading`.
///
/// # Errors
///
/// Returns the [`DownloadError`] that ended the session; by then the row is
/// already marked `Failed` and a failure event has been published.
#[instrument(skip_all, fields(job_id = job.id, url = %job.url))]
pub async fn run_transfer<R>(
    client: &HttpClient,
    repo: &R,
    events: &EventSink,
    job: &DownloadJob,
    control: &TransferControl,
) -> Result<TransferOutcome, DownloadError>
where
    R: JobRepository + ?Sized,
{
    let mut state = TransferState {
        downloaded: u64::try_from(job.downloaded_bytes).unwrap_or(0),
        total: job.total_bytes,
    };

    let result = match stream_job(client, repo, events, job, control, &mut state).await {
        Ok(outcome) => finish(repo, events, job.id, &state, outcome).await,
        Err(error) => Err(error),
    };

    match result {
        Ok(outcome) => Ok(outcome),
        Err(error) => {
            let downloaded = to_i64(state.downloaded);
            warn!(job_id = job.id, error = %error, downloaded, "download failed");
            if let Err(store_error) = repo
                .record_progress(job.id, downloaded, Some(state.total))
                .await
            {
                warn!(job_id = job.id, error = %store_error, "failed to record progress of failed job");
            }
            if let Err(store_error) = repo.set_status(job.id, JobStatus::Failed).await {
                warn!(job_id = job.id, error = %store_error, "failed to mark job failed");
            }
            events.failed(job.id, error.to_string());
            Err(error)
        }
    }
}

/// Persists how a session ended and publishes it. A store error here fails
/// the job like any transfer error.
async fn finish<R>(
    repo: &R,
    events: &EventSink,
    job_id: i64,
    state: &TransferState,
    outcome: TransferOutcome,
) -> Result<TransferOutcome, DownloadError>
where
    R: JobRepository + ?Sized,
{
    match &outcome {
        TransferOutcome::Completed { path, bytes } => {
            let bytes = *bytes;
            let total = if state.total > 0 {
                state.total
            } else {
                to_i64(bytes)
            };
            repo.record_progress(job_id, to_i64(bytes), Some(total))
                .await
                .map_err(|e| DownloadError::store(job_id, e))?;
            repo.set_status(job_id, JobStatus::Completed)
                .await
                .map_err(|e| DownloadError::store(job_id, e))?;
            events.emit(JobEvent::Progress {
                job_id,
                progress_percent: Some(100),
                downloaded_bytes: to_i64(bytes),
                total_bytes: total,
                speed_bytes_per_sec: 0.0,
            });
            events.status(job_id, JobStatus::Completed);
            info!(job_id, path = %path.display(), bytes, "download completed");
        }
        TransferOutcome::Paused { downloaded_bytes } => {
            repo.record_progress(job_id, to_i64(state.downloaded), Some(state.total))
                .await
                .map_err(|e| DownloadError::store(job_id, e))?;
            repo.set_status(job_id, JobStatus::Paused)
                .await
                .map_err(|e| DownloadError::store(job_id, e))?;
            events.status(job_id, JobStatus::Paused);
            info!(job_id, downloaded_bytes, "download paused");
        }
        TransferOutcome::Cancelled => debug!(job_id, "transfer stopped for cancel"),
    }
    Ok(outcome)
}

async fn stream_job<R>(
    client: &HttpClient,
    repo: &R,
    events: &EventSink,
    job: &DownloadJob,
    control: &TransferControl,
    state: &mut TransferState,
) -> Result<TransferOutcome, DownloadError>
where
    R: JobRepository + ?Sized,
{
    let path = job.local_path();
    state.downloaded = resume_offset(&path, state.downloaded).await;
    let offset = state.downloaded;

    if let Some(outcome) = stop_requested(control, state.downloaded) {
        return Ok(outcome);
    }

    let response = client.open(&job.url, offset, job.auth_token.as_deref()).await?;
    let status = response.status().as_u16();
    let append = match status {
        206 if offset > 0 => true,
        416 if offset > 0 && u64::try_from(job.total_bytes).is_ok_and(|t| t == offset) => {
            debug!(job_id = job.id, offset, "range already satisfied");
            return Ok(TransferOutcome::Completed {
                path,
                bytes: offset,
            });
        }
        200..=299 => false,
        _ => return Err(DownloadError::http_status(&job.url, status)),
    };

    if !append && offset > 0 {
        info!(job_id = job.id, offset, "server ignored range; restarting from zero");
    }
    if !append {
        state.downloaded = 0;
    }
    state.total = total_from_headers(&response, append, offset);
    repo.record_progress(job.id, to_i64(state.downloaded), Some(state.total))
        .await
        .map_err(|e| DownloadError::store(job.id, e))?;

    let file = open_destination(&path, append, state.downloaded).await?;
    let mut writer = BufWriter::new(file);
    let mut tracker = ProgressTracker::new(to_i64(state.downloaded));
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| DownloadError::network(&job.url, e))?;
        for slice in chunk.chunks(CHUNK_SIZE) {
            writer
                .write_all(slice)
                .await
                .map_err(|e| DownloadError::io(&path, e))?;
            state.downloaded += slice.len() as u64;

            if let Some(outcome) = stop_requested(control, state.downloaded) {
                writer
                    .flush()
                    .await
                    .map_err(|e| DownloadError::io(&path, e))?;
                return Ok(outcome);
            }

            let now = Instant::now();
            let downloaded = to_i64(state.downloaded);
            if tracker.should_emit(downloaded, now) {
                publish_progress(repo, events, job.id, state, tracker.speed(downloaded, now))
                    .await?;
            }
        }
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(&path, e))?;

    if let Ok(expected) = u64::try_from(state.total)
        && expected > 0
        && state.downloaded < expected
    {
        return Err(DownloadError::incomplete(
            &job.url,
            expected,
            state.downloaded,
        ));
    }

    Ok(TransferOutcome::Completed {
        path,
        bytes: state.downloaded,
    })
}

fn stop_requested(control: &TransferControl, downloaded: u64) -> Option<TransferOutcome> {
    if control.is_cancel_requested() {
        Some(TransferOutcome::Cancelled)
    } else if control.is_pause_requested() {
        Some(TransferOutcome::Paused {
            downloaded_bytes: downloaded,
        })
    } else {
        None
    }
}

async fn publish_progress<R>(
    repo: &R,
    events: &EventSink,
    job_id: i64,
    state: &TransferState,
    speed: f64,
) -> Result<(), DownloadError>
where
    R: JobRepository + ?Sized,
{
    let downloaded = to_i64(state.downloaded);
    repo.record_progress(job_id, downloaded, Some(state.total))
        .await
        .map_err(|e| DownloadError::store(job_id, e))?;
    events.emit(JobEvent::Progress {
        job_id,
        progress_percent: progress_percent(downloaded, state.total),
        downloaded_bytes: downloaded,
        total_bytes: state.total,
        speed_bytes_per_sec: speed,
    });
    Ok(())
}

/// Clamps the stored offset to what is actually on disk.
async fn resume_offset(path: &Path, recorded: u64) -> u64 {
    if recorded == 0 {
        return 0;
    }
    let on_disk = tokio::fs::metadata(path)
        .await
        .map(|meta| meta.len())
        .unwrap_or(0);
    if on_disk < recorded {
        debug!(path = %path.display(), recorded, on_disk, "partial file shorter than recorded progress");
    }
    recorded.min(on_disk)
}

/// Total size implied by the response, or -1 when unknown.
fn total_from_headers(response: &Response, append: bool, offset: u64) -> i64 {
    let content_length = response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());

    let total = if append {
        response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(content_range_total)
            .or_else(|| content_length.map(|remaining| offset.saturating_add(remaining)))
    } else {
        content_length
    };
    total.map_or(-1, to_i64)
}

/// Parses the complete length from `bytes <start>-<end>/<total>`; `*` yields `None`.
pub(crate) fn content_range_total(value: &str) -> Option<u64> {
    let (_, total) = value.trim().rsplit_once('/')?;
    total.trim().parse().ok()
}

async fn open_destination(path: &Path, append: bool, offset: u64) -> Result<File, DownloadError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| DownloadError::io(parent, e))?;
    }

    if !append {
        return File::create(path)
            .await
            .map_err(|e| DownloadError::io(path, e));
    }

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .await
        .map_err(|e| DownloadError::io(path, e))?;
    // Drop anything past the resume point before appending.
    file.set_len(offset)
        .await
        .map_err(|e| DownloadError::io(path, e))?;
    file.seek(SeekFrom::Start(offset))
        .await
        .map_err(|e| DownloadError::io(path, e))?;
    Ok(file)
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
