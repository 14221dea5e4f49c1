//! Job event stream.
//!
//! Transfer workers and the job manager publish [`JobEvent`]s on a tokio
//! `broadcast` channel. Any number of subscribers (progress renderers,
//! notification sinks) can listen; a slow subscriber lags instead of
//! blocking transfers.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use crate::store::JobStatus;

/// Default channel capacity; a subscriber further behind than this lags.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Something observable happened to a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// Throttled transfer progress.
    Progress {
        job_id: i64,
        /// `None` while the total size is unknown.
        progress_percent: Option<u8>,
        downloaded_bytes: i64,
        total_bytes: i64,
        speed_bytes_per_sec: f64,
    },
    /// The persisted status changed.
    StatusChanged {
        job_id: i64,
        status: JobStatus,
        /// Failure reason when `status` is `Failed`.
        error: Option<String>,
    },
    /// The job and its file were removed.
    Cancelled { job_id: i64 },
}

impl JobEvent {
    /// Id of the job the event is about.
    #[must_use]
    pub fn job_id(&self) -> i64 {
        match self {
            Self::Progress { job_id, .. }
            | Self::StatusChanged { job_id, .. }
            | Self::Cancelled { job_id } => *job_id,
        }
    }
}

/// Cloneable publisher handle for [`JobEvent`]s.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: broadcast::Sender<JobEvent>,
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventSink {
    /// Creates a sink with room for `capacity` unread events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Opens a new subscription; it only sees events published after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.tx.subscribe()
    }

    /// Publishes an event. Having no subscribers is not an error.
    pub fn emit(&self, event: JobEvent) {
        if self.tx.send(event).is_err() {
            trace!("job event dropped: no subscribers");
        }
    }

    /// Publishes a status change.
    pub fn status(&self, job_id: i64, status: JobStatus) {
        self.emit(JobEvent::StatusChanged {
            job_id,
            status,
            error: None,
        });
    }

    /// Publishes a transition to `Failed` with its reason.
    pub fn failed(&self, job_id: i64, error: impl Into<String>) {
        self.emit(JobEvent::StatusChanged {
            job_id,
            status: JobStatus::Failed,
            error: Some(error.into()),
        });
    }
}
