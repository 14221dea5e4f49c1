//! Progress throttling and speed calculation for one transfer session.

use std::time::{Duration, Instant};

/// Minimum time between two progress events.
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

/// Bytes after which a progress event is due regardless of time.
pub const PROGRESS_BYTES: i64 = 1024 * 1024;

/// Decides when to publish progress and computes the session's average speed.
///
/// The clock starts when the worker starts (or resumes) the job, and speed
/// counts only bytes fetched in this session, so a resume doesn't report the
/// earlier bytes as if they had arrived instantly.
#[derive(Debug, Clone)]
pub(crate) struct ProgressTracker {
    started: Instant,
    session_start_bytes: i64,
    last_emit_at: Instant,
    last_emit_bytes: i64,
}

impl ProgressTracker {
    pub(crate) fn new(start_bytes: i64) -> Self {
        Self::starting_at(start_bytes, Instant::now())
    }

    pub(crate) fn starting_at(start_bytes: i64, now: Instant) -> Self {
        Self {
            started: now,
            session_start_bytes: start_bytes,
            last_emit_at: now,
            last_emit_bytes: start_bytes,
        }
    }

    /// Returns true (and records the emission) when 500 ms or 1 MiB have
    /// passed since the last event.
    pub(crate) fn should_emit(&mut self, downloaded: i64, now: Instant) -> bool {
        let due = now.duration_since(self.last_emit_at) >= PROGRESS_INTERVAL
            || downloaded - self.last_emit_bytes >= PROGRESS_BYTES;
        if due {
            self.last_emit_at = now;
            self.last_emit_bytes = downloaded;
        }
        due
    }

    /// Bytes per second since the session started.
    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn speed(&self, downloaded: i64, now: Instant) -> f64 {
        let elapsed = now.duration_since(self.started).as_secs_f64();
        if elapsed <= f64::EPSILON {
            return 0.0;
        }
        (downloaded - self.session_start_bytes).max(0) as f64 / elapsed
    }
}
