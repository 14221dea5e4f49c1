//! Progress bars driven by the job event stream.

use std::collections::HashMap;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use lockerdl_core::{JobEvent, JobManager, JobStatus};
use tokio::sync::broadcast::Receiver;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::oneshot;
use tracing::debug;

const BAR_TEMPLATE: &str =
    "{msg:30!} [{bar:30}] {bytes}/{total_bytes} {bytes_per_sec} eta {eta}";
const SPINNER_TEMPLATE: &str = "{spinner} {msg:30!} {bytes} {bytes_per_sec}";

/// Renders one bar per job until `stop` fires or the channel closes.
pub(crate) fn spawn_progress_ui(
    visible: bool,
    manager: JobManager,
    mut events: Receiver<JobEvent>,
) -> (tokio::task::JoinHandle<()>, oneshot::Sender<()>) {
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
    let target = if visible {
        ProgressDrawTarget::stderr()
    } else {
        ProgressDrawTarget::hidden()
    };

    let handle = tokio::spawn(async move {
        let multi = MultiProgress::with_draw_target(target);
        let mut bars: HashMap<i64, ProgressBar> = HashMap::new();

        loop {
            let event = tokio::select! {
                _ = &mut stop_rx => break,
                received = events.recv() => match received {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "progress renderer lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
            };

            let job_id = event.job_id();
            if !bars.contains_key(&job_id) {
                let label = match manager.get_job(job_id).await {
                    Ok(Some(job)) => job.display_name,
                    _ => format!("job {job_id}"),
                };
                let bar = multi.add(ProgressBar::new_spinner());
                bar.set_style(spinner_style());
                bar.set_message(label);
                bar.enable_steady_tick(Duration::from_millis(120));
                bars.insert(job_id, bar);
            }
            let Some(bar) = bars.get(&job_id) else {
                continue;
            };
            apply_event(bar, &event);
        }

        for bar in bars.values().filter(|bar| !bar.is_finished()) {
            bar.abandon();
        }
    });

    (handle, stop_tx)
}

fn apply_event(bar: &ProgressBar, event: &JobEvent) {
    match event {
        JobEvent::Progress {
            downloaded_bytes,
            total_bytes,
            ..
        } => {
            if *total_bytes > 0 && bar.length().is_none() {
                bar.set_style(bar_style());
            }
            if let Ok(total) = u64::try_from(*total_bytes) {
                bar.set_length(total);
            }
            bar.set_position(u64::try_from(*downloaded_bytes).unwrap_or(0));
        }
        JobEvent::StatusChanged { status, error, .. } => match status {
            JobStatus::Completed => bar.finish_with_message(format!("{} done", bar.message())),
            JobStatus::Paused => bar.abandon_with_message(format!("{} paused", bar.message())),
            JobStatus::Failed => bar.abandon_with_message(format!(
                "{} failed: {}",
                bar.message(),
                error.as_deref().unwrap_or("unknown error")
            )),
            JobStatus::Pending | JobStatus::Downloading => {}
        },
        JobEvent::Cancelled { .. } => bar.abandon_with_message(format!("{} cancelled", bar.message())),
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(BAR_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template(SPINNER_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}
