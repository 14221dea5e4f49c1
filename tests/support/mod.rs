//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use lockerdl_core::download::HttpClient;
use lockerdl_core::events::EventSink;
use lockerdl_core::manager::JobManager;
use lockerdl_core::store::{DownloadJob, JobStatus, JobStore, NewJob};
use lockerdl_core::Database;
use tempfile::TempDir;
use wiremock::{MockServer, Respond, ResponseTemplate};

/// Deterministic, non-repeating-looking payload of `len` bytes.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| u8::try_from((i * 31 + i / 251) % 256).unwrap()).collect()
}

/// Serves `body`, answering `Range: bytes=N-` with `206` when `honor_range` is set.
pub struct RangeResponder {
    pub body: Vec<u8>,
    pub honor_range: bool,
    pub delay: Duration,
}

impl RangeResponder {
    pub fn new(body: Vec<u8>) -> Self {
        Self {
            body,
            honor_range: true,
            delay: Duration::ZERO,
        }
    }

    pub fn ignoring_range(mut self) -> Self {
        self.honor_range = false;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Respond for RangeResponder {
    fn respond(&self, request: &wiremock::Request) -> ResponseTemplate {
        let start = request
            .headers
            .get("range")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("bytes="))
            .and_then(|v| v.trim_end_matches('-').parse::<usize>().ok())
            .filter(|_| self.honor_range);

        let template = match start {
            Some(start) if start >= self.body.len() => ResponseTemplate::new(416).insert_header(
                "Content-Range",
                format!("bytes */{}", self.body.len()).as_str(),
            ),
            Some(start) => ResponseTemplate::new(206)
                .insert_header(
                    "Content-Range",
                    format!("bytes {start}-{}/{}", self.body.len() - 1, self.body.len()).as_str(),
                )
                .set_body_bytes(self.body[start..].to_vec()),
            None => ResponseTemplate::new(200).set_body_bytes(self.body.clone()),
        };
        template.set_delay(self.delay)
    }
}

/// Manager over an in-memory database and a fresh download directory.
pub async fn test_manager(max_concurrent: usize) -> (JobManager, TempDir) {
    let dir = TempDir::new().unwrap();
    let db = Database::new_in_memory().await.unwrap();
    let manager = JobManager::new(
        JobStore::new(db),
        HttpClient::new().unwrap(),
        EventSink::default(),
        dir.path().join("downloads"),
        max_concurrent,
    );
    (manager, dir)
}

/// Inserts a row directly, bypassing admission.
pub async fn insert_job(
    store: &JobStore,
    url: &str,
    local_path: &Path,
    status: JobStatus,
) -> i64 {
    store
        .insert(&NewJob {
            url,
            display_name: local_path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("file"),
            local_path,
            status,
            auth_token: None,
            group_id: None,
        })
        .await
        .unwrap()
}

/// Polls until the job reaches `status`; panics after 10 s.
pub async fn wait_for_status(manager: &JobManager, job_id: i64, status: JobStatus) -> DownloadJob {
    for _ in 0..1000 {
        if let Some(job) = manager.get_job(job_id).await.unwrap()
            && job.status() == status
        {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} never reached {status}");
}

/// Polls until the mock server has seen at least `count` requests.
pub async fn wait_for_requests(server: &MockServer, count: usize) {
    for _ in 0..1000 {
        if server.received_requests().await.unwrap_or_default().len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("mock server never saw {count} request(s)");
}
