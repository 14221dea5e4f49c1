//! Resumable HTTP transfer engine.
//!
//! One worker task streams one job's bytes to disk, continuing from the
//! recorded offset with a `Range` request when the server honors it.
//!
//! # Features
//!
//! - Streaming in 8 KiB slices with cooperative pause and cancel
//! - Offset clamped to the bytes actually on disk before resuming
//! - Restart from zero when the server answers a range request with `200`
//! - Throttled progress (500 ms / 1 MiB) persisted and published as events
//! - Filename extraction and sanitization shared with the resolvers
//!
//! # Example
//!
//! ```no_run
//! use lockerdl_core::download::{HttpClient, TransferControl, run_transfer};
//! use lockerdl_core::events::EventSink;
//! use lockerdl_core::store::JobStore;
//! # use lockerdl_core::Database;
//!
//! # async fn example(db: Database, job_id: i64) -> Result<(), Box<dyn std::error::Error>> {
//! let store = JobStore::new(db);
//! let Some(job) = store.get(job_id).await? else {
//!     return Ok(());
//! };
//! let outcome = run_transfer(
//!     &HttpClient::new()?,
//!     &store,
//!     &EventSink::default(),
//!     &job,
//!     &TransferControl::new(),
//! )
//! .await?;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod filename;
mod progress;
mod transfer;

pub use client::{DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_READ_TIMEOUT_SECS, HttpClient};
pub use error::DownloadError;
pub use filename::{
    MAX_FILENAME_BYTES, filename_from_url, parse_content_disposition, sanitize_filename,
    sanitize_relative_path,
};
pub use progress::{PROGRESS_BYTES, PROGRESS_INTERVAL};
pub use transfer::{CHUNK_SIZE, TransferControl, TransferOutcome, run_transfer};
